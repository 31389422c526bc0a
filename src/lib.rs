#![deny(missing_docs)]

//! Real-time 16-bit audio mixing engine.
//!
//! An [`AudioEngine`] owns an output stream and a [`Mixer`]. The mixer sums
//! any number of [`RenderableAudio`] producers: [`SoundPool`]s playing short
//! in-memory samples on independent voices, and [`StreamingTrack`]s decoding
//! long-form audio ahead of the render thread with a double buffer. The engine
//! can also bypass the mixer and drain raw PCM pushed by the host.
//!
//! Rendering happens in the stream's callback. Producers are shared with the
//! host through `Arc`, and per-object state sits behind short `parking_lot`
//! locks or atomics so control calls can arrive from any thread.

use std::sync::Once;

pub mod decoder;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod music;
pub mod pan;
pub mod pcm;
pub mod ring;
pub mod sound_pool;
pub mod stream;
mod worker;

#[cfg(test)]
mod tests;

pub use decoder::{Decoder, PcmDecoder, ToneDecoder};
pub use engine::{AudioEngine, EngineConfig, EngineMode, EngineStatus};
pub use error::{DecodeError, EngineError, StreamError};
pub use mixer::{Mixer, RenderableAudio};
pub use music::{StreamingTrack, TrackState};
pub use pan::{PanLaw, PanState};
pub use sound_pool::{SoundPool, SoundSample, VoiceId, VoiceState};
pub use stream::{
    OfflineBackend, OfflineStream, OutputStream, RenderCallback, SampleFormat, StreamBackend,
    StreamConfig,
};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing_subscriber` formatter once per process.
///
/// Safe to call repeatedly; an already-installed global subscriber is kept.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}
