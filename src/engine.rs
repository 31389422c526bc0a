//! Top-level engine owning the output stream and the mixer.
//!
//! The engine runs in one of two modes. In [`EngineMode::Mix`] each callback
//! renders the [`Mixer`]; in [`EngineMode::Stream`] it drains raw PCM queued by
//! [`AudioEngine::play_pcm`] / [`AudioEngine::play_float`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::decoder::Decoder;
use crate::error::EngineError;
use crate::mixer::{Mixer, RenderableAudio};
use crate::music::StreamingTrack;
use crate::pcm::{apply_gain, float_to_i16};
use crate::ring::{SampleRing, monotonic_timestamp_ns};
use crate::sound_pool::{SoundPool, SoundSample};
use crate::stream::{OutputStream, RenderCallback, SampleFormat, StreamBackend, StreamConfig};

const MIN_SAMPLE_RATE: u32 = 8_000;
const MAX_SAMPLE_RATE: u32 = 192_000;

/// Engine construction parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Output channels, 1 or 2.
    pub channels: u16,
    /// Output sample rate in Hertz.
    pub sample_rate: u32,
    /// Device buffer size as a multiple of the burst size.
    pub buffer_bursts: usize,
    /// Frames decoded per streaming buffer.
    pub cache_frames: usize,
    /// Simultaneous voices per sound pool before the oldest is stolen.
    pub max_voices: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44_100,
            buffer_bursts: 2,
            cache_frames: 16 * 1024,
            max_voices: 32,
        }
    }
}

impl EngineConfig {
    /// Mono output.
    pub fn mono() -> Self {
        Self {
            channels: 1,
            ..Self::default()
        }
    }

    /// Override the channel count.
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Override the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Override the buffer size multiplier.
    pub fn with_buffer_bursts(mut self, buffer_bursts: usize) -> Self {
        self.buffer_bursts = buffer_bursts;
        self
    }

    /// Override the streaming cache size.
    pub fn with_cache_frames(mut self, cache_frames: usize) -> Self {
        self.cache_frames = cache_frames;
        self
    }

    /// Override the per-pool voice limit.
    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices;
        self
    }

    /// Check every field is in range.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !matches!(self.channels, 1 | 2) {
            return Err(EngineError::UnsupportedChannels(self.channels));
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(EngineError::InvalidConfig("sample rate out of range"));
        }
        if self.buffer_bursts == 0 {
            return Err(EngineError::InvalidConfig("buffer_bursts must be non-zero"));
        }
        if self.cache_frames == 0 {
            return Err(EngineError::InvalidConfig("cache_frames must be non-zero"));
        }
        if self.max_voices == 0 {
            return Err(EngineError::InvalidConfig("max_voices must be non-zero"));
        }
        Ok(())
    }
}

/// What the render callback produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMode {
    /// Mix every registered renderable.
    Mix,
    /// Drain the raw PCM queue.
    Stream,
}

/// Diagnostics snapshot of a running engine.
#[derive(Clone, Debug)]
pub struct EngineStatus {
    /// Output sample rate in Hertz.
    pub sample_rate: u32,
    /// Output channel count.
    pub channels: u16,
    /// Frames per device burst.
    pub burst_frames: usize,
    /// Device buffer size in frames.
    pub buffer_frames: usize,
    /// Buffer latency in milliseconds.
    pub latency_ms: f32,
    /// Current render mode.
    pub mode: EngineMode,
    /// Master volume.
    pub volume: f32,
    /// Renderables currently registered with the mixer.
    pub active_renderables: usize,
    /// Raw PCM samples waiting in the stream queue.
    pub queued_samples: usize,
    /// Render callbacks served so far.
    pub callbacks: u64,
    /// Stream-mode callbacks that ran out of queued PCM.
    pub underruns: u64,
    /// Monotonic timestamp of the last callback, 0 if none yet.
    pub last_callback_ns: u64,
}

struct CallbackState {
    mode: EngineMode,
    queue: SampleRing,
    callbacks: u64,
    underruns: u64,
    last_callback_ns: u64,
}

struct Shared {
    mixer: Mixer,
    callback: Mutex<CallbackState>,
}

impl Shared {
    fn render(&self, out: &mut [i16], frames: usize) {
        let samples = (frames * self.mixer.channels()).min(out.len());
        let mode = {
            let mut state = self.callback.lock();
            state.callbacks += 1;
            state.last_callback_ns = monotonic_timestamp_ns();
            if state.mode == EngineMode::Stream {
                let out = &mut out[..samples];
                let read = state.queue.pop(out);
                if read < samples {
                    out[read..].fill(0);
                    state.underruns += 1;
                }
                apply_gain(&mut out[..read], self.mixer.volume());
            }
            state.mode
        };

        if mode == EngineMode::Mix {
            self.mixer.render(out, frames);
        }
    }
}

/// Owns the output stream, the mixer and the raw PCM queue.
pub struct AudioEngine {
    config: EngineConfig,
    shared: Arc<Shared>,
    stream: Mutex<Box<dyn OutputStream>>,
    burst_frames: usize,
    buffer_frames: usize,
}

impl AudioEngine {
    /// Open a stream on `backend` and build the mixer.
    ///
    /// The stream is opened but not started; call [`resume`](Self::resume).
    pub fn new<B>(backend: &B, config: EngineConfig) -> Result<Self, EngineError>
    where
        B: StreamBackend + ?Sized,
    {
        config.validate()?;
        let channels = config.channels as usize;
        let shared = Arc::new(Shared {
            mixer: Mixer::new(channels, config.max_voices),
            callback: Mutex::new(CallbackState {
                mode: EngineMode::Mix,
                queue: SampleRing::with_capacity(config.cache_frames * channels),
                callbacks: 0,
                underruns: 0,
                last_callback_ns: 0,
            }),
        });

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            format: SampleFormat::I16,
            low_latency: true,
            exclusive: true,
        };
        let render_shared = Arc::clone(&shared);
        let callback: RenderCallback =
            Box::new(move |out: &mut [i16], frames: usize| render_shared.render(out, frames));

        let mut stream = backend.open(&stream_config, callback)?;
        let burst_frames = stream.frames_per_burst();
        let buffer_frames = stream.set_buffer_size_in_frames(burst_frames * config.buffer_bursts)?;

        debug!(
            channels = config.channels,
            sample_rate = config.sample_rate,
            burst_frames,
            buffer_frames,
            "audio engine opened"
        );

        Ok(Self {
            config,
            shared,
            stream: Mutex::new(stream),
            burst_frames,
            buffer_frames,
        })
    }

    /// Start mixing `audio` and switch to mix mode.
    pub fn play(&self, audio: Arc<dyn RenderableAudio>) {
        self.shared.mixer.play_audio(audio);
        self.shared.callback.lock().mode = EngineMode::Mix;
    }

    /// Queue raw PCM and switch to stream mode.
    pub fn play_pcm(&self, pcm: &[i16]) {
        let mut state = self.shared.callback.lock();
        state.mode = EngineMode::Stream;
        state.queue.push(pcm);
    }

    /// Queue float PCM (scaled by 32767, saturating) and switch to stream mode.
    pub fn play_float(&self, pcm: &[f32]) {
        let mut state = self.shared.callback.lock();
        state.mode = EngineMode::Stream;
        state.queue.extend(pcm.iter().map(|&sample| float_to_i16(sample)));
    }

    /// Current render mode.
    pub fn mode(&self) -> EngineMode {
        self.shared.callback.lock().mode
    }

    /// Master volume.
    pub fn volume(&self) -> f32 {
        self.shared.mixer.volume()
    }

    /// Set the master volume, clamped to `[0, 1]`.
    pub fn set_volume(&self, volume: f32) {
        self.shared.mixer.set_volume(volume);
    }

    /// Create a sound pool for `sample` and register it with the mixer.
    pub fn new_sound_pool(&self, sample: SoundSample) -> Arc<SoundPool> {
        let pool = Arc::new(SoundPool::new(
            sample,
            self.config.channels as usize,
            self.config.max_voices,
        ));
        self.shared.mixer.play_audio(pool.clone());
        pool
    }

    /// Create a streaming track over `decoder` and register it with the mixer.
    pub fn new_music(&self, decoder: Box<dyn Decoder>) -> Result<Arc<StreamingTrack>, EngineError> {
        let track = StreamingTrack::new(
            decoder,
            self.config.channels as usize,
            self.config.sample_rate,
            self.config.cache_frames,
        )?;
        self.shared.mixer.play_audio(track.clone());
        Ok(track)
    }

    /// Start (or restart) the output stream. Failures are logged.
    pub fn resume(&self) {
        if let Err(err) = self.stream.lock().start() {
            warn!(%err, "failed to start output stream");
        }
    }

    /// Stop the output stream. Failures are logged.
    pub fn stop(&self) {
        if let Err(err) = self.stream.lock().stop() {
            warn!(%err, "failed to stop output stream");
        }
    }

    /// Whether the output is mono.
    pub fn is_mono(&self) -> bool {
        self.config.channels == 1
    }

    /// Samples in one device buffer.
    pub fn payload_size(&self) -> usize {
        self.buffer_frames * self.config.channels as usize
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot current diagnostics.
    pub fn status(&self) -> EngineStatus {
        let (mode, queued_samples, callbacks, underruns, last_callback_ns) = {
            let state = self.shared.callback.lock();
            (
                state.mode,
                state.queue.available_read(),
                state.callbacks,
                state.underruns,
                state.last_callback_ns,
            )
        };
        EngineStatus {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            burst_frames: self.burst_frames,
            buffer_frames: self.buffer_frames,
            latency_ms: self.buffer_frames as f32 * 1000.0 / self.config.sample_rate as f32,
            mode,
            volume: self.volume(),
            active_renderables: self.shared.mixer.len(),
            queued_samples,
            callbacks,
            underruns,
            last_callback_ns,
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let stream = self.stream.get_mut();
        if let Err(err) = stream.stop() {
            warn!(%err, "failed to stop output stream");
        }
        if let Err(err) = stream.close() {
            warn!(%err, "failed to close output stream");
        }
        debug!("audio engine closed");
    }
}
