//! Sums every active renderable into the output buffer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::pcm::apply_gain;

/// Audio producer that can be mixed by the [`Mixer`].
///
/// Implementations add their contribution to `out` (never overwrite it) and
/// must not block for long: `render` runs on the real-time callback thread.
pub trait RenderableAudio: Send + Sync {
    /// Mix `frames` interleaved frames into `out`.
    fn render(&self, out: &mut [i16], frames: usize);

    /// Whether the mixer should drop this producer.
    fn is_finished(&self) -> bool;
}

/// Master mix bus.
///
/// Producers are rendered from a snapshot of the voice list, so a producer
/// (or a callback it fires) may add audio to the mixer mid-render. Additions
/// are heard from the next render on.
pub struct Mixer {
    channels: usize,
    voices: Mutex<Vec<Arc<dyn RenderableAudio>>>,
    rendering: Mutex<Vec<Arc<dyn RenderableAudio>>>,
    volume_bits: AtomicU32,
}

impl Mixer {
    /// Create a mixer for `channels`-wide output, reserving room for
    /// `capacity` renderables.
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            channels: channels.max(1),
            voices: Mutex::new(Vec::with_capacity(capacity)),
            rendering: Mutex::new(Vec::with_capacity(capacity)),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    /// Output channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Master volume in `[0, 1]`.
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    /// Set the master volume, clamped to `[0, 1]`.
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Start mixing `audio`. Adding the same producer twice has no effect.
    pub fn play_audio(&self, audio: Arc<dyn RenderableAudio>) {
        let mut voices = self.voices.lock();
        if voices.iter().any(|existing| Arc::ptr_eq(existing, &audio)) {
            return;
        }
        voices.push(audio);
    }

    /// Number of producers currently mixed.
    pub fn len(&self) -> usize {
        self.voices.lock().len()
    }

    /// Whether nothing is being mixed.
    pub fn is_empty(&self) -> bool {
        self.voices.lock().is_empty()
    }

    /// Render `frames` frames into `out`, replacing its contents.
    pub fn render(&self, out: &mut [i16], frames: usize) {
        let samples = (frames * self.channels).min(out.len());
        let out = &mut out[..samples];
        let frames = samples / self.channels;
        out.fill(0);

        let mut rendering = self.rendering.lock();
        rendering.extend(self.voices.lock().iter().cloned());
        for voice in rendering.iter() {
            voice.render(out, frames);
        }
        apply_gain(out, self.volume());

        if rendering.iter().any(|voice| voice.is_finished()) {
            self.voices.lock().retain(|voice| !voice.is_finished());
        }
        rendering.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct Constant {
        samples: Vec<i16>,
        finished: AtomicBool,
    }

    impl Constant {
        fn new(samples: Vec<i16>) -> Arc<Self> {
            Arc::new(Self {
                samples,
                finished: AtomicBool::new(false),
            })
        }
    }

    impl RenderableAudio for Constant {
        fn render(&self, out: &mut [i16], _frames: usize) {
            for (dst, src) in out.iter_mut().zip(self.samples.iter()) {
                crate::pcm::mix_into(dst, *src as f32);
            }
        }

        fn is_finished(&self) -> bool {
            self.finished.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn silent_voices_render_silence() {
        let mixer = Mixer::new(2, 4);
        for _ in 0..3 {
            mixer.play_audio(Constant::new(vec![0; 8]));
        }
        let mut out = vec![123i16; 8];
        mixer.render(&mut out, 4);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn single_voice_at_unit_volume_is_identity() {
        let mixer = Mixer::new(2, 4);
        let samples = vec![i16::MIN, -1234, 0, 1, 4321, i16::MAX];
        mixer.play_audio(Constant::new(samples.clone()));
        let mut out = vec![0i16; 6];
        mixer.render(&mut out, 3);
        assert_eq!(out, samples);
    }

    #[test]
    fn sums_saturate() {
        let mixer = Mixer::new(1, 4);
        mixer.play_audio(Constant::new(vec![30_000, -30_000]));
        mixer.play_audio(Constant::new(vec![30_000, -30_000]));
        let mut out = vec![0i16; 2];
        mixer.render(&mut out, 2);
        assert_eq!(out, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn master_volume_applies_to_the_sum() {
        let mixer = Mixer::new(1, 4);
        mixer.play_audio(Constant::new(vec![20_000]));
        mixer.play_audio(Constant::new(vec![20_000]));
        mixer.set_volume(0.5);
        let mut out = vec![0i16; 1];
        mixer.render(&mut out, 1);
        // Saturates to 32767 first, then halves.
        assert_eq!(out, vec![16_383]);

        mixer.set_volume(3.0);
        assert_eq!(mixer.volume(), 1.0);
        mixer.set_volume(-1.0);
        assert_eq!(mixer.volume(), 0.0);
    }

    struct Spawner {
        mixer: std::sync::Weak<Mixer>,
        spawned: AtomicBool,
    }

    impl RenderableAudio for Spawner {
        fn render(&self, _out: &mut [i16], _frames: usize) {
            if self.spawned.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(mixer) = self.mixer.upgrade() {
                mixer.play_audio(Constant::new(vec![11, 12]));
            }
        }

        fn is_finished(&self) -> bool {
            self.spawned.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn producers_can_add_audio_while_rendering() {
        let mixer = Arc::new(Mixer::new(1, 4));
        mixer.play_audio(Arc::new(Spawner {
            mixer: Arc::downgrade(&mixer),
            spawned: AtomicBool::new(false),
        }));

        let mut out = vec![0i16; 2];
        mixer.render(&mut out, 2);
        assert_eq!(out, vec![0, 0]);
        assert_eq!(mixer.len(), 1);

        mixer.render(&mut out, 2);
        assert_eq!(out, vec![11, 12]);
    }

    #[test]
    fn finished_voices_are_removed_after_render() {
        let mixer = Mixer::new(1, 4);
        let voice = Constant::new(vec![5]);
        mixer.play_audio(voice.clone());
        mixer.play_audio(voice.clone());
        assert_eq!(mixer.len(), 1);

        voice.finished.store(true, Ordering::SeqCst);
        let mut out = vec![0i16; 1];
        mixer.render(&mut out, 1);
        assert!(mixer.is_empty());
    }
}
