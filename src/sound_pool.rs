//! Sound effect pool: one decoded sample, many independently controlled voices.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::mixer::RenderableAudio;
use crate::pan::PanState;
use crate::pcm::mix_into;

/// Identifier of a playing voice. `0` is never assigned.
pub type VoiceId = u64;

static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

const MIN_PITCH: f32 = 0.5;
const MAX_PITCH: f32 = 2.0;

/// Immutable, fully decoded interleaved PCM shared by all voices of a pool.
#[derive(Clone, Debug)]
pub struct SoundSample {
    samples: Arc<[i16]>,
    channels: usize,
}

impl SoundSample {
    /// Wrap interleaved samples. Trailing samples that do not form a full
    /// frame are ignored.
    pub fn new(samples: impl Into<Arc<[i16]>>, channels: usize) -> Self {
        Self {
            samples: samples.into(),
            channels: channels.max(1),
        }
    }

    /// Build a sample from normalised float PCM.
    pub fn from_f32(samples: &[f32], channels: usize) -> Self {
        let converted: Vec<i16> = samples.iter().copied().map(crate::pcm::float_to_i16).collect();
        Self::new(converted, channels)
    }

    /// Channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Length in frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Interleaved sample data.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    #[inline]
    fn at(&self, frame: usize, channel: usize) -> f32 {
        self.samples[frame * self.channels + channel] as f32
    }
}

/// Transport state of a live voice. Stopped voices are removed outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    /// Rendering and advancing.
    Playing,
    /// Kept alive without advancing.
    Paused,
}

struct Voice {
    id: VoiceId,
    cursor: f64,
    volume: f32,
    pitch: f32,
    pan: PanState,
    looping: bool,
    state: VoiceState,
}

impl Voice {
    /// Mix this voice into `out`. Returns `false` once a non-looping voice has
    /// played past the end of the sample.
    fn render(&mut self, sample: &SoundSample, out: &mut [i16], frames: usize, channels: usize) -> bool {
        let length = sample.frames();
        if length == 0 {
            return false;
        }
        let source_channels = sample.channels();
        let end = length as f64;

        for frame in 0..frames {
            if self.cursor >= end {
                if !self.looping {
                    return false;
                }
                self.cursor %= end;
            }
            let base = self.cursor.floor();
            let index = base as usize;
            let fraction = (self.cursor - base) as f32;
            let next = if index + 1 < length {
                index + 1
            } else if self.looping {
                0
            } else {
                index
            };

            for channel in 0..channels {
                let source_channel = if source_channels == channels {
                    channel
                } else {
                    channel % source_channels
                };
                let a = sample.at(index, source_channel);
                let value = if fraction == 0.0 {
                    a
                } else {
                    a + (sample.at(next, source_channel) - a) * fraction
                };
                mix_into(
                    &mut out[frame * channels + channel],
                    value * self.volume * self.pan.modulation(channel),
                );
            }
            self.cursor += self.pitch as f64;
        }

        self.looping || self.cursor < end
    }
}

/// Slot table keyed by voice id. Slots are reused; ids never are.
struct VoiceTable {
    slots: Vec<Option<Voice>>,
    free: Vec<usize>,
    index: HashMap<VoiceId, usize>,
}

impl VoiceTable {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn insert(&mut self, voice: Voice) {
        let id = voice.id;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(voice);
                slot
            }
            None => {
                self.slots.push(Some(voice));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
    }

    fn get_mut(&mut self, id: VoiceId) -> Option<&mut Voice> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_mut()
    }

    fn remove(&mut self, id: VoiceId) -> Option<Voice> {
        let slot = self.index.remove(&id)?;
        self.free.push(slot);
        self.slots[slot].take()
    }

    fn oldest(&self) -> Option<VoiceId> {
        self.index.keys().min().copied()
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut Voice)) {
        for voice in self.slots.iter_mut().flatten() {
            f(voice);
        }
    }

    /// Drop every voice for which `keep` returns `false`.
    fn retain_mut(&mut self, mut keep: impl FnMut(&mut Voice) -> bool) {
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            let Some(voice) = entry.as_mut() else {
                continue;
            };
            if !keep(voice) {
                self.index.remove(&voice.id);
                self.free.push(slot);
                *entry = None;
            }
        }
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
    }
}

struct PoolState {
    sample: Option<Arc<SoundSample>>,
    voices: VoiceTable,
}

/// A loaded sound and the voices currently playing it.
pub struct SoundPool {
    channels: usize,
    max_voices: usize,
    state: Mutex<PoolState>,
    disposed: AtomicBool,
}

impl SoundPool {
    /// Create a pool rendering `sample` into `channels`-wide output, allowing
    /// up to `max_voices` simultaneous voices.
    pub fn new(sample: SoundSample, channels: usize, max_voices: usize) -> Self {
        Self::with_sample(Some(Arc::new(sample)), channels, max_voices)
    }

    /// Create a pool without a loaded sample. Every `play` returns `0`.
    pub fn empty(channels: usize) -> Self {
        Self::with_sample(None, channels, 0)
    }

    fn with_sample(sample: Option<Arc<SoundSample>>, channels: usize, max_voices: usize) -> Self {
        let max_voices = max_voices.max(1);
        Self {
            channels: channels.max(1),
            max_voices,
            state: Mutex::new(PoolState {
                sample,
                voices: VoiceTable::with_capacity(max_voices),
            }),
            disposed: AtomicBool::new(false),
        }
    }

    /// Play the sample once. Returns the new voice id, or `0` if nothing is loaded.
    pub fn play(&self, volume: f32, pitch: f32, pan: f32) -> VoiceId {
        self.play_with(volume, pitch, pan, false)
    }

    /// Play the sample on repeat. Returns the new voice id, or `0` if nothing is loaded.
    pub fn play_looping(&self, volume: f32, pitch: f32, pan: f32) -> VoiceId {
        self.play_with(volume, pitch, pan, true)
    }

    /// Start a voice from frame 0.
    ///
    /// When the pool is full the oldest voice is stolen.
    pub fn play_with(&self, volume: f32, pitch: f32, pan: f32, looping: bool) -> VoiceId {
        if self.is_disposed() {
            return 0;
        }
        let mut state = self.state.lock();
        if state.sample.is_none() {
            return 0;
        }
        if state.voices.len() >= self.max_voices {
            if let Some(oldest) = state.voices.oldest() {
                state.voices.remove(oldest);
                debug!(voice = oldest, "voice limit reached, stealing oldest voice");
            }
        }

        let id = NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed);
        state.voices.insert(Voice {
            id,
            cursor: 0.0,
            volume: clamp_volume(volume),
            pitch: clamp_pitch(pitch),
            pan: PanState::with_pan(pan, self.channels),
            looping,
            state: VoiceState::Playing,
        });
        id
    }

    /// Pause one voice.
    pub fn pause(&self, id: VoiceId) {
        self.with_voice(id, |voice| {
            if voice.state == VoiceState::Playing {
                voice.state = VoiceState::Paused;
            }
        });
    }

    /// Pause every voice.
    pub fn pause_all(&self) {
        self.state
            .lock()
            .voices
            .for_each_mut(|voice| voice.state = VoiceState::Paused);
    }

    /// Resume one paused voice.
    pub fn resume(&self, id: VoiceId) {
        self.with_voice(id, |voice| {
            if voice.state == VoiceState::Paused {
                voice.state = VoiceState::Playing;
            }
        });
    }

    /// Resume every paused voice.
    pub fn resume_all(&self) {
        self.state
            .lock()
            .voices
            .for_each_mut(|voice| voice.state = VoiceState::Playing);
    }

    /// Stop and discard one voice. Unknown ids are ignored.
    pub fn stop(&self, id: VoiceId) {
        self.state.lock().voices.remove(id);
    }

    /// Stop and discard every voice.
    pub fn stop_all(&self) {
        self.state.lock().voices.retain_mut(|_| false);
    }

    /// Toggle looping for a live voice.
    pub fn set_looping(&self, id: VoiceId, looping: bool) {
        self.with_voice(id, |voice| voice.looping = looping);
    }

    /// Set a live voice's volume, clamped to `[0, 1]`.
    pub fn set_volume(&self, id: VoiceId, volume: f32) {
        self.with_voice(id, |voice| voice.volume = clamp_volume(volume));
    }

    /// Set a live voice's playback speed, clamped to `[0.5, 2.0]`.
    pub fn set_pitch(&self, id: VoiceId, pitch: f32) {
        self.with_voice(id, |voice| voice.pitch = clamp_pitch(pitch));
    }

    /// Set a live voice's pan position.
    pub fn set_pan(&self, id: VoiceId, pan: f32) {
        self.with_voice(id, |voice| voice.pan.set(pan));
    }

    /// State of a live voice, `None` once it has stopped.
    pub fn voice_state(&self, id: VoiceId) -> Option<VoiceState> {
        let mut state = self.state.lock();
        state.voices.get_mut(id).map(|voice| voice.state)
    }

    /// Whether the voice exists and is playing.
    pub fn is_playing(&self, id: VoiceId) -> bool {
        self.voice_state(id) == Some(VoiceState::Playing)
    }

    /// Number of live voices, playing or paused.
    pub fn active_voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Stop every voice and release the sample.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock();
        state.voices.clear();
        state.sample = None;
        debug!("sound pool disposed");
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn with_voice(&self, id: VoiceId, f: impl FnOnce(&mut Voice)) {
        if let Some(voice) = self.state.lock().voices.get_mut(id) {
            f(voice);
        }
    }
}

impl RenderableAudio for SoundPool {
    fn render(&self, out: &mut [i16], frames: usize) {
        if self.is_disposed() {
            return;
        }
        let channels = self.channels;
        let frames = frames.min(out.len() / channels);
        let mut guard = self.state.lock();
        let PoolState { sample, voices } = &mut *guard;
        let Some(sample) = sample.as_ref() else {
            return;
        };
        voices.retain_mut(|voice| {
            if voice.state == VoiceState::Paused {
                return true;
            }
            voice.render(sample, out, frames, channels)
        });
    }

    fn is_finished(&self) -> bool {
        self.is_disposed()
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) }
}

fn clamp_pitch(pitch: f32) -> f32 {
    if pitch.is_nan() { 1.0 } else { pitch.clamp(MIN_PITCH, MAX_PITCH) }
}
