//! Long-form streaming track with decode-ahead double buffering.
//!
//! The track renders from an active PCM buffer while a worker thread fills a
//! staging buffer from the decoder. At a buffer boundary the two are swapped
//! (never copied) under the `buffers` guard. The worker only ever locks the
//! staging area, so decoding never happens inside the guard on behalf of the
//! render thread except when it has to wait for a late look-ahead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::decoder::Decoder;
use crate::error::EngineError;
use crate::mixer::RenderableAudio;
use crate::pan::PanState;
use crate::pcm::mix_into;
use crate::worker::Executor;

/// Transport state of a [`StreamingTrack`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackState {
    /// Not rendering; position is at the start or where `seek` put it.
    Stopped = 0,
    /// Rendering.
    Playing = 1,
    /// Not rendering; buffers and cursor are kept.
    Paused = 2,
    /// Terminal. Every operation is a no-op.
    Disposed = 3,
}

impl TrackState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TrackState::Stopped,
            1 => TrackState::Playing,
            2 => TrackState::Paused,
            _ => TrackState::Disposed,
        }
    }
}

type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

struct ActiveBuffer {
    pcm: Vec<i16>,
    cursor: usize,
    eof: bool,
}

impl ActiveBuffer {
    fn frames(&self, channels: usize) -> usize {
        self.pcm.len() / channels
    }

    fn exhausted(&self, channels: usize) -> bool {
        self.cursor >= self.frames(channels)
    }
}

struct Staging {
    decoder: Box<dyn Decoder>,
    pcm: Vec<i16>,
    eof: bool,
}

/// A single long-form track streamed through a decoder.
pub struct StreamingTrack {
    channels: usize,
    source_channels: usize,
    cache_frames: usize,
    sample_rate: u32,
    state: AtomicU8,
    looping: AtomicBool,
    volume_bits: AtomicU32,
    pan_bits: AtomicU32,
    position_frames: AtomicU64,
    buffers: Mutex<ActiveBuffer>,
    staging: Mutex<Staging>,
    executor: Executor,
    on_complete: Mutex<Option<CompletionCallback>>,
}

impl StreamingTrack {
    /// Create a stopped track rendering `decoder` into `channels`-wide output.
    ///
    /// `cache_frames` frames are decoded per buffer. The first buffer is
    /// decoded synchronously and the look-ahead worker is started.
    pub fn new(
        decoder: Box<dyn Decoder>,
        channels: usize,
        sample_rate: u32,
        cache_frames: usize,
    ) -> Result<Arc<Self>, EngineError> {
        let source_channels = decoder.channels().max(1);
        let cache_frames = cache_frames.max(1);
        let cache_samples = cache_frames * source_channels;
        let (executor, receiver) = Executor::new();

        let track = Arc::new(Self {
            channels: channels.max(1),
            source_channels,
            cache_frames,
            sample_rate: sample_rate.max(1),
            state: AtomicU8::new(TrackState::Stopped as u8),
            looping: AtomicBool::new(false),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            pan_bits: AtomicU32::new(0.0f32.to_bits()),
            position_frames: AtomicU64::new(0),
            buffers: Mutex::new(ActiveBuffer {
                pcm: Vec::with_capacity(cache_samples),
                cursor: 0,
                eof: false,
            }),
            staging: Mutex::new(Staging {
                decoder,
                pcm: Vec::with_capacity(cache_samples),
                eof: false,
            }),
            executor,
            on_complete: Mutex::new(None),
        });

        let weak = Arc::downgrade(&track);
        receiver.spawn("mixkit-decode", move || match weak.upgrade() {
            Some(track) => {
                track.fill_next();
                true
            }
            None => false,
        })?;

        track.stop();
        debug!(
            channels = track.channels,
            source_channels, cache_frames, "streaming track created"
        );
        Ok(track)
    }

    /// Current transport state.
    pub fn state(&self) -> TrackState {
        TrackState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the track is rendering.
    pub fn is_playing(&self) -> bool {
        self.state() == TrackState::Playing
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.state() == TrackState::Disposed
    }

    /// Start or resume playback. A track that already played to its end
    /// restarts from the beginning.
    pub fn play(&self) {
        if self.is_disposed() {
            return;
        }
        let mut active = self.buffers.lock();
        if active.eof && active.exhausted(self.source_channels) {
            self.rewind(&mut active);
        }
        self.set_state(TrackState::Playing);
    }

    /// Pause without touching buffers or position.
    pub fn pause(&self) {
        let _ = self.state.compare_exchange(
            TrackState::Playing as u8,
            TrackState::Paused as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Stop and rewind to the start.
    pub fn stop(&self) {
        if self.is_disposed() {
            return;
        }
        let mut active = self.buffers.lock();
        self.rewind(&mut active);
    }

    /// Jump to `seconds`, refilling the active buffer synchronously.
    pub fn seek(&self, seconds: f32) {
        if self.is_disposed() {
            return;
        }
        let mut active = self.buffers.lock();
        self.refill_at(&mut active, seconds);
    }

    /// Playback position in seconds.
    pub fn position(&self) -> f32 {
        if self.is_disposed() {
            return 0.0;
        }
        (self.position_frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64) as f32
    }

    /// Playback position in frames.
    pub fn position_frames(&self) -> u64 {
        if self.is_disposed() {
            return 0;
        }
        self.position_frames.load(Ordering::Acquire)
    }

    /// Track volume in `[0, 1]`.
    pub fn volume(&self) -> f32 {
        if self.is_disposed() {
            return 1.0;
        }
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    /// Set the track volume, clamped to `[0, 1]`.
    pub fn set_volume(&self, volume: f32) {
        if self.is_disposed() {
            return;
        }
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Pan position in `[-1, 1]`.
    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan_bits.load(Ordering::Relaxed))
    }

    /// Set the pan position.
    pub fn set_pan(&self, pan: f32) {
        if self.is_disposed() {
            return;
        }
        let pan = PanState::with_pan(pan, self.channels).pan();
        self.pan_bits.store(pan.to_bits(), Ordering::Relaxed);
    }

    /// Whether the track restarts when it reaches the end.
    pub fn is_looping(&self) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.looping.load(Ordering::Acquire)
    }

    /// Enable or disable looping.
    pub fn set_looping(&self, looping: bool) {
        if self.is_disposed() {
            return;
        }
        self.looping.store(looping, Ordering::Release);
    }

    /// Replace the completion callback.
    ///
    /// The callback runs on the render thread after the buffer guard has been
    /// released, once per natural end of a non-looping track. It must not block.
    pub fn on_complete(&self, callback: impl Fn() + Send + Sync + 'static) {
        if self.is_disposed() {
            return;
        }
        *self.on_complete.lock() = Some(Arc::new(callback));
    }

    /// Remove the completion callback.
    pub fn clear_on_complete(&self) {
        *self.on_complete.lock() = None;
    }

    /// Permanently stop the track and shut down its worker.
    pub fn dispose(&self) {
        let previous = self.state.swap(TrackState::Disposed as u8, Ordering::AcqRel);
        if previous == TrackState::Disposed as u8 {
            return;
        }
        self.clear_on_complete();
        self.executor.shutdown();
        debug!("streaming track disposed");
    }

    /// Output channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames decoded per buffer.
    pub fn cache_frames(&self) -> usize {
        self.cache_frames
    }

    fn set_state(&self, next: TrackState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != TrackState::Disposed as u8).then_some(next as u8)
            })
            .is_ok()
    }

    fn rewind(&self, active: &mut ActiveBuffer) {
        self.set_state(TrackState::Stopped);
        active.eof = false;
        self.refill_at(active, 0.0);
    }

    fn refill_at(&self, active: &mut ActiveBuffer, seconds: f32) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        self.executor.wait();
        self.seek_decoder(seconds);
        self.fill_next();
        self.swap_buffers(active);
        let frame = (seconds as f64 * self.sample_rate as f64).round() as u64;
        self.position_frames.store(frame, Ordering::Release);
        self.queue_next(active);
    }

    /// Only called while no decode job is in flight.
    fn seek_decoder(&self, seconds: f32) {
        let mut staging = self.staging.lock();
        if let Err(err) = staging.decoder.seek(seconds) {
            warn!(%err, seconds, "decoder seek failed");
        }
        staging.eof = false;
    }

    /// Queue the look-ahead for whatever follows `active`. When `active`
    /// holds the final chunk of a looping track, that is the start again.
    fn queue_next(&self, active: &ActiveBuffer) {
        if active.eof && self.is_looping() {
            self.seek_decoder(0.0);
        }
        self.executor.queue();
    }

    /// Decode the next chunk into the staging buffer.
    fn fill_next(&self) {
        if self.is_disposed() {
            return;
        }
        let mut staging = self.staging.lock();
        let Staging { decoder, pcm, eof } = &mut *staging;
        match decoder.decode(self.cache_frames, pcm) {
            Ok(end) => *eof = end,
            Err(err) => {
                warn!(%err, "decode failed, ending stream");
                pcm.clear();
                *eof = true;
            }
        }
    }

    fn swap_buffers(&self, active: &mut ActiveBuffer) {
        let mut staging = self.staging.lock();
        std::mem::swap(&mut active.pcm, &mut staging.pcm);
        active.eof = staging.eof;
        active.cursor = 0;
    }

    fn mix_segment(
        &self,
        active: &mut ActiveBuffer,
        out: &mut [i16],
        frames: usize,
        volume: f32,
        pan: &PanState,
    ) -> usize {
        let source = self.source_channels;
        let channels = self.channels;
        let available = active.frames(source).saturating_sub(active.cursor);
        let count = frames.min(available);

        for frame in 0..count {
            let base = (active.cursor + frame) * source;
            for channel in 0..channels {
                let source_channel = if source == channels {
                    channel
                } else {
                    channel % source
                };
                mix_into(
                    &mut out[frame * channels + channel],
                    active.pcm[base + source_channel] as f32 * volume * pan.modulation(channel),
                );
            }
        }

        active.cursor += count;
        self.position_frames
            .fetch_add(count as u64, Ordering::AcqRel);
        count
    }

    fn notify_complete(&self) {
        let callback = self.on_complete.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl RenderableAudio for StreamingTrack {
    fn render(&self, out: &mut [i16], frames: usize) {
        if !self.is_playing() {
            return;
        }
        let channels = self.channels;
        let frames = frames.min(out.len() / channels);
        let volume = self.volume();
        let pan = PanState::with_pan(self.pan(), channels);
        let mut completed = false;

        {
            let mut active = self.buffers.lock();
            let mut done = 0;
            loop {
                done += self.mix_segment(
                    &mut active,
                    &mut out[done * channels..frames * channels],
                    frames - done,
                    volume,
                    &pan,
                );
                if done == frames {
                    break;
                }

                if active.eof && active.exhausted(self.source_channels) {
                    self.position_frames.store(0, Ordering::Release);
                    if !self.is_looping() {
                        completed = self
                            .state
                            .compare_exchange(
                                TrackState::Playing as u8,
                                TrackState::Stopped as u8,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok();
                        break;
                    }
                }

                self.executor.wait();
                self.swap_buffers(&mut active);
                if !self.is_playing() {
                    break;
                }
                // Looping was enabled after the look-ahead had already run
                // past the end: restart the decoder here rather than go silent.
                if active.eof && active.frames(self.source_channels) == 0 && self.is_looping() {
                    self.seek_decoder(0.0);
                    self.fill_next();
                    self.swap_buffers(&mut active);
                    if active.frames(self.source_channels) == 0 {
                        break;
                    }
                }
                self.queue_next(&active);
                if active.frames(self.source_channels) == 0 && !active.eof {
                    break;
                }
            }
        }

        if completed {
            self.notify_complete();
        }
    }

    fn is_finished(&self) -> bool {
        self.is_disposed()
    }
}

impl Drop for StreamingTrack {
    fn drop(&mut self) {
        self.dispose();
    }
}
