//! Decoder interface consumed by the streaming track, plus in-memory sources.
//!
//! Real codecs live outside this crate. A decoder only has to fill a PCM buffer
//! on request and support seeking; the track takes the filled buffer by swap.

use std::sync::Arc;

use dasp_signal::{ConstHz, Signal, Sine};

use crate::error::DecodeError;
use crate::pcm::float_to_i16;

/// Source of interleaved `i16` PCM chunks.
pub trait Decoder: Send {
    /// Channel count of the decoded PCM.
    fn channels(&self) -> usize;

    /// Replace `buffer` with up to `frames` decoded frames.
    ///
    /// Returns `true` once the source is exhausted. Fewer frames than requested
    /// may be produced near the end of the stream.
    fn decode(&mut self, frames: usize, buffer: &mut Vec<i16>) -> Result<bool, DecodeError>;

    /// Move the decode cursor to `seconds` and clear end-of-stream.
    fn seek(&mut self, seconds: f32) -> Result<(), DecodeError>;
}

fn frame_at(seconds: f32, sample_rate: u32) -> Result<usize, DecodeError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(DecodeError::Seek(seconds));
    }
    Ok((seconds as f64 * sample_rate as f64).round() as usize)
}

/// Decoder over PCM that is already fully decoded in memory.
pub struct PcmDecoder {
    samples: Arc<[i16]>,
    channels: usize,
    sample_rate: u32,
    cursor: usize,
}

impl PcmDecoder {
    /// Wrap interleaved samples. Trailing samples that do not form a full frame
    /// are ignored.
    pub fn new(samples: impl Into<Arc<[i16]>>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            channels: channels.max(1),
            sample_rate,
            cursor: 0,
        }
    }

    /// Total frames in the source.
    pub fn total_frames(&self) -> usize {
        self.samples.len() / self.channels
    }
}

impl Decoder for PcmDecoder {
    fn channels(&self) -> usize {
        self.channels
    }

    fn decode(&mut self, frames: usize, buffer: &mut Vec<i16>) -> Result<bool, DecodeError> {
        buffer.clear();
        let total = self.total_frames();
        let count = frames.min(total.saturating_sub(self.cursor));
        let start = self.cursor * self.channels;
        buffer.extend_from_slice(&self.samples[start..start + count * self.channels]);
        self.cursor += count;
        Ok(self.cursor >= total)
    }

    fn seek(&mut self, seconds: f32) -> Result<(), DecodeError> {
        self.cursor = frame_at(seconds, self.sample_rate)?.min(self.total_frames());
        Ok(())
    }
}

/// Synthetic sine source of fixed duration.
pub struct ToneDecoder {
    signal: Sine<ConstHz>,
    frequency: f64,
    amplitude: f32,
    channels: usize,
    sample_rate: u32,
    total_frames: usize,
    cursor: usize,
}

impl ToneDecoder {
    /// Sine of `frequency` Hz at `amplitude` (0–1) lasting `seconds`.
    pub fn new(frequency: f64, amplitude: f32, seconds: f32, channels: usize, sample_rate: u32) -> Self {
        let total_frames = (seconds.max(0.0) as f64 * sample_rate as f64).round() as usize;
        Self {
            signal: dasp_signal::rate(sample_rate as f64).const_hz(frequency).sine(),
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            channels: channels.max(1),
            sample_rate,
            total_frames,
            cursor: 0,
        }
    }
}

impl Decoder for ToneDecoder {
    fn channels(&self) -> usize {
        self.channels
    }

    fn decode(&mut self, frames: usize, buffer: &mut Vec<i16>) -> Result<bool, DecodeError> {
        buffer.clear();
        let count = frames.min(self.total_frames.saturating_sub(self.cursor));
        buffer.reserve(count * self.channels);
        for _ in 0..count {
            let value = float_to_i16(self.signal.next() as f32 * self.amplitude);
            buffer.extend(std::iter::repeat_n(value, self.channels));
        }
        self.cursor += count;
        Ok(self.cursor >= self.total_frames)
    }

    fn seek(&mut self, seconds: f32) -> Result<(), DecodeError> {
        let frame = frame_at(seconds, self.sample_rate)?.min(self.total_frames);
        self.signal = dasp_signal::rate(self.sample_rate as f64)
            .const_hz(self.frequency)
            .sine();
        for _ in 0..frame {
            self.signal.next();
        }
        self.cursor = frame;
        Ok(())
    }
}
