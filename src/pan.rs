//! Stereo pan law.
//!
//! Uses a linear balance law: the centre position keeps both channels at full
//! scale and moving towards one side attenuates only the opposite channel.

use dasp_frame::{Frame, Stereo};

/// Stateless pan law evaluation.
pub struct PanLaw;

impl PanLaw {
    /// Gain pair `[left, right]` for a pan value in `[-1, 1]`.
    pub fn stereo(pan: f32) -> Stereo<f32> {
        let pan = clamp_pan(pan);
        [(1.0 - pan).min(1.0), (1.0 + pan).min(1.0)]
    }

    /// Gain for `channel` of a `channels`-wide layout.
    ///
    /// Mono output is never attenuated; channels past the first two are left
    /// untouched.
    pub fn gain(pan: f32, channel: usize, channels: usize) -> f32 {
        if channels < 2 {
            return 1.0;
        }
        match channel {
            0 | 1 => Self::stereo(pan)[channel],
            _ => 1.0,
        }
    }
}

fn clamp_pan(pan: f32) -> f32 {
    if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) }
}

/// Cached per-channel multipliers for a pan position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PanState {
    pan: f32,
    gains: Stereo<f32>,
    channels: usize,
}

impl PanState {
    /// Centred pan state for the given channel count.
    pub fn new(channels: usize) -> Self {
        Self::with_pan(0.0, channels)
    }

    /// Pan state initialised to `pan`.
    pub fn with_pan(pan: f32, channels: usize) -> Self {
        let mut state = Self {
            pan: 0.0,
            gains: <Stereo<f32> as Frame>::EQUILIBRIUM,
            channels,
        };
        state.set(pan);
        state
    }

    /// Update the pan position and recompute gains.
    pub fn set(&mut self, pan: f32) {
        self.pan = clamp_pan(pan);
        self.gains = if self.channels < 2 {
            [1.0, 1.0]
        } else {
            PanLaw::stereo(self.pan)
        };
    }

    /// Current pan position.
    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Multiplier for interleaved sample `channel` (`sample_index % channels`).
    #[inline]
    pub fn modulation(&self, channel: usize) -> f32 {
        match channel {
            0 | 1 => self.gains[channel],
            _ => 1.0,
        }
    }
}
