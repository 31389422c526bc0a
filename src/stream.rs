//! Output stream abstraction and an offline backend that renders on demand.
//!
//! The hardware stream is provided by the host. It is opened once with a
//! [`RenderCallback`] and then started and stopped; the callback is invoked on
//! the device's real-time thread with an interleaved `i16` buffer to fill.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StreamError;

/// Callback invoked with an interleaved output buffer and its frame count.
pub type RenderCallback = Box<dyn FnMut(&mut [i16], usize) + Send>;

/// Sample format requested from the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit integer samples.
    I16,
}

/// Parameters used to open an output stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Interleaved channel count.
    pub channels: u16,
    /// Frames per second.
    pub sample_rate: u32,
    /// Sample format of the callback buffer.
    pub format: SampleFormat,
    /// Ask the device for its low-latency path.
    pub low_latency: bool,
    /// Ask for exclusive access to the device.
    pub exclusive: bool,
}

/// Opens output streams.
pub trait StreamBackend {
    /// Open a stream that will drive `callback`.
    fn open(
        &self,
        config: &StreamConfig,
        callback: RenderCallback,
    ) -> Result<Box<dyn OutputStream>, StreamError>;
}

/// An opened output stream.
pub trait OutputStream: Send {
    /// Frames the device consumes per burst.
    fn frames_per_burst(&self) -> usize;

    /// Request a buffer size, returning the size actually granted.
    fn set_buffer_size_in_frames(&mut self, frames: usize) -> Result<usize, StreamError>;

    /// Begin invoking the render callback.
    fn start(&mut self) -> Result<(), StreamError>;

    /// Stop invoking the render callback.
    fn stop(&mut self) -> Result<(), StreamError>;

    /// Release the stream. Further calls fail with [`StreamError::Closed`].
    fn close(&mut self) -> Result<(), StreamError>;
}

struct OfflineShared {
    callback: Option<RenderCallback>,
    channels: usize,
    burst: usize,
    buffer_frames: usize,
    started: bool,
    closed: bool,
}

/// Backend whose stream renders only when [`OfflineStream::pull`] is called.
pub struct OfflineBackend {
    stream: OfflineStream,
    refuse: Option<String>,
}

/// Shared handle to the stream opened by an [`OfflineBackend`].
#[derive(Clone)]
pub struct OfflineStream {
    shared: Arc<Mutex<OfflineShared>>,
}

impl OfflineBackend {
    /// Create a backend reporting `burst` frames per burst, plus the handle
    /// used to pull rendered audio from it.
    pub fn new(burst: usize) -> (Self, OfflineStream) {
        let stream = OfflineStream {
            shared: Arc::new(Mutex::new(OfflineShared {
                callback: None,
                channels: 0,
                burst: burst.max(1),
                buffer_frames: burst.max(1),
                started: false,
                closed: false,
            })),
        };
        (
            Self {
                stream: stream.clone(),
                refuse: None,
            },
            stream,
        )
    }

    /// A backend whose `open` always fails with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        let (mut backend, _) = Self::new(1);
        backend.refuse = Some(reason.into());
        backend
    }
}

impl StreamBackend for OfflineBackend {
    fn open(
        &self,
        config: &StreamConfig,
        callback: RenderCallback,
    ) -> Result<Box<dyn OutputStream>, StreamError> {
        if let Some(reason) = &self.refuse {
            return Err(StreamError::Open(reason.clone()));
        }
        let mut shared = self.stream.shared.lock();
        shared.callback = Some(callback);
        shared.channels = config.channels as usize;
        shared.closed = false;
        shared.started = false;
        debug!(
            channels = config.channels,
            sample_rate = config.sample_rate,
            burst = shared.burst,
            "offline stream opened"
        );
        Ok(Box::new(self.stream.clone()))
    }
}

impl OfflineStream {
    /// Render `frames` frames through the callback.
    ///
    /// A stream that is not started (or has been closed) yields silence
    /// without touching the callback.
    pub fn pull(&self, frames: usize) -> Vec<i16> {
        let (callback, channels) = {
            let mut shared = self.shared.lock();
            if !shared.started || shared.closed {
                return vec![0; frames * shared.channels.max(1)];
            }
            (shared.callback.take(), shared.channels.max(1))
        };

        let mut out = vec![0i16; frames * channels];
        let Some(mut callback) = callback else {
            return out;
        };
        callback(&mut out, frames);

        let mut shared = self.shared.lock();
        if shared.callback.is_none() && !shared.closed {
            shared.callback = Some(callback);
        }
        out
    }

    /// Whether the stream is currently started.
    pub fn is_started(&self) -> bool {
        self.shared.lock().started
    }

    /// Whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Buffer size most recently granted.
    pub fn buffer_size_in_frames(&self) -> usize {
        self.shared.lock().buffer_frames
    }
}

impl OutputStream for OfflineStream {
    fn frames_per_burst(&self) -> usize {
        self.shared.lock().burst
    }

    fn set_buffer_size_in_frames(&mut self, frames: usize) -> Result<usize, StreamError> {
        let mut shared = self.shared.lock();
        if shared.closed {
            return Err(StreamError::Closed);
        }
        shared.buffer_frames = frames.max(shared.burst);
        Ok(shared.buffer_frames)
    }

    fn start(&mut self) -> Result<(), StreamError> {
        let mut shared = self.shared.lock();
        if shared.closed {
            return Err(StreamError::Closed);
        }
        shared.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        let mut shared = self.shared.lock();
        if shared.closed {
            return Err(StreamError::Closed);
        }
        shared.started = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StreamError> {
        let mut shared = self.shared.lock();
        if shared.closed {
            return Err(StreamError::Closed);
        }
        shared.started = false;
        shared.closed = true;
        shared.callback = None;
        Ok(())
    }
}
