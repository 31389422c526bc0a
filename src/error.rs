//! Error types surfaced by the engine and its collaborators.

/// Errors raised while constructing or configuring the engine.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The output stream could not be opened or configured.
    #[error("error opening stream: {0}")]
    StreamOpen(#[from] StreamError),
    /// Requested channel configuration is unsupported.
    #[error("unsupported channel count {0}, only mono and stereo are supported")]
    UnsupportedChannels(u16),
    /// A configuration value was out of range.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(&'static str),
    /// The decode worker thread could not be started.
    #[error("failed to spawn decode worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Errors reported by an output stream backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The backend refused to open a stream.
    #[error("open failed: {0}")]
    Open(String),
    /// The stream could not be started.
    #[error("start failed: {0}")]
    Start(String),
    /// The stream could not be stopped.
    #[error("stop failed: {0}")]
    Stop(String),
    /// The stream was already closed.
    #[error("stream closed")]
    Closed,
}

/// Errors reported by a [`Decoder`](crate::decoder::Decoder).
///
/// The streaming track never propagates these; a failed decode ends the stream.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Reading the underlying source failed.
    #[error("read failed: {0}")]
    Io(String),
    /// The requested position is outside the source.
    #[error("cannot seek to {0}s")]
    Seek(f32),
    /// The source contained undecodable data.
    #[error("corrupt data: {0}")]
    Corrupt(String),
}
