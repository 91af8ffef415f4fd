//! Error types for stream reading and writing

use std::path::PathBuf;

use thiserror::Error;

/// Result alias carrying [`StreamError`].
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur when opening or appending to a packet stream.
///
/// Running out of data is not an error: readers report it through
/// `false`/`None` results and [`StreamEnd`](crate::StreamEnd).
#[derive(Error, Debug)]
pub enum StreamError {
    /// The stream file could not be created (writer) or opened (reader)
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read, write, seek or flush failure on an open stream
    #[error("Stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timestamp is earlier than the last packet written to this stream
    #[error("Non-monotonic timestamp: {timestamp} after {previous}")]
    NonMonotonic { previous: f32, timestamp: f32 },

    /// Timestamp is negative, NaN or infinite
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(f32),

    /// An earlier write failed partway; appending more would bury the torn
    /// packet in the middle of the stream
    #[error("Stream is unusable after a failed write")]
    Poisoned,

    /// Write attempted after `close()`
    #[error("Stream is closed")]
    Closed,
}

impl StreamError {
    /// Whether this is an open-time failure rather than a steady-state one.
    pub fn is_open_error(&self) -> bool {
        matches!(self, StreamError::Open { .. })
    }
}
