//! Link Error Types

use thiserror::Error;

/// Errors that can occur on the adapter link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Configured adapter address does not parse
    #[error("Malformed adapter address: {0}")]
    BadAddress(String),

    /// Link-layer connection did not complete in time
    #[error("Link connect timed out after {0}ms")]
    ConnectTimeout(u64),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Adapter initialization sequence failed
    #[error("Adapter init failed: {0}")]
    InitFailed(String),

    /// Peer closed the byte stream
    #[error("Link closed by peer")]
    Disconnected,

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

impl From<tokio_serial::Error> for LinkError {
    fn from(err: tokio_serial::Error) -> Self {
        LinkError::Serial(err.to_string())
    }
}
