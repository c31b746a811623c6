//! Acquisition Error Types

use obd_client::LinkError;
use telemetry_store::StoreError;
use thiserror::Error;

/// Errors that can end the acquisition task
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The very first connection attempt failed; the task halts rather
    /// than retrying.
    #[error("Initial connection failed: {0}")]
    ConnectFailed(LinkError),

    /// Link-level error during an exchange
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// The shared store is unusable
    #[error(transparent)]
    Store(#[from] StoreError),
}
