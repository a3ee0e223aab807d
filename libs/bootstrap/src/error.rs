//! Bootstrap server errors.

use thiserror::Error;

use transport::{SecurityError, TransportError};
use types::{Path, PathError};

#[derive(Debug, Error)]
pub enum BootstrapServerError {
    /// The path does not have the shape this operation requires.
    #[error("path {path} has the wrong shape for {operation}")]
    InvalidPath {
        path: Path,
        operation: &'static str,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    /// The client handle was consumed by `send_finish` or never had a
    /// session.
    #[error("no bootstrap session for client {name:?}")]
    NoSession { name: String },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Codec(#[from] codec::CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
