//! Server engine errors: the synchronous "could not dispatch" layer.
//!
//! Peer replies, including the synthetic gateway timeout, travel through the
//! operation results instead.

use thiserror::Error;

use transport::{SecurityError, TransportError};
use types::{Path, PathError};

#[derive(Debug, Error)]
pub enum ServerError {
    /// The path does not have the shape this operation requires.
    #[error("path {path} has the wrong shape for {operation}")]
    InvalidPath {
        path: Path,
        operation: &'static str,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    /// The client handle is no longer in the registry.
    #[error("client {name:?} is not registered")]
    UnknownClient { name: String },

    /// `del_observer` without a matching observer entry or callback.
    #[error("no matching observer for {path}")]
    NoObserver { path: Path },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Codec(#[from] codec::CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
