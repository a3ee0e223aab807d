//! Client engine errors.
//!
//! Two layers, matching the failure model of the whole engine: [`OpError`]
//! is what object implementations return and maps onto CoAP response codes;
//! [`ClientError`] is the synchronous "could not dispatch" layer of the
//! public API.

use thiserror::Error;

use transport::{ResponseCode, SecurityError, TransportError};
use types::PathError;

/// Result of an object operation, mapped straight to a response code.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OpError {
    /// The resource or instance is absent.
    #[error("not found")]
    NotFound,

    /// The request targets something unknown or carries a bad payload.
    #[error("bad request")]
    BadRequest,

    /// The object does not support this operation.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The object has no callback for this operation at all.
    #[error("not implemented")]
    NotImplemented,

    /// The object failed internally.
    #[error("internal error")]
    Internal,
}

impl OpError {
    /// The CoAP response code this failure surfaces as.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            OpError::NotFound => ResponseCode::NotFound,
            OpError::BadRequest => ResponseCode::BadRequest,
            OpError::MethodNotAllowed => ResponseCode::MethodNotAllowed,
            OpError::NotImplemented => ResponseCode::NotImplemented,
            OpError::Internal => ResponseCode::InternalServerError,
        }
    }
}

/// Errors of the client engine's public API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is already started")]
    AlreadyStarted,

    #[error("client is not started")]
    NotStarted,

    #[error("no object with id {object_id} is registered")]
    UnknownObject { object_id: u16 },

    #[error("instance {instance_id} already exists on object {object_id}")]
    DuplicateInstance { object_id: u16, instance_id: u16 },

    #[error("object {object_id} has no free instance id")]
    InstancesExhausted { object_id: u16 },

    #[error("instance state has the wrong type for object {object_id}")]
    InstanceTypeMismatch { object_id: u16 },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Operation(#[from] OpError),

    /// The Security object yielded no usable server or bootstrap account.
    #[error("no server account and no bootstrap account configured")]
    NoServerAccounts,

    #[error("server uri {uri:?} could not be resolved")]
    UnresolvableServer { uri: String },

    #[error("registration rejected with {code}")]
    RegistrationRejected { code: ResponseCode },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
