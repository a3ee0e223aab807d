//! Transport and security-configuration errors.

use std::net::SocketAddr;

use thiserror::Error;

/// Failures of the transport collaborator.
///
/// `TimedOut` is the transport's "retransmit budget exhausted" signal; the
/// engines surface it to their callers as the synthetic `GatewayTimeout`
/// response code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No reply arrived within the transport's retransmission budget.
    #[error("no reply from {peer} within the retransmit budget")]
    TimedOut { peer: SocketAddr },

    /// The peer address is not reachable at all.
    #[error("peer {peer} is unreachable")]
    Unreachable { peer: SocketAddr },

    /// The transport was shut down while an exchange was in flight.
    #[error("transport channel closed")]
    ChannelClosed,
}

/// Security-mode configuration failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// A DTLS-mandatory engine was configured with zero security modes.
    #[error("at least one security mode is required")]
    NoModes,

    /// The same security mode was configured twice.
    #[error("security mode {mode:?} is repeated")]
    RepeatedMode { mode: crate::security::SecurityModeKind },

    /// A recognized but unimplemented mode (certificate, or NoSec where DTLS
    /// is mandatory).
    #[error("unknown security mode {mode:?}")]
    UnsupportedMode { mode: crate::security::SecurityModeKind },

    /// A numeric security-mode value outside the defined range.
    #[error("unknown security mode value {value}")]
    UnknownMode { value: i64 },
}
