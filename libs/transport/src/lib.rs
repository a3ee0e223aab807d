//! # CoAP Transport Surface
//!
//! The LWM2M engines sit on an external CoAP/DTLS service that owns sockets,
//! retransmission, token and message-id allocation and the observe option
//! plumbing. This crate is the seam between the two: the message model the
//! engines speak, the [`Endpoint`] trait a transport implements, and the
//! security-mode configuration the engines validate and hand down to DTLS.
//!
//! An in-memory [`loopback`] transport wires engines to each other inside one
//! process; the integration suites run every end-to-end scenario over it.

pub mod endpoint;
pub mod error;
pub mod loopback;
pub mod message;
pub mod security;

pub use endpoint::{Endpoint, InboundRequest, ObserveReply};
pub use error::{SecurityError, TransportError};
pub use message::{Method, MessageType, Request, Response, ResponseCode, Token};
pub use security::{
    CipherSuite, KeyPair, PresharedKey, SecurityConfig, SecurityMode, SecurityModeKind,
};
