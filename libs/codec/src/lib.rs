//! # OMA TLV Codec
//!
//! ## Purpose
//!
//! Encoding and decoding rules for the two wire formats the engines exchange:
//! the OMA TLV binary representation of object instances, resources and
//! resource instances, and the CoRE link-format payload of the registration
//! interface.
//!
//! The decoder is zero-copy: records borrow their value bytes from the input
//! buffer, and nested records (a multi-resource's resource instances) are
//! exposed through a child iterator rather than eagerly materialized. The
//! encoder always emits the smallest legal id and length widths, so the
//! output for a given descriptor is deterministic and re-encoding a decoded
//! buffer reproduces it byte for byte.
//!
//! ## What This Crate Does NOT Contain
//! - CoAP message or option handling (belongs in `transport`)
//! - Object and resource semantics (belong in the engines)

pub mod error;
pub mod link_format;
pub mod tlv;

pub use error::{CodecError, CodecResult};
pub use link_format::{build_registration_payload, parse_registration_payload, LinkEntries};
pub use tlv::{
    encode_object_instances, encode_resource, encode_resources, parse_tlv, Tlv, TlvIter, TlvKind,
};
