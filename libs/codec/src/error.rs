//! Codec-level errors for TLV and link-format processing.
//!
//! Each variant carries enough context to point at the offending bytes;
//! decoding never panics on attacker-controlled input.

use thiserror::Error;

/// TLV and link-format errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// The buffer ended inside a record header or value.
    #[error("truncated TLV: need {need} bytes at offset {offset}, buffer has {have}")]
    Truncated {
        offset: usize,
        need: usize,
        have: usize,
    },

    /// An integer value field was not 1, 2, 4 or 8 bytes.
    #[error("invalid integer value length {len}: expected 1, 2, 4 or 8 bytes")]
    IntLength { len: usize },

    /// A float value field was not 4 or 8 bytes.
    #[error("invalid float value length {len}: expected 4 or 8 bytes")]
    FloatLength { len: usize },

    /// A boolean value field was not exactly one byte of 0 or 1.
    #[error("invalid boolean value: length {len}, byte {byte:#04x}")]
    BoolValue { len: usize, byte: u8 },

    /// An object-link value field was not 4 bytes.
    #[error("invalid object-link value length {len}: expected 4 bytes")]
    ObjLinkLength { len: usize },

    /// A string value was not valid UTF-8.
    #[error("string value is not valid UTF-8")]
    InvalidUtf8,

    /// A value does not fit the 24-bit TLV length field.
    #[error("value of {len} bytes exceeds the TLV length limit {max}")]
    ValueTooLarge { len: usize, max: usize },

    /// A link-format entry could not be parsed.
    #[error("malformed link-format entry {entry:?}")]
    MalformedLink { entry: String },

    /// A link-format entry announced a content type; only link text is supported.
    #[error("unsupported content type attribute in link-format entry {entry:?}")]
    LinkContentType { entry: String },

    /// A link-format entry used the reserved instance id.
    #[error("reserved instance id in link-format entry {entry:?}")]
    LinkReservedInstanceId { entry: String },
}

impl CodecError {
    /// Truncation at `offset`: `need` more bytes were required, `have` remain.
    pub fn truncated(offset: usize, need: usize, have: usize) -> Self {
        CodecError::Truncated { offset, need, have }
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;
