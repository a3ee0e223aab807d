//! Binding modes and content formats.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The transport-and-schedule contract between a client and a server.
///
/// All six modes of the protocol are modeled so registrations parse, but only
/// continuous UDP (`U`) is operational in this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingMode {
    /// Continuous UDP.
    U,
    /// Queued UDP.
    UQ,
    /// Continuous SMS.
    S,
    /// Queued SMS.
    SQ,
    /// UDP and SMS.
    US,
    /// Queued UDP and SMS.
    UQS,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown binding mode {mode:?}")]
pub struct BindingModeError {
    pub mode: String,
}

impl BindingMode {
    /// Whether this engine can actually operate the mode.
    pub fn is_supported(&self) -> bool {
        matches!(self, BindingMode::U)
    }
}

impl Default for BindingMode {
    fn default() -> Self {
        BindingMode::U
    }
}

impl FromStr for BindingMode {
    type Err = BindingModeError;

    fn from_str(s: &str) -> Result<BindingMode, BindingModeError> {
        match s {
            "U" => Ok(BindingMode::U),
            "UQ" => Ok(BindingMode::UQ),
            "S" => Ok(BindingMode::S),
            "SQ" => Ok(BindingMode::SQ),
            "US" => Ok(BindingMode::US),
            "UQS" => Ok(BindingMode::UQS),
            other => Err(BindingModeError {
                mode: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindingMode::U => "U",
            BindingMode::UQ => "UQ",
            BindingMode::S => "S",
            BindingMode::SQ => "SQ",
            BindingMode::US => "US",
            BindingMode::UQS => "UQS",
        };
        f.write_str(s)
    }
}

/// CoAP content-format option values used by LWM2M.
///
/// JSON is recognized so peers announcing it get a clean rejection instead of
/// a parse error; the engine never produces or consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    Text,
    Tlv,
    Json,
    Opaque,
}

impl ContentFormat {
    /// The numeric option value on the wire.
    pub fn code(&self) -> u16 {
        match self {
            ContentFormat::Text => 1541,
            ContentFormat::Tlv => 1542,
            ContentFormat::Json => 1543,
            ContentFormat::Opaque => 1544,
        }
    }
}

impl TryFrom<u16> for ContentFormat {
    type Error = u16;

    fn try_from(code: u16) -> Result<ContentFormat, u16> {
        match code {
            1541 => Ok(ContentFormat::Text),
            1542 => Ok(ContentFormat::Tlv),
            1543 => Ok(ContentFormat::Json),
            1544 => Ok(ContentFormat::Opaque),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_mode_round_trip() {
        for s in ["U", "UQ", "S", "SQ", "US", "UQS"] {
            assert_eq!(s.parse::<BindingMode>().unwrap().to_string(), s);
        }
        assert!("X".parse::<BindingMode>().is_err());
    }

    #[test]
    fn test_only_udp_supported() {
        assert!(BindingMode::U.is_supported());
        assert!(!BindingMode::UQ.is_supported());
    }

    #[test]
    fn test_content_format_codes() {
        assert_eq!(ContentFormat::Tlv.code(), 1542);
        assert_eq!(ContentFormat::try_from(1544), Ok(ContentFormat::Opaque));
        assert_eq!(ContentFormat::try_from(50), Err(50));
    }
}
