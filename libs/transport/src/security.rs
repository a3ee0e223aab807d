//! DTLS security-mode configuration.
//!
//! The original interface took a count plus variadic mode/argument groups;
//! here each mode is a typed variant carrying its own parameters, so the
//! compiler rules out the alignment hazards and matching is exhaustive.
//! The engines validate the list and map it to cipher suites; the transport
//! consumes the result.

use serde::{Deserialize, Serialize};

use crate::error::SecurityError;

/// The numeric security-mode values of the Security object's resource 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityModeKind {
    PreSharedKey,
    RawPublicKey,
    Certificate,
    NoSec,
}

impl TryFrom<i64> for SecurityModeKind {
    type Error = SecurityError;

    fn try_from(value: i64) -> Result<SecurityModeKind, SecurityError> {
        match value {
            0 => Ok(SecurityModeKind::PreSharedKey),
            1 => Ok(SecurityModeKind::RawPublicKey),
            2 => Ok(SecurityModeKind::Certificate),
            3 => Ok(SecurityModeKind::NoSec),
            value => Err(SecurityError::UnknownMode { value }),
        }
    }
}

/// A pre-shared key a server knows a client by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresharedKey {
    pub identity: Vec<u8>,
    pub key: Vec<u8>,
}

/// A raw-public-key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub private_key: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// One configured security mode with its parameters.
///
/// Certificate mode and NoSec are deliberately unrepresentable here: the
/// first is unimplemented, the second is expressed by configuring no modes
/// at all (on engines where DTLS is optional).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityMode {
    PreSharedKey {
        known_keys: Vec<PresharedKey>,
    },
    RawPublicKey {
        key_pair: KeyPair,
        known_public_keys: Vec<Vec<u8>>,
    },
}

impl SecurityMode {
    pub fn kind(&self) -> SecurityModeKind {
        match self {
            SecurityMode::PreSharedKey { .. } => SecurityModeKind::PreSharedKey,
            SecurityMode::RawPublicKey { .. } => SecurityModeKind::RawPublicKey,
        }
    }

    /// The DTLS cipher suite this mode selects.
    pub fn cipher_suite(&self) -> CipherSuite {
        match self {
            SecurityMode::PreSharedKey { .. } => CipherSuite::PskAes128Ccm8,
            SecurityMode::RawPublicKey { .. } => CipherSuite::EcdheEcdsaAes128Ccm8,
        }
    }
}

/// The cipher suites the engine enumerates for the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherSuite {
    PskAes128Ccm8,
    EcdheEcdsaAes128Ccm8,
}

/// The validated list of security modes an engine passes to its transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub modes: Vec<SecurityMode>,
}

impl SecurityConfig {
    /// No DTLS at all; valid only where DTLS is optional.
    pub fn nosec() -> SecurityConfig {
        SecurityConfig { modes: Vec::new() }
    }

    pub fn new(modes: Vec<SecurityMode>) -> SecurityConfig {
        SecurityConfig { modes }
    }

    /// Validates the mode list. `require_dtls` is set by the bootstrap
    /// server, which must not run without security.
    pub fn validate(&self, require_dtls: bool) -> Result<(), SecurityError> {
        if require_dtls && self.modes.is_empty() {
            return Err(SecurityError::NoModes);
        }
        for (index, mode) in self.modes.iter().enumerate() {
            if self.modes[..index].iter().any(|m| m.kind() == mode.kind()) {
                return Err(SecurityError::RepeatedMode { mode: mode.kind() });
            }
        }
        Ok(())
    }

    /// The cipher suites to hand to the DTLS transport, in mode order.
    pub fn cipher_suites(&self) -> Vec<CipherSuite> {
        self.modes.iter().map(SecurityMode::cipher_suite).collect()
    }

    pub fn is_secure(&self) -> bool {
        !self.modes.is_empty()
    }
}
