//! Well-known protocol constants.
//!
//! Object and resource ids of the two bootstrap-configurable objects, plus
//! the default ports and registration defaults.

/// Default UDP port of a LWM2M server (NoSec).
pub const DEFAULT_SERVER_PORT: u16 = 5683;

/// Default UDP port of a LWM2M server (DTLS).
pub const DEFAULT_SERVER_PORT_DTLS: u16 = 5684;

/// Registration lifetime assumed when a client does not send `lt`.
pub const DEFAULT_CLIENT_LIFETIME: u32 = 86_400;

/// Protocol version announced in the registration query.
pub const LWM2M_VERSION: &str = "1.0";

/// Security object (id 0) - describes the servers a client should contact.
pub mod security {
    pub const OBJECT_ID: u16 = 0;

    pub const RES_SERVER_URI: u16 = 0;
    pub const RES_IS_BOOTSTRAP: u16 = 1;
    pub const RES_SECURITY_MODE: u16 = 2;
    pub const RES_SHORT_SERVER_ID: u16 = 10;
    pub const RES_CLIENT_HOLD_OFF_TIME: u16 = 11;
    pub const RES_BOOTSTRAP_ACCOUNT_TIMEOUT: u16 = 12;
}

/// Server object (id 1) - per-account registration parameters.
pub mod server {
    pub const OBJECT_ID: u16 = 1;

    pub const RES_SHORT_SERVER_ID: u16 = 0;
    pub const RES_LIFETIME: u16 = 1;
    pub const RES_BINDING: u16 = 7;
    pub const RES_REGISTRATION_UPDATE_TRIGGER: u16 = 8;
}
