//! Registered-client records.
//!
//! A [`ClientInfo`] is shared between the registry, observer entries and
//! user callbacks, so the identity fields are immutable and everything an
//! update may change sits behind a small lock.

use std::net::SocketAddr;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

use types::BindingMode;

/// What a registration or update announced.
#[derive(Debug)]
pub(crate) struct ClientDetails {
    pub(crate) sms: Option<String>,
    pub(crate) objects_path: Option<String>,
    pub(crate) lifetime: u32,
    pub(crate) binding: BindingMode,
    pub(crate) registered_at: Instant,
    pub(crate) objects: Vec<(u16, Vec<u16>)>,
}

/// A client known to the server.
#[derive(Debug)]
pub struct ClientInfo {
    name: String,
    location: String,
    address: SocketAddr,
    secure: bool,
    pub(crate) details: Mutex<ClientDetails>,
}

impl ClientInfo {
    pub(crate) fn new(
        name: String,
        location: String,
        address: SocketAddr,
        secure: bool,
        details: ClientDetails,
    ) -> ClientInfo {
        ClientInfo {
            name,
            location,
            address,
            secure,
            details: Mutex::new(details),
        }
    }

    /// The endpoint name (`ep`), unique within one server.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The server-assigned opaque location under `/rd/`.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Whether the client registered over DTLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn sms(&self) -> Option<String> {
        self.details.lock().sms.clone()
    }

    /// The alternate objects path, when the client announced one.
    pub fn objects_path(&self) -> Option<String> {
        self.details.lock().objects_path.clone()
    }

    pub fn lifetime(&self) -> u32 {
        self.details.lock().lifetime
    }

    pub fn binding_mode(&self) -> BindingMode {
        self.details.lock().binding
    }

    /// The announced `object id -> instance ids` index.
    pub fn objects(&self) -> Vec<(u16, Vec<u16>)> {
        self.details.lock().objects.clone()
    }

    /// When this registration stops being valid.
    pub(crate) fn deadline(&self) -> Instant {
        let details = self.details.lock();
        details.registered_at + Duration::from_secs(u64::from(details.lifetime))
    }
}
