//! Lifecycle events dispatched to monitors.

/// A change in a client's registration lifecycle, as seen by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// The client registered.
    Register,
    /// The client refreshed or changed its registration.
    Update,
    /// The client deregistered itself.
    Unregister,
    /// The server discarded the client after its lifetime expired.
    Timeout,
}

/// A change in the bootstrap lifecycle, as seen by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapEvent {
    /// A bootstrap server finished provisioning this client.
    Finished,
    /// The bootstrap process failed.
    Error,
}
