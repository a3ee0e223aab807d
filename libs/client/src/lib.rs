//! # LWM2M Client Engine
//!
//! ## Purpose
//!
//! Hosts the object model and drives the client side of the protocol: the
//! registration lifecycle with its update heartbeat, dispatch of management
//! requests into object callbacks, observation bookkeeping with notification
//! emission, and the bootstrap client states.
//!
//! A [`Client`] is a cheap-clone handle over shared state. Construction goes
//! through [`ClientBuilder`]; the builder takes the object implementations,
//! and instances are added programmatically or created over the wire. All
//! public operations return as soon as their exchange is handed to the
//! transport; completion is the returned future.
//!
//! ```text
//! Security/Server objects -> [registration state machine] -> POST /rd
//!          ^                        |
//!     bootstrap writes        heartbeat timer (lifetime - margin)
//! ```

pub mod error;
pub mod object;
pub mod standard;

mod dispatch;

use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use codec::build_registration_payload;
use transport::{
    Endpoint, InboundRequest, Method, Request, ResponseCode, SecurityModeKind, Token,
};
use types::constants::{security, server, DEFAULT_CLIENT_LIFETIME, DEFAULT_SERVER_PORT,
    DEFAULT_SERVER_PORT_DTLS, LWM2M_VERSION};
use types::{BindingMode, BootstrapEvent, Path};

pub use error::{ClientError, OpError};
pub use object::{Object, Payload};

use error::ClientError as Error;
use object::{ObjectDispatch, ObjectEntry};

/// Seconds subtracted from the lifetime when arming the update heartbeat,
/// mirroring the server's eviction tolerance.
const UPDATE_MARGIN_SECS: u64 = 2;

/// The client lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Registering,
    Registered,
    Updating,
    Bootstrapping,
    BootstrapFinished,
}

/// Handle of a registered bootstrap-finish monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorId(u64);

type BootstrapMonitor = Arc<dyn Fn(BootstrapEvent) + Send + Sync>;

pub(crate) struct Registration {
    pub(crate) peer: SocketAddr,
    pub(crate) lifetime: u32,
    pub(crate) location: Vec<String>,
    /// The announced instance set changed since the last update to this
    /// server; the next update carries a fresh link-format payload.
    pub(crate) dirty: bool,
}

pub(crate) struct Observation {
    pub(crate) token: Token,
    pub(crate) peer: SocketAddr,
    pub(crate) path: Path,
    pub(crate) sequence: u32,
}

impl Observation {
    pub(crate) fn next_sequence(&mut self) -> u32 {
        self.sequence = (self.sequence + 1) % transport::message::observe::SEQUENCE_MODULUS;
        self.sequence
    }
}

/// A server or bootstrap-server account scanned from the Security object.
#[derive(Debug, Clone)]
struct ServerAccount {
    uri: String,
    is_bootstrap: bool,
    hold_off: u64,
    lifetime: u32,
}

pub(crate) struct ClientState {
    pub(crate) lifecycle: LifecycleState,
    pub(crate) objects: BTreeMap<u16, Box<dyn ObjectDispatch>>,
    pub(crate) registrations: Vec<Registration>,
    pub(crate) observations: Vec<Observation>,
    /// Set when a bootstrap write arrives during the hold-off window,
    /// signaling a server-initiated bootstrap.
    pub(crate) bootstrap_write_seen: bool,
    monitors: Vec<(u64, BootstrapMonitor)>,
    next_monitor_id: u64,
    tasks: Vec<JoinHandle<()>>,
}

pub(crate) struct ClientInner {
    pub(crate) name: String,
    pub(crate) objects_path: Option<String>,
    sms: Option<String>,
    pub(crate) endpoint: Arc<dyn Endpoint>,
    pub(crate) state: Mutex<ClientState>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(task) = self.dispatch.lock().take() {
            task.abort();
        }
        for task in self.state.lock().tasks.drain(..) {
            task.abort();
        }
    }
}

/// A LWM2M client.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

/// Builds a [`Client`] from its name, optional paths and objects.
pub struct ClientBuilder {
    name: String,
    objects_path: Option<String>,
    sms: Option<String>,
    objects: BTreeMap<u16, Box<dyn ObjectDispatch>>,
}

impl ClientBuilder {
    pub fn new(name: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            name: name.into(),
            objects_path: None,
            sms: None,
            objects: BTreeMap::new(),
        }
    }

    /// Announces an alternate objects path (`rt="oma.lwm2m"` root entry).
    pub fn objects_path(mut self, path: impl Into<String>) -> ClientBuilder {
        self.objects_path = Some(path.into());
        self
    }

    pub fn sms(mut self, sms: impl Into<String>) -> ClientBuilder {
        self.sms = Some(sms.into());
        self
    }

    /// Registers an object implementation. A second object with the same id
    /// replaces the first.
    pub fn object<O: Object>(mut self, object: O) -> ClientBuilder {
        let object_id = object.object_id();
        if self
            .objects
            .insert(object_id, Box::new(ObjectEntry::new(object)))
            .is_some()
        {
            warn!(object_id, "object registered twice; keeping the last one");
        }
        self
    }

    /// Finishes construction and spawns the inbound dispatch task.
    pub fn build(
        self,
        endpoint: Arc<dyn Endpoint>,
        inbound: mpsc::Receiver<InboundRequest>,
    ) -> Client {
        let client = Client {
            inner: Arc::new(ClientInner {
                name: self.name,
                objects_path: self.objects_path,
                sms: self.sms,
                endpoint,
                state: Mutex::new(ClientState {
                    lifecycle: LifecycleState::Stopped,
                    objects: self.objects,
                    registrations: Vec::new(),
                    observations: Vec::new(),
                    bootstrap_write_seen: false,
                    monitors: Vec::new(),
                    next_monitor_id: 0,
                    tasks: Vec::new(),
                }),
                dispatch: Mutex::new(None),
            }),
        };

        let dispatch_client = client.clone();
        let task = tokio::spawn(dispatch::run(dispatch_client, inbound));
        *client.inner.dispatch.lock() = Some(task);
        client
    }
}

impl Client {
    pub fn builder(name: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.inner.state.lock().lifecycle
    }

    /// Adds an instance with caller-provided state, allocating the next free
    /// instance id. Triggers a registration update when already registered.
    pub fn add_object_instance<T: Send + 'static>(
        &self,
        object_id: u16,
        instance: T,
    ) -> Result<u16, Error> {
        self.insert_instance(object_id, None, Box::new(instance))
    }

    /// Adds an instance under an explicit id; fails on conflict.
    pub fn add_object_instance_with_id<T: Send + 'static>(
        &self,
        object_id: u16,
        instance_id: u16,
        instance: T,
    ) -> Result<(), Error> {
        self.insert_instance(object_id, Some(instance_id), Box::new(instance))
            .map(|_| ())
    }

    fn insert_instance(
        &self,
        object_id: u16,
        instance_id: Option<u16>,
        instance: Box<dyn std::any::Any + Send>,
    ) -> Result<u16, Error> {
        let (id, registered) = {
            let mut state = self.inner.state.lock();
            let entry = state
                .objects
                .get_mut(&object_id)
                .ok_or(Error::UnknownObject { object_id })?;
            let id = entry.insert_instance(instance_id, instance)?;
            for registration in &mut state.registrations {
                registration.dirty = true;
            }
            let registered = matches!(
                state.lifecycle,
                LifecycleState::Registered | LifecycleState::Updating
            );
            (id, registered)
        };
        if registered {
            self.spawn_update();
        }
        Ok(id)
    }

    /// Deletes an instance through the object's `delete` callback and
    /// announces the change to registered servers.
    pub fn remove_object_instance(&self, object_id: u16, instance_id: u16) -> Result<(), Error> {
        let registered = {
            let mut state = self.inner.state.lock();
            let entry = state
                .objects
                .get_mut(&object_id)
                .ok_or(Error::UnknownObject { object_id })?;
            entry.delete(instance_id).map_err(Error::Operation)?;
            for registration in &mut state.registrations {
                registration.dirty = true;
            }
            let deleted = Path::Instance(object_id, instance_id);
            state.observations.retain(|obs| !deleted.contains(&obs.path));
            matches!(
                state.lifecycle,
                LifecycleState::Registered | LifecycleState::Updating
            )
        };
        if registered {
            self.spawn_update();
        }
        Ok(())
    }

    /// Starts the client: registers against every server account found in
    /// the Security object, falling through to bootstrap when none works.
    pub async fn start(&self) -> Result<(), Error> {
        {
            let mut state = self.inner.state.lock();
            match state.lifecycle {
                LifecycleState::Stopped | LifecycleState::BootstrapFinished => {}
                _ => return Err(Error::AlreadyStarted),
            }
            state.lifecycle = LifecycleState::Registering;
        }

        match self.register_all().await {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut state = self.inner.state.lock();
                if state.lifecycle == LifecycleState::Registering {
                    state.lifecycle = LifecycleState::Stopped;
                }
                Err(err)
            }
        }
    }

    /// Stops the client: deregisters everywhere and cancels the timers.
    /// Objects and instances survive for a later `start`.
    pub async fn stop(&self) -> Result<(), Error> {
        let (registrations, tasks) = {
            let mut state = self.inner.state.lock();
            if state.lifecycle == LifecycleState::Stopped {
                return Err(Error::NotStarted);
            }
            state.lifecycle = LifecycleState::Stopped;
            state.observations.clear();
            (
                std::mem::take(&mut state.registrations),
                std::mem::take(&mut state.tasks),
            )
        };

        for task in tasks {
            task.abort();
        }
        for registration in registrations {
            let request = Request::new(Method::Delete, registration.location);
            if let Err(err) = self.inner.endpoint.request(registration.peer, request).await {
                warn!(peer = %registration.peer, error = %err, "deregistration failed");
            }
        }
        Ok(())
    }

    /// Sends a registration update to every registered server.
    pub async fn send_update(&self) -> Result<(), Error> {
        let peers: Vec<SocketAddr> = {
            let state = self.inner.state.lock();
            if state.registrations.is_empty() {
                return Err(Error::NotStarted);
            }
            state.registrations.iter().map(|r| r.peer).collect()
        };

        let mut first_error = None;
        for peer in peers {
            if let Err(err) = self.update_one(peer).await {
                warn!(%peer, error = %err, "registration update failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Notifies every matching observation that the given paths changed.
    pub async fn notify(&self, paths: &[&str]) -> Result<(), Error> {
        let mut changed = Vec::with_capacity(paths.len());
        for path in paths {
            changed.push(path.parse::<Path>()?);
        }
        self.notify_changed(&changed).await;
        Ok(())
    }

    /// Registers a monitor for bootstrap lifecycle events.
    pub fn add_bootstrap_finish_monitor(
        &self,
        monitor: impl Fn(BootstrapEvent) + Send + Sync + 'static,
    ) -> MonitorId {
        let mut state = self.inner.state.lock();
        state.next_monitor_id += 1;
        let id = state.next_monitor_id;
        state.monitors.push((id, Arc::new(monitor)));
        MonitorId(id)
    }

    pub fn del_bootstrap_finish_monitor(&self, id: MonitorId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.monitors.len();
        state.monitors.retain(|(mid, _)| *mid != id.0);
        state.monitors.len() != before
    }

    // ---- internals ----

    async fn register_all(&self) -> Result<(), Error> {
        let accounts = self.scan_accounts()?;
        let bootstrap = accounts.iter().find(|a| a.is_bootstrap).cloned();

        let mut last_error = None;
        let mut registered = 0usize;
        for account in accounts.iter().filter(|a| !a.is_bootstrap) {
            match self.register_account(account).await {
                Ok(()) => registered += 1,
                Err(err) => {
                    warn!(uri = %account.uri, error = %err, "registration failed");
                    last_error = Some(err);
                }
            }
        }

        if registered > 0 {
            self.inner.state.lock().lifecycle = LifecycleState::Registered;
            return Ok(());
        }
        if let Some(account) = bootstrap {
            return self.enter_bootstrap(account);
        }
        Err(last_error.unwrap_or(Error::NoServerAccounts))
    }

    /// Reads the Security and Server objects through the object model to
    /// learn which servers to contact.
    fn scan_accounts(&self) -> Result<Vec<ServerAccount>, Error> {
        let mut state = self.inner.state.lock();

        let mut lifetimes: Vec<(i64, u32)> = Vec::new();
        if let Some(entry) = state.objects.get_mut(&server::OBJECT_ID) {
            for instance_id in entry.instance_ids() {
                let short_id = read_int(entry.as_mut(), instance_id, server::RES_SHORT_SERVER_ID)
                    .unwrap_or(0);
                let lifetime = read_int(entry.as_mut(), instance_id, server::RES_LIFETIME)
                    .unwrap_or(DEFAULT_CLIENT_LIFETIME as i64);
                lifetimes.push((short_id, lifetime.clamp(1, u32::MAX as i64) as u32));
            }
        }

        let mut accounts = Vec::new();
        let Some(entry) = state.objects.get_mut(&security::OBJECT_ID) else {
            return Ok(accounts);
        };
        for instance_id in entry.instance_ids() {
            let Some(uri) = read_string(entry.as_mut(), instance_id, security::RES_SERVER_URI)
            else {
                warn!(instance_id, "security instance without a server uri");
                continue;
            };
            let mode = read_int(entry.as_mut(), instance_id, security::RES_SECURITY_MODE)
                .unwrap_or(3);
            let kind = SecurityModeKind::try_from(mode).map_err(Error::Security)?;
            if kind == SecurityModeKind::Certificate {
                return Err(Error::Security(
                    transport::SecurityError::UnsupportedMode { mode: kind },
                ));
            }

            let is_bootstrap = read_bool(entry.as_mut(), instance_id, security::RES_IS_BOOTSTRAP)
                .unwrap_or(false);
            let short_id = read_int(entry.as_mut(), instance_id, security::RES_SHORT_SERVER_ID)
                .unwrap_or(0);
            let hold_off =
                read_int(entry.as_mut(), instance_id, security::RES_CLIENT_HOLD_OFF_TIME)
                    .unwrap_or(0)
                    .max(0) as u64;
            let lifetime = lifetimes
                .iter()
                .find(|(id, _)| *id == short_id)
                .map(|(_, lifetime)| *lifetime)
                .unwrap_or(DEFAULT_CLIENT_LIFETIME);

            accounts.push(ServerAccount {
                uri,
                is_bootstrap,
                hold_off,
                lifetime,
            });
        }
        Ok(accounts)
    }

    async fn register_account(&self, account: &ServerAccount) -> Result<(), Error> {
        let peer = resolve_uri(&account.uri)?;
        let payload = {
            let state = self.inner.state.lock();
            build_registration_payload(
                self.inner.objects_path.as_deref(),
                &announced_objects(&state),
            )
        };

        let mut request = Request::new(Method::Post, vec!["rd".into()])
            .with_query("ep", &self.inner.name)
            .with_query("lt", account.lifetime)
            .with_query("lwm2m", LWM2M_VERSION)
            .with_query("b", BindingMode::U);
        if let Some(sms) = &self.inner.sms {
            request = request.with_query("sms", sms);
        }
        request.payload = payload.into_bytes().into();

        let response = self.inner.endpoint.request(peer, request).await?;
        if response.code != ResponseCode::Created {
            return Err(Error::RegistrationRejected {
                code: response.code,
            });
        }
        if response.location_path.is_empty() {
            warn!(uri = %account.uri, "registration reply carried no location-path");
            return Err(Error::RegistrationRejected {
                code: response.code,
            });
        }

        info!(
            uri = %account.uri,
            location = %response.location_path.join("/"),
            lifetime = account.lifetime,
            "registered"
        );
        self.inner.state.lock().registrations.push(Registration {
            peer,
            lifetime: account.lifetime,
            location: response.location_path,
            dirty: false,
        });
        self.spawn_heartbeat(peer, account.lifetime);
        Ok(())
    }

    fn spawn_heartbeat(&self, peer: SocketAddr, lifetime: u32) {
        let client = self.clone();
        let period =
            Duration::from_secs(u64::from(lifetime).saturating_sub(UPDATE_MARGIN_SECS).max(1));
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if let Err(err) = client.update_one(peer).await {
                    warn!(%peer, error = %err, "heartbeat update failed");
                }
            }
        });
        self.inner.state.lock().tasks.push(task);
    }

    async fn update_one(&self, peer: SocketAddr) -> Result<(), Error> {
        let (location, payload) = {
            let mut state = self.inner.state.lock();
            let announced = announced_objects(&state);
            let Some(registration) = state.registrations.iter_mut().find(|r| r.peer == peer)
            else {
                return Err(Error::NotStarted);
            };
            let payload = registration
                .dirty
                .then(|| build_registration_payload(self.inner.objects_path.as_deref(), &announced));
            if state.lifecycle == LifecycleState::Registered {
                state.lifecycle = LifecycleState::Updating;
            }
            let location = state
                .registrations
                .iter()
                .find(|r| r.peer == peer)
                .map(|r| r.location.clone())
                .unwrap_or_default();
            (location, payload)
        };

        let mut request = Request::new(Method::Post, location);
        let with_payload = payload.is_some();
        if let Some(payload) = payload {
            request.payload = payload.into_bytes().into();
        }

        let result = self.inner.endpoint.request(peer, request).await;
        {
            let mut state = self.inner.state.lock();
            if state.lifecycle == LifecycleState::Updating {
                state.lifecycle = LifecycleState::Registered;
            }
            if with_payload && result.is_ok() {
                if let Some(registration) =
                    state.registrations.iter_mut().find(|r| r.peer == peer)
                {
                    registration.dirty = false;
                }
            }
        }

        let response = result?;
        if response.code != ResponseCode::Changed {
            return Err(Error::RegistrationRejected {
                code: response.code,
            });
        }
        debug!(%peer, "registration refreshed");
        Ok(())
    }

    fn enter_bootstrap(&self, account: ServerAccount) -> Result<(), Error> {
        let peer = resolve_uri(&account.uri)?;
        {
            let mut state = self.inner.state.lock();
            state.lifecycle = LifecycleState::Bootstrapping;
            state.bootstrap_write_seen = false;
        }
        info!(uri = %account.uri, hold_off = account.hold_off, "waiting for bootstrap");

        let client = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(account.hold_off)).await;
            if client.inner.state.lock().bootstrap_write_seen {
                // A server-initiated bootstrap got here first.
                return;
            }
            debug!("hold-off elapsed, requesting bootstrap");
            let request = Request::new(Method::Post, vec!["bs".into()])
                .with_query("ep", &client.inner.name);
            match client.inner.endpoint.request(peer, request).await {
                Ok(response) if response.code == ResponseCode::Changed => {}
                Ok(response) => {
                    warn!(code = %response.code, "bootstrap request rejected");
                    client.dispatch_bootstrap_event(BootstrapEvent::Error);
                }
                Err(err) => {
                    warn!(error = %err, "bootstrap request failed");
                    client.dispatch_bootstrap_event(BootstrapEvent::Error);
                }
            }
        });
        self.inner.state.lock().tasks.push(task);
        Ok(())
    }

    pub(crate) fn dispatch_bootstrap_event(&self, event: BootstrapEvent) {
        let monitors: Vec<BootstrapMonitor> = {
            let state = self.inner.state.lock();
            state.monitors.iter().map(|(_, m)| Arc::clone(m)).collect()
        };
        for monitor in monitors {
            monitor(event);
        }
    }

    /// Dispatches the finish event and re-registers against the freshly
    /// provisioned accounts.
    pub(crate) fn complete_bootstrap(&self) {
        self.dispatch_bootstrap_event(BootstrapEvent::Finished);
        let client = self.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = client.start().await {
                warn!(error = %err, "re-registration after bootstrap failed");
                client.dispatch_bootstrap_event(BootstrapEvent::Error);
            }
        });
        self.inner.state.lock().tasks.push(task);
    }

    pub(crate) fn spawn_update(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(err) = client.send_update().await {
                debug!(error = %err, "instance-change update not sent");
            }
        });
    }

    /// Re-reads every observed path overlapping a change and emits one
    /// notification per observation, in call order.
    pub(crate) async fn notify_changed(&self, changed: &[Path]) {
        let pending = {
            let mut state = self.inner.state.lock();
            let ClientState {
                objects,
                observations,
                ..
            } = &mut *state;

            let mut pending = Vec::new();
            for observation in observations.iter_mut() {
                if !changed.iter().any(|path| observation.path.overlaps(path)) {
                    continue;
                }
                match dispatch::read_representation(objects, &observation.path) {
                    Ok(payload) => {
                        let sequence = observation.next_sequence();
                        pending.push((observation.peer, observation.token, payload, sequence));
                    }
                    Err(err) => {
                        warn!(path = %observation.path, error = %err, "observed path no longer readable");
                    }
                }
            }
            pending
        };

        for (peer, token, payload, sequence) in pending {
            let response = transport::Response::new(ResponseCode::Content)
                .with_payload(types::ContentFormat::Tlv, payload)
                .with_observe(sequence);
            if let Err(err) = self.inner.endpoint.notify(peer, token, response).await {
                warn!(%peer, %token, error = %err, "notification not delivered");
            }
        }
    }
}

fn announced_objects(state: &ClientState) -> Vec<(u16, Vec<u16>)> {
    state
        .objects
        .iter()
        .map(|(object_id, entry)| (*object_id, entry.instance_ids()))
        .collect()
}

fn read_int(entry: &mut dyn ObjectDispatch, instance_id: u16, resource_id: u16) -> Option<i64> {
    entry
        .read(instance_id, resource_id)
        .ok()
        .and_then(|resource| resource.single_value().and_then(|v| v.as_int()))
}

fn read_bool(entry: &mut dyn ObjectDispatch, instance_id: u16, resource_id: u16) -> Option<bool> {
    entry
        .read(instance_id, resource_id)
        .ok()
        .and_then(|resource| resource.single_value().and_then(|v| v.as_bool()))
}

fn read_string(entry: &mut dyn ObjectDispatch, instance_id: u16, resource_id: u16) -> Option<String> {
    entry
        .read(instance_id, resource_id)
        .ok()
        .and_then(|resource| resource.single_value().and_then(|v| v.as_str().map(String::from)))
}

fn resolve_uri(uri: &str) -> Result<SocketAddr, ClientError> {
    let unresolvable = || ClientError::UnresolvableServer {
        uri: uri.to_string(),
    };
    let parsed = Url::parse(uri).map_err(|_| unresolvable())?;
    let host = parsed.host_str().ok_or_else(unresolvable)?;
    let default_port = match parsed.scheme() {
        "coaps" => DEFAULT_SERVER_PORT_DTLS,
        _ => DEFAULT_SERVER_PORT,
    };
    let port = parsed.port().unwrap_or(default_port);
    (host, port)
        .to_socket_addrs()
        .map_err(|_| unresolvable())?
        .next()
        .ok_or_else(unresolvable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uri_defaults() {
        let addr = resolve_uri("coap://127.0.0.1").expect("resolve");
        assert_eq!(addr.port(), DEFAULT_SERVER_PORT);
        let addr = resolve_uri("coaps://127.0.0.1").expect("resolve");
        assert_eq!(addr.port(), DEFAULT_SERVER_PORT_DTLS);
        let addr = resolve_uri("coap://127.0.0.1:15683").expect("resolve");
        assert_eq!(addr.port(), 15683);
        assert!(resolve_uri("not a uri").is_err());
    }

    #[test]
    fn test_observation_sequence_wraps() {
        let mut observation = Observation {
            token: Token(1),
            peer: "127.0.0.1:1".parse().expect("addr"),
            path: Path::Object(6),
            sequence: transport::message::observe::SEQUENCE_MODULUS - 1,
        };
        assert_eq!(observation.next_sequence(), 0);
        assert_eq!(observation.next_sequence(), 1);
    }
}
