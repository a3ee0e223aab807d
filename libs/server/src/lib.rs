//! # LWM2M Server Engine
//!
//! ## Purpose
//!
//! The management side of the protocol: a registry of clients keyed by their
//! server-assigned location with a name-uniqueness invariant, eviction on
//! lifetime expiry, the management operations (read, write, execute, create,
//! delete), and observation with per-path observer entries fanning
//! notifications out to callbacks.
//!
//! A [`Server`] is a cheap-clone handle. Management operations resolve with
//! the peer's response code; when the transport gives up waiting they
//! resolve with the synthetic `GatewayTimeout` code instead of an error, so
//! completion is delivered exactly once per issued request.

pub mod client_info;
pub mod error;

mod registration;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use transport::message::observe;
use transport::{
    Endpoint, InboundRequest, Method, ObserveReply, Request, Response, ResponseCode,
    SecurityConfig, Token, TransportError,
};
use types::{ContentFormat, Path, RegistrationEvent, Resource};

pub use client_info::ClientInfo;
pub use error::ServerError;

/// Safety margin added to the lifetime timer, tolerating clock skew and
/// in-flight updates.
const EVICTION_MARGIN: Duration = Duration::from_secs(2);

/// Server configuration: ports plus the DTLS security modes handed to the
/// transport. An empty mode list means NoSec only.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub coap_port: u16,
    pub dtls_port: u16,
    pub security: SecurityConfig,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            coap_port: types::constants::DEFAULT_SERVER_PORT,
            dtls_port: types::constants::DEFAULT_SERVER_PORT_DTLS,
            security: SecurityConfig::nosec(),
        }
    }
}

/// Handle of a registration monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorId(u64);

/// Handle of one observer callback on one observed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

/// A read result or observation notification delivered to callbacks.
#[derive(Debug, Clone)]
pub struct ContentUpdate {
    pub client: Arc<ClientInfo>,
    pub path: Path,
    pub code: ResponseCode,
    pub content_format: Option<ContentFormat>,
    pub payload: Bytes,
}

/// The outcome of a management read.
#[derive(Debug, Clone)]
pub struct ReadResponse {
    pub code: ResponseCode,
    pub content_format: Option<ContentFormat>,
    pub payload: Bytes,
}

type RegistrationMonitor = Arc<dyn Fn(&Arc<ClientInfo>, RegistrationEvent) + Send + Sync>;
type ObserverCallback = Arc<dyn Fn(&ContentUpdate) + Send + Sync>;

/// One observed (client, path) pair. Lifecycle: active while callbacks are
/// attached; `removed` once the last one is gone or the client vanishes;
/// dropped from the registry when the transport confirms the exchange ended.
struct ObserverEntry {
    client: Arc<ClientInfo>,
    path: Path,
    token: Token,
    callbacks: Mutex<Vec<(u64, ObserverCallback)>>,
    removed: AtomicBool,
}

impl ObserverEntry {
    fn dispatch(&self, update: &ContentUpdate) {
        let callbacks: Vec<ObserverCallback> = {
            let callbacks = self.callbacks.lock();
            callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in callbacks {
            callback(update);
        }
    }
}

struct ServerState {
    clients: Vec<Arc<ClientInfo>>,
    observers: Vec<Arc<ObserverEntry>>,
    monitors: Vec<(u64, RegistrationMonitor)>,
    next_id: u64,
    lifetime_task: Option<JoinHandle<()>>,
    /// The lifetime value the armed timer was computed for; eviction removes
    /// exactly the expired clients sharing it.
    lifetime_value: u32,
}

struct ServerInner {
    config: ServerConfig,
    endpoint: Arc<dyn Endpoint>,
    state: Mutex<ServerState>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        if let Some(task) = self.dispatch.lock().take() {
            task.abort();
        }
        let mut state = self.state.lock();
        if let Some(task) = state.lifetime_task.take() {
            task.abort();
        }
        for entry in &state.observers {
            entry.removed.store(true, Ordering::Release);
        }
    }
}

/// A LWM2M server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Creates a server over its transport endpoint. Validates the security
    /// configuration and spawns the registration-interface dispatch task.
    pub fn new(
        config: ServerConfig,
        endpoint: Arc<dyn Endpoint>,
        inbound: mpsc::Receiver<InboundRequest>,
    ) -> Result<Server, ServerError> {
        config.security.validate(false)?;
        if config.security.is_secure() {
            debug!(suites = ?config.security.cipher_suites(), "DTLS enabled");
        }

        let server = Server {
            inner: Arc::new(ServerInner {
                config,
                endpoint,
                state: Mutex::new(ServerState {
                    clients: Vec::new(),
                    observers: Vec::new(),
                    monitors: Vec::new(),
                    next_id: 0,
                    lifetime_task: None,
                    lifetime_value: 0,
                }),
                dispatch: Mutex::new(None),
            }),
        };

        let dispatch_server = server.clone();
        let task = tokio::spawn(registration::run(dispatch_server, inbound));
        *server.inner.dispatch.lock() = Some(task);
        Ok(server)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Snapshot of the registered clients, in registration order.
    pub fn get_clients(&self) -> Vec<Arc<ClientInfo>> {
        self.inner.state.lock().clients.clone()
    }

    pub fn add_registration_monitor(
        &self,
        monitor: impl Fn(&Arc<ClientInfo>, RegistrationEvent) + Send + Sync + 'static,
    ) -> MonitorId {
        let mut state = self.inner.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.monitors.push((id, Arc::new(monitor)));
        MonitorId(id)
    }

    pub fn del_registration_monitor(&self, id: MonitorId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.monitors.len();
        state.monitors.retain(|(mid, _)| *mid != id.0);
        state.monitors.len() != before
    }

    // ---- management operations ----

    /// Reads an object, instance or resource from a client.
    pub async fn read(
        &self,
        client: &Arc<ClientInfo>,
        path: &str,
    ) -> Result<ReadResponse, ServerError> {
        let path: Path = path.parse()?;
        if path == Path::Root {
            return Err(ServerError::InvalidPath {
                path,
                operation: "read",
            });
        }
        let request = self.request_for(client, Method::Get, &path);
        let response = self.management_exchange(client, request).await?;
        Ok(ReadResponse {
            code: response.code,
            content_format: response.content_format,
            payload: response.payload,
        })
    }

    /// Writes an instance (partial update, POST) or a resource (replace,
    /// PUT). The payload travels as TLV.
    pub async fn write(
        &self,
        client: &Arc<ClientInfo>,
        path: &str,
        resources: &[Resource],
    ) -> Result<ResponseCode, ServerError> {
        let path: Path = path.parse()?;
        let method = match path {
            Path::Instance(..) => Method::Post,
            Path::Resource(..) => Method::Put,
            _ => {
                return Err(ServerError::InvalidPath {
                    path,
                    operation: "write",
                })
            }
        };
        let payload = codec::encode_resources(resources)?;
        let request = self
            .request_for(client, method, &path)
            .with_payload(ContentFormat::Tlv, payload);
        Ok(self.management_exchange(client, request).await?.code)
    }

    /// Executes a resource with a text argument string.
    pub async fn execute(
        &self,
        client: &Arc<ClientInfo>,
        path: &str,
        args: &str,
    ) -> Result<ResponseCode, ServerError> {
        let path: Path = path.parse()?;
        if !matches!(path, Path::Resource(..)) {
            return Err(ServerError::InvalidPath {
                path,
                operation: "execute",
            });
        }
        let request = self
            .request_for(client, Method::Post, &path)
            .with_payload(ContentFormat::Text, args.as_bytes().to_vec());
        Ok(self.management_exchange(client, request).await?.code)
    }

    /// Creates an object instance; the client assigns the id unless the
    /// TLV payload pins one.
    pub async fn create_object_instance(
        &self,
        client: &Arc<ClientInfo>,
        path: &str,
        resources: &[Resource],
    ) -> Result<ResponseCode, ServerError> {
        let path: Path = path.parse()?;
        if !matches!(path, Path::Object(_) | Path::Instance(..)) {
            return Err(ServerError::InvalidPath {
                path,
                operation: "create",
            });
        }
        let payload = codec::encode_resources(resources)?;
        let request = self
            .request_for(client, Method::Post, &path)
            .with_payload(ContentFormat::Tlv, payload);
        Ok(self.management_exchange(client, request).await?.code)
    }

    /// Deletes an object instance.
    pub async fn delete_object_instance(
        &self,
        client: &Arc<ClientInfo>,
        path: &str,
    ) -> Result<ResponseCode, ServerError> {
        let path: Path = path.parse()?;
        if !matches!(path, Path::Instance(..)) {
            return Err(ServerError::InvalidPath {
                path,
                operation: "delete",
            });
        }
        let request = self.request_for(client, Method::Delete, &path);
        Ok(self.management_exchange(client, request).await?.code)
    }

    // ---- observation ----

    /// Attaches a callback to the observation of (client, path). The first
    /// callback allocates a token and subscribes on the wire; later ones
    /// share the entry.
    pub async fn add_observer(
        &self,
        client: &Arc<ClientInfo>,
        path: &str,
        callback: impl Fn(&ContentUpdate) + Send + Sync + 'static,
    ) -> Result<ObserverId, ServerError> {
        let path: Path = path.parse()?;
        if path == Path::Root {
            return Err(ServerError::InvalidPath {
                path,
                operation: "observe",
            });
        }
        self.ensure_registered(client)?;

        let callback: ObserverCallback = Arc::new(callback);
        let (entry, id, is_new) = {
            let mut state = self.inner.state.lock();
            state.next_id += 1;
            let id = state.next_id;

            match state.observers.iter().find(|entry| {
                Arc::ptr_eq(&entry.client, client)
                    && entry.path == path
                    && !entry.removed.load(Ordering::Acquire)
            }) {
                Some(entry) => {
                    entry.callbacks.lock().push((id, callback));
                    (Arc::clone(entry), id, false)
                }
                None => {
                    let entry = Arc::new(ObserverEntry {
                        client: Arc::clone(client),
                        path,
                        token: self.inner.endpoint.next_token(),
                        callbacks: Mutex::new(vec![(id, callback)]),
                        removed: AtomicBool::new(false),
                    });
                    state.observers.push(Arc::clone(&entry));
                    (entry, id, true)
                }
            }
        };

        if !is_new {
            return Ok(ObserverId(id));
        }

        let request = self
            .request_for(client, Method::Get, &path)
            .with_observe(observe::REGISTER);
        match self
            .inner
            .endpoint
            .observe(client.address(), entry.token, request)
            .await
        {
            Ok(stream) => {
                self.spawn_observer_task(Arc::clone(&entry), stream);
                Ok(ObserverId(id))
            }
            Err(err) => {
                let mut state = self.inner.state.lock();
                state.observers.retain(|e| !Arc::ptr_eq(e, &entry));
                Err(err.into())
            }
        }
    }

    /// Detaches one callback. When the last one goes, the entry is marked
    /// removed and the unobserve is sent; the entry disappears once the
    /// transport confirms.
    pub async fn del_observer(
        &self,
        client: &Arc<ClientInfo>,
        path: &str,
        id: ObserverId,
    ) -> Result<(), ServerError> {
        let path: Path = path.parse()?;

        let (entry, last) = {
            let state = self.inner.state.lock();
            let entry = state
                .observers
                .iter()
                .find(|entry| {
                    Arc::ptr_eq(&entry.client, client)
                        && entry.path == path
                        && !entry.removed.load(Ordering::Acquire)
                })
                .cloned()
                .ok_or(ServerError::NoObserver { path })?;

            let mut callbacks = entry.callbacks.lock();
            let before = callbacks.len();
            callbacks.retain(|(cid, _)| *cid != id.0);
            if callbacks.len() == before {
                return Err(ServerError::NoObserver { path });
            }
            let last = callbacks.is_empty();
            drop(callbacks);
            (entry, last)
        };

        if last {
            entry.removed.store(true, Ordering::Release);
            self.inner
                .endpoint
                .cancel_observe(client.address(), entry.token)
                .await?;
        }
        Ok(())
    }

    // ---- internals ----

    fn request_for(&self, client: &Arc<ClientInfo>, method: Method, path: &Path) -> Request {
        let objects_path = client.objects_path();
        Request::for_path(method, objects_path.as_deref(), path)
    }

    async fn management_exchange(
        &self,
        client: &Arc<ClientInfo>,
        request: Request,
    ) -> Result<Response, ServerError> {
        self.ensure_registered(client)?;
        match self.inner.endpoint.request(client.address(), request).await {
            Ok(response) => Ok(response),
            // The transport's give-up surfaces as the synthetic code.
            Err(TransportError::TimedOut { .. }) => {
                Ok(Response::new(ResponseCode::GatewayTimeout))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn ensure_registered(&self, client: &Arc<ClientInfo>) -> Result<(), ServerError> {
        let state = self.inner.state.lock();
        if state.clients.iter().any(|c| Arc::ptr_eq(c, client)) {
            Ok(())
        } else {
            Err(ServerError::UnknownClient {
                name: client.name().to_string(),
            })
        }
    }

    fn spawn_observer_task(
        &self,
        entry: Arc<ObserverEntry>,
        mut stream: mpsc::Receiver<ObserveReply>,
    ) {
        let server = self.clone();
        tokio::spawn(async move {
            while let Some(reply) = stream.recv().await {
                match reply {
                    ObserveReply::Reply(response) => {
                        if entry.removed.load(Ordering::Acquire) {
                            continue;
                        }
                        entry.dispatch(&ContentUpdate {
                            client: Arc::clone(&entry.client),
                            path: entry.path,
                            code: response.code,
                            content_format: response.content_format,
                            payload: response.payload,
                        });
                    }
                    ObserveReply::Failed(err) => {
                        warn!(
                            client = entry.client.name(),
                            path = %entry.path,
                            error = %err,
                            "observation failed"
                        );
                        if !entry.removed.load(Ordering::Acquire) {
                            entry.dispatch(&ContentUpdate {
                                client: Arc::clone(&entry.client),
                                path: entry.path,
                                code: ResponseCode::GatewayTimeout,
                                content_format: None,
                                payload: Bytes::new(),
                            });
                        }
                        break;
                    }
                }
            }
            // The exchange is over; drop the entry.
            let mut state = server.inner.state.lock();
            state.observers.retain(|e| !Arc::ptr_eq(e, &entry));
            debug!(client = entry.client.name(), path = %entry.path, "observer entry dropped");
        });
    }

    pub(crate) fn find_client_by_name(&self, name: &str) -> Option<Arc<ClientInfo>> {
        let state = self.inner.state.lock();
        state.clients.iter().find(|c| c.name() == name).cloned()
    }

    pub(crate) fn find_client_by_location(&self, location: &str) -> Option<Arc<ClientInfo>> {
        let state = self.inner.state.lock();
        state
            .clients
            .iter()
            .find(|c| c.location() == location)
            .cloned()
    }

    pub(crate) fn register_client(&self, client: Arc<ClientInfo>) {
        self.inner.state.lock().clients.push(client);
        self.reschedule_lifetime();
    }

    /// Removes a client and unsubscribes its observations. No registration
    /// event is dispatched here; callers pick the right one.
    pub(crate) async fn remove_client(&self, client: &Arc<ClientInfo>) {
        let cancellations: Vec<(std::net::SocketAddr, Token)> = {
            let mut state = self.inner.state.lock();
            state.clients.retain(|c| !Arc::ptr_eq(c, client));
            state
                .observers
                .iter()
                .filter(|entry| Arc::ptr_eq(&entry.client, client))
                .map(|entry| {
                    entry.removed.store(true, Ordering::Release);
                    (entry.client.address(), entry.token)
                })
                .collect()
        };
        for (address, token) in cancellations {
            if let Err(err) = self.inner.endpoint.cancel_observe(address, token).await {
                warn!(client = client.name(), error = %err, "unobserve on removal failed");
            }
        }
    }

    pub(crate) fn dispatch_event(&self, client: &Arc<ClientInfo>, event: RegistrationEvent) {
        let monitors: Vec<RegistrationMonitor> = {
            let state = self.inner.state.lock();
            state.monitors.iter().map(|(_, m)| Arc::clone(m)).collect()
        };
        for monitor in monitors {
            monitor(client, event);
        }
    }

    /// Re-arms the single lifetime timer for the earliest deadline plus the
    /// safety margin.
    pub(crate) fn reschedule_lifetime(&self) {
        let mut state = self.inner.state.lock();
        if let Some(task) = state.lifetime_task.take() {
            task.abort();
        }

        let earliest = state
            .clients
            .iter()
            .map(|client| (client.deadline(), client.lifetime()))
            .min_by_key(|(deadline, _)| *deadline);
        let Some((deadline, lifetime)) = earliest else {
            state.lifetime_value = 0;
            debug!("client list is empty, lifetime timer disarmed");
            return;
        };

        state.lifetime_value = lifetime;
        let server = self.clone();
        state.lifetime_task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline + EVICTION_MARGIN).await;
            server.evict_expired().await;
        }));
    }

    async fn evict_expired(&self) {
        let now = Instant::now();
        let expired: Vec<Arc<ClientInfo>> = {
            let state = self.inner.state.lock();
            let lifetime = state.lifetime_value;
            state
                .clients
                .iter()
                .filter(|client| client.lifetime() == lifetime && client.deadline() <= now)
                .cloned()
                .collect()
        };

        for client in expired {
            info!(name = client.name(), "discarding client after lifetime expiry");
            self.remove_client(&client).await;
            self.dispatch_event(&client, RegistrationEvent::Timeout);
        }
        self.reschedule_lifetime();
    }
}
