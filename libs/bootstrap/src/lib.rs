//! # LWM2M Bootstrap Server Engine
//!
//! ## Purpose
//!
//! Provisions clients over the bootstrap interface: accepts Bootstrap-Request
//! on `/bs` from clients it has bootstrap information for, writes Security
//! and Server object instances, deletes what the client held before, and
//! signals Bootstrap-Finish.
//!
//! This is the only LWM2M surface where a write to `/obj` may carry several
//! object instances in one TLV payload, and the only one where a delete may
//! target `/`. A bootstrap server always runs over DTLS, so at least one
//! security mode is mandatory.

pub mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use transport::{
    Endpoint, InboundRequest, Method, Request, Response, ResponseCode, SecurityConfig,
    TransportError,
};
use types::{ContentFormat, Path, Resource};

pub use error::BootstrapServerError;

/// Bootstrap server configuration. `known_clients` is the closed set of
/// endpoint names this server has bootstrap information for.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub port: u16,
    pub known_clients: Vec<String>,
    pub security: SecurityConfig,
}

impl BootstrapConfig {
    pub fn new(
        port: u16,
        known_clients: impl IntoIterator<Item = impl Into<String>>,
        security: SecurityConfig,
    ) -> BootstrapConfig {
        BootstrapConfig {
            port,
            known_clients: known_clients.into_iter().map(Into::into).collect(),
            security,
        }
    }
}

/// A client inside one bootstrap session. The handle becomes invalid after
/// `send_finish`, which consumes it.
pub struct BootstrapClientInfo {
    name: String,
    address: SocketAddr,
}

impl BootstrapClientInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

/// Handle of a bootstrap-request monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorId(u64);

type RequestMonitor = Arc<dyn Fn(&Arc<BootstrapClientInfo>) + Send + Sync>;

struct BootstrapState {
    clients: Vec<Arc<BootstrapClientInfo>>,
    monitors: Vec<(u64, RequestMonitor)>,
    next_monitor_id: u64,
}

struct BootstrapInner {
    config: BootstrapConfig,
    endpoint: Arc<dyn Endpoint>,
    state: Mutex<BootstrapState>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for BootstrapInner {
    fn drop(&mut self) {
        if let Some(task) = self.dispatch.lock().take() {
            task.abort();
        }
    }
}

/// A LWM2M bootstrap server.
#[derive(Clone)]
pub struct BootstrapServer {
    inner: Arc<BootstrapInner>,
}

impl BootstrapServer {
    /// Creates the server. Fails when the security configuration is empty or
    /// invalid - the bootstrap interface must not run without DTLS.
    pub fn new(
        config: BootstrapConfig,
        endpoint: Arc<dyn Endpoint>,
        inbound: mpsc::Receiver<InboundRequest>,
    ) -> Result<BootstrapServer, BootstrapServerError> {
        config.security.validate(true)?;
        debug!(suites = ?config.security.cipher_suites(), "bootstrap server DTLS configured");

        let server = BootstrapServer {
            inner: Arc::new(BootstrapInner {
                config,
                endpoint,
                state: Mutex::new(BootstrapState {
                    clients: Vec::new(),
                    monitors: Vec::new(),
                    next_monitor_id: 0,
                }),
                dispatch: Mutex::new(None),
            }),
        };

        let dispatch_server = server.clone();
        let task = tokio::spawn(run(dispatch_server, inbound));
        *server.inner.dispatch.lock() = Some(task);
        Ok(server)
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.inner.config
    }

    pub fn add_request_monitor(
        &self,
        monitor: impl Fn(&Arc<BootstrapClientInfo>) + Send + Sync + 'static,
    ) -> MonitorId {
        let mut state = self.inner.state.lock();
        state.next_monitor_id += 1;
        let id = state.next_monitor_id;
        state.monitors.push((id, Arc::new(monitor)));
        MonitorId(id)
    }

    pub fn del_request_monitor(&self, id: MonitorId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.monitors.len();
        state.monitors.retain(|(mid, _)| *mid != id.0);
        state.monitors.len() != before
    }

    /// Writes a whole object: several instances in one TLV payload, each as
    /// an object-instance record. Bootstrap-interface only.
    pub async fn write_object(
        &self,
        client: &Arc<BootstrapClientInfo>,
        path: &str,
        instances: &[(u16, Vec<Resource>)],
    ) -> Result<ResponseCode, BootstrapServerError> {
        let path: Path = path.parse()?;
        if !matches!(path, Path::Object(_)) {
            return Err(BootstrapServerError::InvalidPath {
                path,
                operation: "write_object",
            });
        }
        let payload = codec::encode_object_instances(instances)?;
        let request = Request::for_path(Method::Put, None, &path)
            .with_payload(ContentFormat::Tlv, payload);
        self.exchange(client, request).await
    }

    /// Writes an instance or a resource with a TLV payload of resources.
    pub async fn write(
        &self,
        client: &Arc<BootstrapClientInfo>,
        path: &str,
        resources: &[Resource],
    ) -> Result<ResponseCode, BootstrapServerError> {
        let path: Path = path.parse()?;
        if !matches!(path, Path::Instance(..) | Path::Resource(..)) {
            return Err(BootstrapServerError::InvalidPath {
                path,
                operation: "write",
            });
        }
        let payload = codec::encode_resources(resources)?;
        let request = Request::for_path(Method::Put, None, &path)
            .with_payload(ContentFormat::Tlv, payload);
        self.exchange(client, request).await
    }

    /// Deletes an object instance, or everything via `/` - the client then
    /// erases all instances except the account describing this server.
    pub async fn delete_object_instance(
        &self,
        client: &Arc<BootstrapClientInfo>,
        path: &str,
    ) -> Result<ResponseCode, BootstrapServerError> {
        let path: Path = path.parse()?;
        if matches!(path, Path::Resource(..)) {
            return Err(BootstrapServerError::InvalidPath {
                path,
                operation: "delete",
            });
        }
        let request = Request::for_path(Method::Delete, None, &path);
        self.exchange(client, request).await
    }

    /// Signals Bootstrap-Finish and ends the session; the client-info
    /// handle is consumed and must not be reused.
    pub async fn send_finish(
        &self,
        client: Arc<BootstrapClientInfo>,
    ) -> Result<(), BootstrapServerError> {
        self.ensure_session(&client)?;
        info!(name = client.name(), "sending bootstrap finish");

        let request = Request::new(Method::Post, vec!["bs".to_string()]);
        let result = self.inner.endpoint.send(client.address(), request).await;

        let mut state = self.inner.state.lock();
        state.clients.retain(|c| !Arc::ptr_eq(c, &client));
        drop(state);

        result.map_err(BootstrapServerError::from)
    }

    async fn exchange(
        &self,
        client: &Arc<BootstrapClientInfo>,
        request: Request,
    ) -> Result<ResponseCode, BootstrapServerError> {
        self.ensure_session(client)?;
        match self.inner.endpoint.request(client.address(), request).await {
            Ok(response) => Ok(response.code),
            Err(TransportError::TimedOut { .. }) => Ok(ResponseCode::GatewayTimeout),
            Err(err) => Err(err.into()),
        }
    }

    fn ensure_session(
        &self,
        client: &Arc<BootstrapClientInfo>,
    ) -> Result<(), BootstrapServerError> {
        let state = self.inner.state.lock();
        if state.clients.iter().any(|c| Arc::ptr_eq(c, client)) {
            Ok(())
        } else {
            Err(BootstrapServerError::NoSession {
                name: client.name().to_string(),
            })
        }
    }

    fn dispatch_request(&self, client: &Arc<BootstrapClientInfo>) {
        let monitors: Vec<RequestMonitor> = {
            let state = self.inner.state.lock();
            state.monitors.iter().map(|(_, m)| Arc::clone(m)).collect()
        };
        for monitor in monitors {
            monitor(client);
        }
    }
}

async fn run(server: BootstrapServer, mut inbound: mpsc::Receiver<InboundRequest>) {
    while let Some(request) = inbound.recv().await {
        handle(&server, request);
    }
    debug!("inbound channel closed, bootstrap dispatch ending");
}

fn handle(server: &BootstrapServer, inbound: InboundRequest) {
    if inbound.request.method != Method::Post || inbound.request.path != ["bs"] {
        inbound.respond(Response::new(ResponseCode::NotFound));
        return;
    }

    let name = match inbound.request.query_param("ep") {
        Some(ep) if !ep.is_empty() => ep.to_string(),
        _ => {
            warn!("bootstrap request without an endpoint name");
            inbound.respond(Response::new(ResponseCode::BadRequest));
            return;
        }
    };

    if !server
        .inner
        .config
        .known_clients
        .iter()
        .any(|known| known == &name)
    {
        warn!(name = %name, "no bootstrap information for this client");
        inbound.respond(Response::new(ResponseCode::BadRequest));
        return;
    }

    let client = Arc::new(BootstrapClientInfo {
        name,
        address: inbound.peer,
    });
    server.inner.state.lock().clients.push(Arc::clone(&client));

    info!(name = client.name(), "bootstrap request accepted");
    inbound.respond(Response::new(ResponseCode::Changed));
    server.dispatch_request(&client);
}
