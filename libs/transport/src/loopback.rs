//! In-memory transport for wiring engines together inside one process.
//!
//! A [`Network`] is a hub of endpoints addressed by socket address. Exchanges
//! honor the real transport contract: one-shot requests resolve `TimedOut`
//! when the peer never replies, observe exchanges stream token-tagged replies
//! until cancelled, and a partitioned peer behaves like packet loss. The
//! integration suites run every end-to-end scenario over this module.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::endpoint::{Endpoint, InboundRequest, ObserveReply};
use crate::error::TransportError;
use crate::message::{observe, Method, Request, Response, Token};

const INBOUND_CAPACITY: usize = 64;
const OBSERVE_CAPACITY: usize = 32;

#[derive(Clone)]
struct Peer {
    inbound: mpsc::Sender<InboundRequest>,
    secure: bool,
}

struct ObservationRoute {
    replies: mpsc::Sender<ObserveReply>,
    path: Vec<String>,
}

struct NetworkInner {
    peers: Mutex<HashMap<SocketAddr, Peer>>,
    /// Active observe exchanges keyed by (observer address, token).
    observations: Mutex<HashMap<(SocketAddr, Token), ObservationRoute>>,
    partitioned: Mutex<HashSet<SocketAddr>>,
    tokens: AtomicU64,
    reply_timeout: Duration,
}

/// An in-memory network of loopback endpoints.
#[derive(Clone)]
pub struct Network {
    inner: Arc<NetworkInner>,
}

impl Network {
    pub fn new() -> Network {
        Network::with_reply_timeout(Duration::from_secs(2))
    }

    /// The simulated retransmit budget: how long a requester waits before
    /// reporting `TimedOut`.
    pub fn with_reply_timeout(reply_timeout: Duration) -> Network {
        Network {
            inner: Arc::new(NetworkInner {
                peers: Mutex::new(HashMap::new()),
                observations: Mutex::new(HashMap::new()),
                partitioned: Mutex::new(HashSet::new()),
                tokens: AtomicU64::new(1),
                reply_timeout,
            }),
        }
    }

    /// Attaches a NoSec endpoint at `addr`.
    pub fn endpoint(&self, addr: SocketAddr) -> (Arc<LoopbackEndpoint>, mpsc::Receiver<InboundRequest>) {
        self.attach(addr, false)
    }

    /// Attaches an endpoint whose inbound requests carry the secure flag, as
    /// if they arrived on a DTLS listener.
    pub fn secure_endpoint(
        &self,
        addr: SocketAddr,
    ) -> (Arc<LoopbackEndpoint>, mpsc::Receiver<InboundRequest>) {
        self.attach(addr, true)
    }

    fn attach(
        &self,
        addr: SocketAddr,
        secure: bool,
    ) -> (Arc<LoopbackEndpoint>, mpsc::Receiver<InboundRequest>) {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        self.inner.peers.lock().insert(
            addr,
            Peer {
                inbound: tx,
                secure,
            },
        );
        (
            Arc::new(LoopbackEndpoint {
                addr,
                network: Arc::clone(&self.inner),
            }),
            rx,
        )
    }

    /// Simulates packet loss to and from `addr`.
    pub fn partition(&self, addr: SocketAddr) {
        self.inner.partitioned.lock().insert(addr);
    }

    pub fn heal(&self, addr: SocketAddr) {
        self.inner.partitioned.lock().remove(&addr);
    }
}

impl Default for Network {
    fn default() -> Network {
        Network::new()
    }
}

/// One endpoint of a loopback [`Network`].
pub struct LoopbackEndpoint {
    addr: SocketAddr,
    network: Arc<NetworkInner>,
}

impl LoopbackEndpoint {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn is_cut(&self, peer: SocketAddr) -> bool {
        let partitioned = self.network.partitioned.lock();
        partitioned.contains(&peer) || partitioned.contains(&self.addr)
    }

    async fn deliver(
        &self,
        to: SocketAddr,
        token: Token,
        request: Request,
        reply: Option<oneshot::Sender<Response>>,
    ) -> Result<(), TransportError> {
        let peer = self
            .network
            .peers
            .lock()
            .get(&to)
            .cloned()
            .ok_or(TransportError::Unreachable { peer: to })?;
        peer.inbound
            .send(InboundRequest::new(self.addr, peer.secure, token, request, reply))
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}

#[async_trait]
impl Endpoint for LoopbackEndpoint {
    fn next_token(&self) -> Token {
        Token(self.network.tokens.fetch_add(1, Ordering::Relaxed))
    }

    async fn request(
        &self,
        peer: SocketAddr,
        request: Request,
    ) -> Result<Response, TransportError> {
        if self.is_cut(peer) {
            tokio::time::sleep(self.network.reply_timeout).await;
            return Err(TransportError::TimedOut { peer });
        }

        let token = self.next_token();
        let (tx, rx) = oneshot::channel();
        self.deliver(peer, token, request, Some(tx)).await?;

        match tokio::time::timeout(self.network.reply_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // A dropped reply slot is indistinguishable from silence.
            Ok(Err(_)) | Err(_) => Err(TransportError::TimedOut { peer }),
        }
    }

    async fn send(&self, peer: SocketAddr, request: Request) -> Result<(), TransportError> {
        if self.is_cut(peer) {
            return Ok(());
        }
        let token = self.next_token();
        self.deliver(peer, token, request, None).await
    }

    async fn observe(
        &self,
        peer: SocketAddr,
        token: Token,
        request: Request,
    ) -> Result<mpsc::Receiver<ObserveReply>, TransportError> {
        let (replies, stream) = mpsc::channel(OBSERVE_CAPACITY);

        if self.is_cut(peer) {
            let timeout = self.network.reply_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = replies
                    .send(ObserveReply::Failed(TransportError::TimedOut { peer }))
                    .await;
            });
            return Ok(stream);
        }

        self.network.observations.lock().insert(
            (self.addr, token),
            ObservationRoute {
                replies: replies.clone(),
                path: request.path.clone(),
            },
        );

        let (tx, rx) = oneshot::channel();
        self.deliver(peer, token, request, Some(tx)).await?;

        let network = Arc::clone(&self.network);
        let observer = self.addr;
        let timeout = self.network.reply_timeout;
        tokio::spawn(async move {
            let first = match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(response)) => ObserveReply::Reply(response),
                Ok(Err(_)) | Err(_) => {
                    ObserveReply::Failed(TransportError::TimedOut { peer })
                }
            };
            let failed = matches!(first, ObserveReply::Failed(_));
            let _ = replies.send(first).await;
            if failed {
                network.observations.lock().remove(&(observer, token));
            }
        });

        Ok(stream)
    }

    async fn cancel_observe(
        &self,
        peer: SocketAddr,
        token: Token,
    ) -> Result<(), TransportError> {
        let route = self.network.observations.lock().remove(&(self.addr, token));
        let Some(route) = route else {
            debug!(%token, "cancel for an unknown observation");
            return Ok(());
        };

        if !self.is_cut(peer) {
            let mut request = Request::new(Method::Get, route.path);
            request.observe = Some(observe::DEREGISTER);
            // Best effort, like a lost unobserve GET on the wire.
            let _ = self.deliver(peer, token, request, None).await;
        }
        Ok(())
    }

    async fn notify(
        &self,
        peer: SocketAddr,
        token: Token,
        response: Response,
    ) -> Result<(), TransportError> {
        if self.is_cut(peer) {
            return Ok(());
        }
        let replies = self
            .network
            .observations
            .lock()
            .get(&(peer, token))
            .map(|route| route.replies.clone());
        match replies {
            Some(replies) => {
                let _ = replies.send(ObserveReply::Reply(response)).await;
                Ok(())
            }
            None => {
                debug!(%token, "notification for an unknown observation");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ResponseCode;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().expect("test addr")
    }

    #[tokio::test]
    async fn test_request_reply() {
        let network = Network::new();
        let (client, _client_rx) = network.endpoint(addr(10001));
        let (_server, mut server_rx) = network.endpoint(addr(10002));

        tokio::spawn(async move {
            let inbound = server_rx.recv().await.expect("request");
            assert_eq!(inbound.request.path, ["rd"]);
            inbound.respond(Response::new(ResponseCode::Created));
        });

        let response = client
            .request(addr(10002), Request::new(Method::Post, vec!["rd".into()]))
            .await
            .expect("response");
        assert_eq!(response.code, ResponseCode::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partition_times_out() {
        let network = Network::new();
        let (client, _client_rx) = network.endpoint(addr(10003));
        let (_server, _server_rx) = network.endpoint(addr(10004));
        network.partition(addr(10004));

        let err = client
            .request(addr(10004), Request::new(Method::Get, vec!["3".into()]))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::TimedOut { peer: addr(10004) });
    }

    #[tokio::test]
    async fn test_observe_stream_and_cancel() {
        let network = Network::new();
        let (observer, _observer_rx) = network.endpoint(addr(10005));
        let (observed, mut observed_rx) = network.endpoint(addr(10006));

        let observed_task = tokio::spawn(async move {
            // Initial observe GET: reply with the current representation.
            let inbound = observed_rx.recv().await.expect("observe GET");
            assert_eq!(inbound.request.observe, Some(observe::REGISTER));
            let token = inbound.token;
            inbound.respond(Response::new(ResponseCode::Content).with_observe(1));
            // The unobserve GET arrives after cancel_observe.
            let inbound = observed_rx.recv().await.expect("unobserve GET");
            assert_eq!(inbound.request.observe, Some(observe::DEREGISTER));
            assert_eq!(inbound.token, token);
            token
        });

        let token = observer.next_token();
        let request = Request::new(Method::Get, vec!["6".into(), "0".into()])
            .with_observe(observe::REGISTER);
        let mut stream = observer
            .observe(addr(10006), token, request)
            .await
            .expect("observe");

        let first = stream.recv().await.expect("initial reply");
        let ObserveReply::Reply(response) = first else {
            panic!("initial reply failed");
        };
        assert_eq!(response.observe, Some(1));

        // A notification routed by token.
        observed
            .notify(
                addr(10005),
                token,
                Response::new(ResponseCode::Content).with_observe(2),
            )
            .await
            .expect("notify");
        let ObserveReply::Reply(notification) = stream.recv().await.expect("notification")
        else {
            panic!("notification failed");
        };
        assert_eq!(notification.observe, Some(2));

        observer
            .cancel_observe(addr(10006), token)
            .await
            .expect("cancel");
        assert!(stream.recv().await.is_none(), "stream ends after cancel");
        observed_task.await.expect("observed side");
    }
}
