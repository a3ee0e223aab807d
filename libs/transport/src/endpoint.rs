//! The endpoint trait the engines drive, and the inbound request handle they
//! serve.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::TransportError;
use crate::message::{Request, Response, Token};

/// One reply on an observe exchange.
#[derive(Debug)]
pub enum ObserveReply {
    /// A response carrying the exchange token - the initial representation
    /// or a later notification.
    Reply(Response),
    /// The transport gave up on the exchange.
    Failed(TransportError),
}

/// A request received from a peer, with its single-use reply slot.
///
/// Dropping the handle without responding lets the peer's retransmit budget
/// run out; engines always respond, even on errors.
#[derive(Debug)]
pub struct InboundRequest {
    pub peer: SocketAddr,
    /// Whether the request arrived on the DTLS listener.
    pub secure: bool,
    pub token: Token,
    pub request: Request,
    reply: Option<oneshot::Sender<Response>>,
}

impl InboundRequest {
    pub fn new(
        peer: SocketAddr,
        secure: bool,
        token: Token,
        request: Request,
        reply: Option<oneshot::Sender<Response>>,
    ) -> InboundRequest {
        InboundRequest {
            peer,
            secure,
            token,
            request,
            reply,
        }
    }

    /// Sends the response. Exactly once; the slot is consumed.
    pub fn respond(mut self, response: Response) {
        match self.reply.take() {
            Some(sender) => {
                if sender.send(response).is_err() {
                    debug!(peer = %self.peer, "requester stopped waiting for the reply");
                }
            }
            None => debug!(peer = %self.peer, "request had no reply sink"),
        }
    }
}

/// The CoAP service the engines sit on.
///
/// Implementations own sockets, CON retransmission and deduplication; every
/// method returns as soon as the exchange is handed to the transport, and
/// waiting happens through the returned futures and streams.
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    /// Allocates a token unique among this endpoint's active exchanges.
    fn next_token(&self) -> Token;

    /// One-shot confirmable exchange. Resolves `TimedOut` when the
    /// retransmission budget is exhausted without a reply.
    async fn request(&self, peer: SocketAddr, request: Request)
        -> Result<Response, TransportError>;

    /// Fire-and-forget request; no reply is awaited.
    async fn send(&self, peer: SocketAddr, request: Request) -> Result<(), TransportError>;

    /// Multi-reply exchange: a GET with observe 0 whose replies keep arriving
    /// under `token` until the exchange is cancelled. The stream closes when
    /// the transport confirms cancellation or abandons the exchange.
    async fn observe(
        &self,
        peer: SocketAddr,
        token: Token,
        request: Request,
    ) -> Result<mpsc::Receiver<ObserveReply>, TransportError>;

    /// Cancels an observe exchange (a GET with observe 1 on the wire).
    async fn cancel_observe(&self, peer: SocketAddr, token: Token)
        -> Result<(), TransportError>;

    /// Sends a confirmable notification carrying an observation token.
    async fn notify(
        &self,
        peer: SocketAddr,
        token: Token,
        response: Response,
    ) -> Result<(), TransportError>;
}
