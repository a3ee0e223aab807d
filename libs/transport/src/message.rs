//! CoAP message model.
//!
//! A deliberately small rendering of the options the LWM2M interfaces use:
//! uri-path and uri-query, content-format, observe and location-path. The
//! transport owns everything else (message ids, retransmission, blockwise).

use std::fmt;

use bytes::Bytes;

use types::{ContentFormat, Path};

/// The token correlating an exchange; allocated by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// CoAP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// CoAP message types. Only CON exchanges and their ACKs matter to the
/// engines; NON is modeled for completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Con,
    Non,
    Ack,
}

/// CoAP response codes, plus nothing: the engines map codes straight
/// through. `GatewayTimeout` doubles as the synthetic code for "the
/// transport gave up waiting".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Created,
    Deleted,
    Valid,
    Changed,
    Content,
    BadRequest,
    Unauthorized,
    BadOption,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    PreconditionFailed,
    RequestEntityTooLarge,
    UnsupportedContentFormat,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    ProxyingNotSupported,
}

impl ResponseCode {
    /// The `class.detail` byte on the wire.
    pub fn code(&self) -> u8 {
        let (class, detail) = match self {
            ResponseCode::Created => (2, 1),
            ResponseCode::Deleted => (2, 2),
            ResponseCode::Valid => (2, 3),
            ResponseCode::Changed => (2, 4),
            ResponseCode::Content => (2, 5),
            ResponseCode::BadRequest => (4, 0),
            ResponseCode::Unauthorized => (4, 1),
            ResponseCode::BadOption => (4, 2),
            ResponseCode::Forbidden => (4, 3),
            ResponseCode::NotFound => (4, 4),
            ResponseCode::MethodNotAllowed => (4, 5),
            ResponseCode::NotAcceptable => (4, 6),
            ResponseCode::PreconditionFailed => (4, 12),
            ResponseCode::RequestEntityTooLarge => (4, 13),
            ResponseCode::UnsupportedContentFormat => (4, 15),
            ResponseCode::InternalServerError => (5, 0),
            ResponseCode::NotImplemented => (5, 1),
            ResponseCode::BadGateway => (5, 2),
            ResponseCode::ServiceUnavailable => (5, 3),
            ResponseCode::GatewayTimeout => (5, 4),
            ResponseCode::ProxyingNotSupported => (5, 5),
        };
        (class << 5) | detail
    }

    pub fn is_success(&self) -> bool {
        self.code() >> 5 == 2
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        write!(f, "{}.{:02}", code >> 5, code & 0x1F)
    }
}

/// Observe option values with request-side meaning.
pub mod observe {
    /// GET with observe 0 subscribes.
    pub const REGISTER: u32 = 0;
    /// GET with observe 1 unsubscribes.
    pub const DEREGISTER: u32 = 1;
    /// Notification sequence numbers are 24-bit.
    pub const SEQUENCE_MODULUS: u32 = 1 << 24;
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub msg_type: MessageType,
    pub path: Vec<String>,
    pub query: Vec<String>,
    pub content_format: Option<ContentFormat>,
    pub observe: Option<u32>,
    pub payload: Bytes,
}

impl Request {
    pub fn new(method: Method, path: Vec<String>) -> Request {
        Request {
            method,
            msg_type: MessageType::Con,
            path,
            query: Vec::new(),
            content_format: None,
            observe: None,
            payload: Bytes::new(),
        }
    }

    /// Builds a request against an LWM2M path, honoring the client's
    /// alternate objects-path prefix when one was announced.
    pub fn for_path(method: Method, objects_path: Option<&str>, path: &Path) -> Request {
        let mut segments = Vec::new();
        if let Some(prefix) = objects_path {
            segments.extend(
                prefix
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        segments.extend(path.segments());
        Request::new(method, segments)
    }

    pub fn with_query(mut self, key: &str, value: impl fmt::Display) -> Request {
        self.query.push(format!("{}={}", key, value));
        self
    }

    pub fn with_payload(mut self, format: ContentFormat, payload: impl Into<Bytes>) -> Request {
        self.content_format = Some(format);
        self.payload = payload.into();
        self
    }

    pub fn with_observe(mut self, observe: u32) -> Request {
        self.observe = Some(observe);
        self
    }

    /// Value of the first `key=value` query item matching `key`.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.iter().find_map(|item| {
            let (k, v) = item.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// True when the query carries `key` at all, even with an empty value.
    pub fn has_query_param(&self, key: &str) -> bool {
        self.query
            .iter()
            .any(|item| item.split_once('=').map(|(k, _)| k) == Some(key))
    }
}

/// An outbound or received response.
#[derive(Debug, Clone)]
pub struct Response {
    pub code: ResponseCode,
    pub content_format: Option<ContentFormat>,
    pub location_path: Vec<String>,
    pub observe: Option<u32>,
    pub payload: Bytes,
}

impl Response {
    pub fn new(code: ResponseCode) -> Response {
        Response {
            code,
            content_format: None,
            location_path: Vec::new(),
            observe: None,
            payload: Bytes::new(),
        }
    }

    pub fn with_payload(mut self, format: ContentFormat, payload: impl Into<Bytes>) -> Response {
        self.content_format = Some(format);
        self.payload = payload.into();
        self
    }

    pub fn with_location(mut self, segments: Vec<String>) -> Response {
        self.location_path = segments;
        self
    }

    pub fn with_observe(mut self, sequence: u32) -> Response {
        self.observe = Some(sequence);
        self
    }
}
