//! Tagged message model for the framed wire protocol. Encoding and decoding of
//! actual frames is the job of the injected transport layer; the core only
//! deals with these shapes.

use fxhash::FxHashMap;
use std::net::IpAddr;
use uuid::Uuid;

use crate::events::{ServerEvent, SimpleServerEvent};

/// Default CQL native protocol port.
pub const DEFAULT_PORT: u16 = 9042;

/// CQL version announced in `Startup`.
pub const CQL_VERSION: &str = "3.0.0";

/// Newest protocol version attempted when none is configured. Negotiation
/// walks downward from the configured version, one step per rejection.
pub const DEFAULT_PROTOCOL_VERSION: u8 = 4;

/// Server error code denoting a protocol version mismatch.
pub const PROTOCOL_VERSION_MISMATCH: i32 = 0x000A;

/// Requests the control connection issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Options,
    Startup { cql_version: String },
    AuthResponse { token: Vec<u8> },
    Register { events: Vec<SimpleServerEvent> },
    Query { query: String },
}

impl Request {
    /// `Startup` announcing the supported CQL version.
    pub fn new_startup() -> Self {
        Request::Startup {
            cql_version: CQL_VERSION.into(),
        }
    }

    /// `Register` subscribing to the given event families.
    pub fn new_register(events: Vec<SimpleServerEvent>) -> Self {
        Request::Register { events }
    }
}

/// Responses and pushed frames the control connection consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Supported,
    Ready,
    Authenticate { authenticator: String },
    AuthChallenge { token: Vec<u8> },
    AuthSuccess { token: Vec<u8> },
    Error { code: i32, message: String },
    Result(ResultBody),
    Event(ServerEvent),
}

impl Response {
    /// Wire name of the response kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Supported => "SUPPORTED",
            Response::Ready => "READY",
            Response::Authenticate { .. } => "AUTHENTICATE",
            Response::AuthChallenge { .. } => "AUTH_CHALLENGE",
            Response::AuthSuccess { .. } => "AUTH_SUCCESS",
            Response::Error { .. } => "ERROR",
            Response::Result(_) => "RESULT",
            Response::Event(_) => "EVENT",
        }
    }
}

/// Body of a `Result` response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultBody {
    Void,
    SetKeyspace(String),
    Rows(Vec<Row>),
}

/// One row of a `Rows` result, as a name to value mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: FxHashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a column, consuming and returning the row.
    pub fn with_column(mut self, name: impl Into<String>, value: Value) -> Self {
        self.columns.insert(name.into(), value);
        self
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.columns.get(name) {
            Some(Value::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn uuid(&self, name: &str) -> Option<Uuid> {
        match self.columns.get(name) {
            Some(Value::Uuid(uuid)) => Some(*uuid),
            _ => None,
        }
    }

    pub fn inet(&self, name: &str) -> Option<IpAddr> {
        match self.columns.get(name) {
            Some(Value::Inet(addr)) => Some(*addr),
            _ => None,
        }
    }
}

/// Decoded column value. Only the types topology discovery reads are modeled.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Uuid(Uuid),
    Inet(IpAddr),
    Null,
}
