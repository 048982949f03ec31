use fxhash::FxHashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::result;
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Errors raised by the control-plane core. Two kinds escape to callers:
/// [`Error::NoHostsAvailable`] when a connection attempt exhausts every known
/// host, and [`Error::Authentication`] when the server rejects the handshake.
/// The remaining variants describe per-host failures and are reported inside
/// the `NoHostsAvailable` error map.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Internal IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// General error.
    #[error("General error: {0}")]
    General(String),
    /// Timed out waiting for an operation to complete.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Error frame returned by the server.
    #[error("Server error 0x{code:04x}: {message}")]
    Server { code: i32, message: String },
    /// The server does not speak the protocol version used for the request.
    #[error("Unsupported protocol version at {0}")]
    InvalidProtocol(SocketAddr),
    /// Authentication was refused, or cannot be performed at the negotiated
    /// protocol version.
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// Every candidate host failed; the map carries the last error per host.
    #[error("No hosts available for connection")]
    NoHostsAvailable { errors: FxHashMap<IpAddr, Error> },
    /// Unknown server event.
    #[error("Unknown server event: {0}")]
    UnknownServerEvent(String),
    /// Unexpected startup response.
    #[error("Unexpected startup response: {0}")]
    UnexpectedStartupResponse(&'static str),
    /// Unexpected response to an auth message.
    #[error("Unexpected auth response: {0}")]
    UnexpectedAuthResponse(&'static str),
    /// Response kind does not match the request that produced it.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(&'static str),
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::General(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error::General(err.to_string())
    }
}
