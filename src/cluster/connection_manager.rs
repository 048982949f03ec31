use std::net::SocketAddr;
use tokio::sync::mpsc::Sender;

#[cfg(test)]
use mockall::*;

use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::future::BoxFuture;
use crate::transport::ControlTransport;

/// Manages establishing connections to nodes. This is the seam to the I/O
/// reactor: implementations own sockets, timeouts at the transport level and
/// frame encoding.
pub trait ConnectionManager<T: ControlTransport>: Send + Sync {
    /// Tries to establish a new, ready to use connection. Server-pushed
    /// events go to `event_handler`; a single message on `error_handler`
    /// signals that the connection was lost.
    fn connection(
        &self,
        event_handler: Option<Sender<ServerEvent>>,
        error_handler: Option<Sender<Error>>,
        addr: SocketAddr,
    ) -> BoxFuture<Result<T>>;
}

#[cfg(test)]
mock! {
    pub ConnectionManager<T: ControlTransport> {
    }

    #[allow(dead_code)]
    impl<T: ControlTransport> ConnectionManager<T> for ConnectionManager<T> {
        fn connection<'a>(
            &'a self,
            event_handler: Option<Sender<ServerEvent>>,
            error_handler: Option<Sender<Error>>,
            addr: SocketAddr,
        ) -> BoxFuture<'a, Result<T>>;
    }
}
