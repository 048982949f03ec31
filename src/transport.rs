//! Contract between the control connection and the injected I/O layer. A
//! concrete transport owns one framed connection to one node and is expected
//! to perform request/response correlation and frame encoding itself.

use std::net::SocketAddr;
use std::time::Duration;

#[cfg(test)]
use mockall::*;

use crate::error::{Error, Result};
use crate::frame::{Request, Response};
use crate::future::BoxFuture;

/// A single established connection to a node.
pub trait ControlTransport: Send + Sync {
    /// Schedules the request for writing and waits for the matching response.
    fn send(&self, request: Request) -> BoxFuture<Result<Response>>;

    /// Checks if the connection is still usable (e.g. after read or write
    /// errors).
    fn is_connected(&self) -> bool;

    /// Closes the connection. Never fails; a connection that is already gone
    /// is considered closed.
    fn close(&self) -> BoxFuture<()>;

    /// Returns the associated node address.
    fn address(&self) -> SocketAddr;
}

#[cfg(test)]
mock! {
    pub ControlTransport {
    }

    impl ControlTransport for ControlTransport {
        fn send(&self, request: Request) -> BoxFuture<'static, Result<Response>>;
        fn is_connected(&self) -> bool;
        fn close(&self) -> BoxFuture<'static, ()>;
        fn address(&self) -> SocketAddr;
    }
}

/// Issues one request on one connection, bounding the wait by `timeout`.
/// Timeouts are reported as [`Error::Timeout`] and count as a failure of the
/// current candidate host, never of the whole registry.
pub async fn execute<T: ControlTransport + ?Sized>(
    transport: &T,
    request: Request,
    timeout: Duration,
) -> Result<Response> {
    tokio::time::timeout(timeout, transport.send(request))
        .await
        .map_err(|_| Error::Timeout(format!("request to {} timed out", transport.address())))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ResultBody;
    use futures::FutureExt;

    #[tokio::test(start_paused = true)]
    async fn execute_times_out_stalled_requests() {
        let mut transport = MockControlTransport::new();
        transport
            .expect_send()
            .return_once(|_| futures::future::pending().boxed());
        transport
            .expect_address()
            .return_const("127.0.0.1:9042".parse::<SocketAddr>().unwrap());

        let result = execute(&transport, Request::Options, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn execute_passes_responses_through() {
        let mut transport = MockControlTransport::new();
        transport
            .expect_send()
            .return_once(|_| futures::future::ready(Ok(Response::Result(ResultBody::Void))).boxed());

        let response = execute(&transport, Request::Options, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response, Response::Result(ResultBody::Void));
    }
}
