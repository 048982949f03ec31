use arc_swap::ArcSwapOption;
use fxhash::FxHashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{channel, Receiver};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::*;

use crate::cluster::{
    ClusterConfig, ClusterListener, ClusterRegistry, ConnectionManager, HostAttributes,
};
use crate::error::{Error, Result};
use crate::events::{ServerEvent, SimpleServerEvent, StatusChangeType, TopologyChangeType};
use crate::frame::{Request, Response, ResultBody, Row, PROTOCOL_VERSION_MISMATCH};
use crate::transport::{execute, ControlTransport};

const EVENT_CHANNEL_CAPACITY: usize = 32;

const SELECT_LOCAL: &str =
    "SELECT data_center, rack, host_id, release_version FROM system.local";
const SELECT_PEERS: &str =
    "SELECT peer, rpc_address, data_center, rack, host_id, release_version FROM system.peers";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Closing,
    Closed,
}

/// The single long-lived administrative connection to the cluster.
///
/// On [`connect`](Self::connect) it walks the registry's known addresses,
/// negotiates a protocol version, passes the authentication gate, discovers
/// the topology into the registry and subscribes to server-pushed status and
/// topology events. When the bound connection is lost it keeps reconnecting
/// on the configured schedule until [`close`](Self::close) is called.
pub struct ControlConnection<T: ControlTransport + 'static, CM: ConnectionManager<T> + 'static> {
    connection_manager: Arc<CM>,
    config: Arc<ClusterConfig>,
    registry: Arc<ClusterRegistry>,
    transport: ArcSwapOption<T>,
    state: Mutex<ConnectionState>,
    reconnect_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: ControlTransport + 'static, CM: ConnectionManager<T> + 'static> ControlConnection<T, CM> {
    /// Creates the control connection and subscribes the configured
    /// load-balancing policy to registry notifications.
    pub fn new(
        connection_manager: Arc<CM>,
        config: Arc<ClusterConfig>,
        registry: Arc<ClusterRegistry>,
    ) -> Arc<Self> {
        let load_balancing: Arc<dyn ClusterListener> = config.load_balancing().clone();
        registry.add_listener(load_balancing);

        Arc::new(ControlConnection {
            connection_manager,
            config,
            registry,
            transport: ArcSwapOption::empty(),
            state: Mutex::new(ConnectionState::Idle),
            reconnect_handle: Mutex::new(None),
        })
    }

    /// Currently bound transport, if connected.
    pub fn transport(&self) -> Option<Arc<T>> {
        self.transport.load_full()
    }

    pub fn is_connected(&self) -> bool {
        *self.state.lock().unwrap() == ConnectionState::Connected
    }

    /// Establishes the control connection. Idempotent: calling on an already
    /// connected instance succeeds immediately. When every known host fails,
    /// resolves to [`Error::NoHostsAvailable`] carrying the last error per
    /// address.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Closing | ConnectionState::Closed => {
                    return Err(Error::General("control connection is closed".into()))
                }
                _ => *state = ConnectionState::Connecting,
            }
        }
        self.cancel_reconnect();

        let result = self.try_connect().await;
        if result.is_err() {
            let mut state = self.state.lock().unwrap();
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Idle;
            }
        }

        result
    }

    /// Shuts the control connection down: cancels any scheduled reconnection,
    /// closes the bound connection and stops all event handling. Never fails,
    /// and completes immediately when nothing was ever connected.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closing;
        }
        self.cancel_reconnect();

        if let Some(transport) = self.transport.swap(None) {
            transport.close().await;
        }

        *self.state.lock().unwrap() = ConnectionState::Closed;
    }

    /// One full connection attempt over the registry's current addresses,
    /// driving version negotiation across attempts.
    async fn try_connect(self: &Arc<Self>) -> Result<()> {
        let mut errors = FxHashMap::default();
        'negotiation: loop {
            let version = self.config.protocol_version();
            for ip in self.registry.ips() {
                match self.connect_host(ip).await {
                    Ok(transport) => {
                        if !self.mark_connected() {
                            transport.close().await;
                            return Err(Error::General("control connection is closed".into()));
                        }
                        self.transport.store(Some(transport));
                        debug!("Established new control connection.");
                        return Ok(());
                    }
                    Err(error @ Error::InvalidProtocol(_)) => {
                        errors.insert(ip, error);

                        let next = version.saturating_sub(1);
                        if next == 0 {
                            return Err(Error::NoHostsAvailable { errors });
                        }

                        warn!(
                            "could not connect using protocol version {} (will try again with {})",
                            version, next
                        );
                        self.config.set_protocol_version(next);
                        continue 'negotiation;
                    }
                    Err(error) => {
                        errors.insert(ip, error);
                    }
                }
            }

            return Err(Error::NoHostsAvailable { errors });
        }
    }

    /// Opens a connection to one candidate and runs the full handshake:
    /// `Options`, `Startup` (with the authentication gate), discovery and the
    /// event subscription.
    async fn connect_host(self: &Arc<Self>, ip: IpAddr) -> Result<Arc<T>> {
        let addr = SocketAddr::new(ip, self.config.port());
        let timeout = self.config.connection_timeout();

        let (event_sender, event_receiver) = channel(EVENT_CHANNEL_CAPACITY);
        let (error_sender, error_receiver) = channel(1);

        let transport = tokio::time::timeout(
            timeout,
            self.connection_manager
                .connection(Some(event_sender), Some(error_sender), addr),
        )
        .await
        .map_err(|_| Error::Timeout(format!("connection to {addr} timed out")))??;
        let transport = Arc::new(transport);

        if let Err(error) = self.handshake(&transport, ip, timeout).await {
            transport.close().await;
            return Err(error);
        }

        self.spawn_event_handler(event_receiver);
        self.spawn_loss_watch(&transport, error_receiver);

        Ok(transport)
    }

    async fn handshake(&self, transport: &T, ip: IpAddr, timeout: Duration) -> Result<()> {
        self.negotiate(transport, timeout).await?;
        self.startup(transport, timeout).await?;
        self.discover(transport, ip, timeout).await?;
        self.subscribe(transport, timeout).await
    }

    /// Issues `Options` to probe whether the server speaks the current
    /// protocol version.
    async fn negotiate(&self, transport: &T, timeout: Duration) -> Result<()> {
        match execute(transport, Request::Options, timeout).await? {
            Response::Supported => Ok(()),
            Response::Error { code, .. } if code == PROTOCOL_VERSION_MISMATCH => {
                Err(Error::InvalidProtocol(transport.address()))
            }
            Response::Error { code, message } => Err(Error::Server { code, message }),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }

    async fn startup(&self, transport: &T, timeout: Duration) -> Result<()> {
        match execute(transport, Request::new_startup(), timeout).await? {
            Response::Ready => Ok(()),
            Response::Authenticate { authenticator } => {
                self.authenticate(transport, authenticator, timeout).await
            }
            Response::Error { code, message } => Err(Error::Server { code, message }),
            other => Err(Error::UnexpectedStartupResponse(other.kind())),
        }
    }

    /// Runs the SASL exchange against the configured provider. Protocol
    /// version 1 predates `AuthResponse`, so servers demanding authentication
    /// there cannot be satisfied on this path.
    async fn authenticate(
        &self,
        transport: &T,
        authenticator: String,
        timeout: Duration,
    ) -> Result<()> {
        let version = self.config.protocol_version();
        if version < 2 {
            return Err(Error::Authentication(format!(
                "server at {} requested {authenticator} authentication, \
                 which is not supported at protocol version {version}",
                transport.address()
            )));
        }

        let provider = self.config.authenticator_provider();
        let name = provider.name().ok_or_else(|| {
            Error::Authentication(format!(
                "server requested {authenticator} authentication, but no credentials were configured"
            ))
        })?;
        if name != authenticator {
            return Err(Error::Authentication(format!(
                "unsupported authenticator {authenticator}, driver provides {name}"
            )));
        }

        let authenticator = provider.create_authenticator();
        let mut response = execute(
            transport,
            Request::AuthResponse {
                token: authenticator.initial_response(),
            },
            timeout,
        )
        .await?;

        loop {
            match response {
                Response::AuthChallenge { token } => {
                    let token = authenticator.evaluate_challenge(token)?;
                    response = execute(transport, Request::AuthResponse { token }, timeout).await?;
                }
                Response::AuthSuccess { token } => {
                    authenticator.handle_success(token)?;
                    return Ok(());
                }
                Response::Error { code, message } => {
                    return Err(Error::Authentication(format!("0x{code:04x}: {message}")))
                }
                other => return Err(Error::UnexpectedAuthResponse(other.kind())),
            }
        }
    }

    /// Populates the registry from `system.local` and `system.peers`.
    async fn discover(&self, transport: &T, ip: IpAddr, timeout: Duration) -> Result<()> {
        let rows = self.query(transport, SELECT_LOCAL, timeout).await?;
        let local = rows
            .first()
            .ok_or_else(|| Error::General(format!("no row in system.local on {ip}")))?;
        self.registry
            .host_found(ip, Some(HostAttributes::from_row(local)));

        debug!("Looking for additional nodes");
        let rows = self.query(transport, SELECT_PEERS, timeout).await?;
        let mut found = 0;
        for row in &rows {
            match peer_ip(row) {
                Some(peer) => {
                    self.registry
                        .host_found(peer, Some(HostAttributes::from_row(row)));
                    found += 1;
                }
                None => warn!("Ignoring system.peers row without usable address"),
            }
        }
        debug!("{} additional nodes found", found);

        Ok(())
    }

    /// Subscribes to status and topology events on this connection.
    async fn subscribe(&self, transport: &T, timeout: Duration) -> Result<()> {
        let request = Request::new_register(vec![
            SimpleServerEvent::StatusChange,
            SimpleServerEvent::TopologyChange,
        ]);
        match execute(transport, request, timeout).await? {
            Response::Ready => Ok(()),
            Response::Error { code, message } => Err(Error::Server { code, message }),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }

    async fn query(&self, transport: &T, cql: &str, timeout: Duration) -> Result<Vec<Row>> {
        let request = Request::Query { query: cql.into() };
        match execute(transport, request, timeout).await? {
            Response::Result(ResultBody::Rows(rows)) => Ok(rows),
            Response::Result(_) => Ok(vec![]),
            Response::Error { code, message } => Err(Error::Server { code, message }),
            other => Err(Error::UnexpectedResponse(other.kind())),
        }
    }

    fn mark_connected(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            ConnectionState::Closing | ConnectionState::Closed => false,
            _ => {
                *state = ConnectionState::Connected;
                true
            }
        }
    }

    fn cancel_reconnect(&self) {
        if let Some(handle) = self.reconnect_handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn spawn_event_handler(self: &Arc<Self>, mut receiver: Receiver<ServerEvent>) {
        let connection = self.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                connection.handle_event(event).await;
            }
        });
    }

    fn spawn_loss_watch(self: &Arc<Self>, transport: &Arc<T>, mut receiver: Receiver<Error>) {
        let connection = self.clone();
        let watched = Arc::downgrade(transport);
        tokio::spawn(async move {
            if let Some(error) = receiver.recv().await {
                error!(%error, "Control connection lost! Scheduling reconnection.");
                connection.handle_connection_loss(&watched);
            }
        });
    }

    fn handle_connection_loss(self: &Arc<Self>, lost: &std::sync::Weak<T>) {
        {
            // a loss signal from a connection we already replaced is stale
            let current = self.transport.load();
            match (&*current, lost.upgrade()) {
                (Some(current), Some(lost)) if Arc::ptr_eq(current, &lost) => {}
                _ => return,
            }
        }

        {
            let mut state = self.state.lock().unwrap();
            if *state != ConnectionState::Connected {
                return;
            }
            *state = ConnectionState::Reconnecting;
        }
        self.transport.store(None);

        let connection = self.clone();
        let handle = tokio::spawn(async move { connection.reconnect_loop().await });
        *self.reconnect_handle.lock().unwrap() = Some(handle);
    }

    /// Timed reconnection: wait out the schedule, retry the full connect
    /// sequence, repeat until it succeeds or the connection is closed.
    async fn reconnect_loop(self: Arc<Self>) {
        let mut schedule = self.config.reconnection_policy().new_schedule();
        loop {
            let Some(delay) = schedule.next_delay() else {
                warn!("Reconnection schedule exhausted, giving up on control connection.");
                let mut state = self.state.lock().unwrap();
                if *state == ConnectionState::Reconnecting {
                    *state = ConnectionState::Idle;
                }
                return;
            };

            sleep(delay).await;

            if *self.state.lock().unwrap() != ConnectionState::Reconnecting {
                return;
            }

            match self.try_connect().await {
                Ok(()) => return,
                Err(error) => {
                    warn!(%error, "Control connection attempt failed! Retrying.");
                }
            }
        }
    }

    async fn handle_event(&self, event: ServerEvent) {
        if matches!(
            *self.state.lock().unwrap(),
            ConnectionState::Closing | ConnectionState::Closed
        ) {
            return;
        }

        match event {
            ServerEvent::StatusChange(change) => {
                let ip = change.addr.ip();
                debug!("Received status change event: {} {}", change.change_type, ip);
                match change.change_type {
                    StatusChangeType::Up => {
                        if self.registry.is_known(ip) {
                            self.refresh_host(ip).await;
                        }
                    }
                    StatusChangeType::Down => self.registry.host_down(ip),
                }
            }
            ServerEvent::TopologyChange(change) => {
                let ip = change.addr.ip();
                debug!("Received topology change event: {} {}", change.change_type, ip);
                match change.change_type {
                    TopologyChangeType::NewNode => {
                        if !self.registry.is_known(ip) {
                            self.refresh_host(ip).await;
                        }
                    }
                    TopologyChangeType::RemovedNode => self.registry.host_lost(ip),
                }
            }
        }
    }

    /// Fetches a single peer's attributes and feeds them into the registry.
    /// Failures here are logged and swallowed; they must never take the
    /// control connection down.
    async fn refresh_host(&self, ip: IpAddr) {
        let Some(transport) = self.transport.load_full() else {
            return;
        };

        let cql = format!("{SELECT_PEERS} WHERE peer = '{ip}'");
        let timeout = self.config.connection_timeout();
        match self.query(&*transport, &cql, timeout).await {
            Ok(rows) => match rows.first() {
                Some(row) => self
                    .registry
                    .host_found(ip, Some(HostAttributes::from_row(row))),
                None => warn!("No system.peers row for {}, keeping known attributes", ip),
            },
            Err(error) => warn!(%error, "Failed to refresh host {}", ip),
        }
    }
}

/// Address selection rule for peer rows: prefer `rpc_address` unless the node
/// reports the unspecified address, then fall back to `peer`.
fn peer_ip(row: &Row) -> Option<IpAddr> {
    match row.inet("rpc_address") {
        Some(addr) if !addr.is_unspecified() => Some(addr),
        _ => row.inet("peer"),
    }
}
