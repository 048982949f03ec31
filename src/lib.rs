//! **cql-control** is the control-plane core of a driver for CQL-family
//! wide-column databases.
//!
//! The crate owns the single long-lived administrative connection to a
//! cluster: protocol version negotiation, the authentication gate, topology
//! discovery through `system.local` and `system.peers`, the server event
//! subscription, and the reconnection supervisor. Discovered hosts are kept in
//! a [`ClusterRegistry`](cluster::ClusterRegistry), which pushes change
//! notifications to registered [`ClusterListener`](cluster::ClusterListener)s
//! such as load-balancing policies.
//!
//! Actual I/O is injected: anything implementing
//! [`ConnectionManager`](cluster::ConnectionManager) and
//! [`ControlTransport`](transport::ControlTransport) can back the control
//! connection, which makes the core independent of transport, TLS and frame
//! encoding concerns.
//!
//! ## Getting started
//!
//! ```
//! use std::sync::Arc;
//! use cql_control::cluster::{ClusterConfigBuilder, ClusterRegistry};
//!
//! let config = Arc::new(ClusterConfigBuilder::new().with_protocol_version(4).build());
//! assert_eq!(config.protocol_version(), 4);
//!
//! let registry = Arc::new(ClusterRegistry::new());
//! registry.host_found("127.0.0.1".parse().unwrap(), None);
//! assert!(registry.is_known("127.0.0.1".parse().unwrap()));
//! ```
//!
//! With a config and a seeded registry in hand, construct a
//! [`ControlConnection`](cluster::ControlConnection) over your connection
//! manager and call `connect()`.

pub mod authenticators;
pub mod cluster;
pub mod error;
pub mod events;
pub mod frame;
pub mod future;
pub mod load_balancing;
pub mod retry;
pub mod transport;

pub type Error = error::Error;
pub type Result<T> = error::Result<T>;
