pub use self::config::{ClusterConfig, ClusterConfigBuilder};
pub use self::connection_manager::ConnectionManager;
pub use self::control_connection::ControlConnection;
pub use self::host::{Host, HostAttributes};
pub use self::registry::{ClusterListener, ClusterRegistry, HostState};

mod config;
mod connection_manager;
mod control_connection;
mod host;
mod registry;
