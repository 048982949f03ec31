//! Server-pushed event model. The control connection subscribes to status and
//! topology changes and re-enters the cluster registry when they arrive.

use derive_more::Display;
use std::net::SocketAddr;

use crate::{error, Error};

// Event families
const TOPOLOGY_CHANGE: &str = "TOPOLOGY_CHANGE";
const STATUS_CHANGE: &str = "STATUS_CHANGE";

// Topology changes
const NEW_NODE: &str = "NEW_NODE";
const REMOVED_NODE: &str = "REMOVED_NODE";

// Status changes
const UP: &str = "UP";
const DOWN: &str = "DOWN";

/// Event family without change details. Used when subscribing, where only the
/// wire name of the family matters.
#[derive(Debug, PartialEq, Copy, Clone, Ord, PartialOrd, Eq, Hash)]
pub enum SimpleServerEvent {
    TopologyChange,
    StatusChange,
}

impl SimpleServerEvent {
    pub fn as_str(&self) -> &'static str {
        match *self {
            SimpleServerEvent::TopologyChange => TOPOLOGY_CHANGE,
            SimpleServerEvent::StatusChange => STATUS_CHANGE,
        }
    }
}

impl From<&ServerEvent> for SimpleServerEvent {
    fn from(event: &ServerEvent) -> SimpleServerEvent {
        match event {
            ServerEvent::TopologyChange(_) => SimpleServerEvent::TopologyChange,
            ServerEvent::StatusChange(_) => SimpleServerEvent::StatusChange,
        }
    }
}

impl TryFrom<&str> for SimpleServerEvent {
    type Error = error::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            TOPOLOGY_CHANGE => Ok(SimpleServerEvent::TopologyChange),
            STATUS_CHANGE => Ok(SimpleServerEvent::StatusChange),
            value => Err(Error::UnknownServerEvent(value.into())),
        }
    }
}

/// Full server event with all details about a concrete change.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum ServerEvent {
    /// A node joined or left the cluster.
    TopologyChange(TopologyChange),
    /// A node went up or down.
    StatusChange(StatusChange),
}

impl ServerEvent {
    /// Address the event refers to. The port component carries no meaning for
    /// the control plane and is ignored by registry updates.
    pub fn addr(&self) -> SocketAddr {
        match self {
            ServerEvent::TopologyChange(change) => change.addr,
            ServerEvent::StatusChange(change) => change.addr,
        }
    }
}

/// Change in the cluster topology.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopologyChange {
    pub change_type: TopologyChangeType,
    pub addr: SocketAddr,
}

#[derive(Debug, Copy, Clone, PartialEq, Ord, PartialOrd, Eq, Hash, Display)]
pub enum TopologyChangeType {
    NewNode,
    RemovedNode,
}

impl TryFrom<&str> for TopologyChangeType {
    type Error = error::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            NEW_NODE => Ok(TopologyChangeType::NewNode),
            REMOVED_NODE => Ok(TopologyChangeType::RemovedNode),
            value => Err(Error::UnknownServerEvent(value.into())),
        }
    }
}

/// Change of node status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusChange {
    pub change_type: StatusChangeType,
    pub addr: SocketAddr,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum StatusChangeType {
    Up,
    Down,
}

impl TryFrom<&str> for StatusChangeType {
    type Error = error::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            UP => Ok(StatusChangeType::Up),
            DOWN => Ok(StatusChangeType::Down),
            value => Err(Error::UnknownServerEvent(value.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_event_wire_names_round_trip() {
        for event in [
            SimpleServerEvent::TopologyChange,
            SimpleServerEvent::StatusChange,
        ] {
            assert_eq!(SimpleServerEvent::try_from(event.as_str()).unwrap(), event);
        }

        assert!(matches!(
            SimpleServerEvent::try_from("SCHEMA_CHANGE"),
            Err(Error::UnknownServerEvent(_))
        ));
    }

    #[test]
    fn change_types_parse_from_wire_names() {
        assert_eq!(
            TopologyChangeType::try_from("NEW_NODE").unwrap(),
            TopologyChangeType::NewNode
        );
        assert_eq!(
            TopologyChangeType::try_from("REMOVED_NODE").unwrap(),
            TopologyChangeType::RemovedNode
        );
        assert_eq!(
            StatusChangeType::try_from("UP").unwrap(),
            StatusChangeType::Up
        );
        assert_eq!(
            StatusChangeType::try_from("DOWN").unwrap(),
            StatusChangeType::Down
        );
        assert!(StatusChangeType::try_from("SIDEWAYS").is_err());
    }

    #[test]
    fn event_addr_ignores_family() {
        let addr: SocketAddr = "127.0.0.1:9042".parse().unwrap();
        let event = ServerEvent::StatusChange(StatusChange {
            change_type: StatusChangeType::Down,
            addr,
        });

        assert_eq!(event.addr(), addr);
        assert_eq!(SimpleServerEvent::from(&event), SimpleServerEvent::StatusChange);
    }
}
