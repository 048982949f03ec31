use std::net::IpAddr;
use uuid::Uuid;

use crate::frame::Row;

/// Attributes of a cluster member, as reported by `system.local` and
/// `system.peers`. All of them are optional: a freshly seeded contact point
/// has none until discovery runs against it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAttributes {
    pub datacenter: Option<String>,
    pub rack: Option<String>,
    pub host_id: Option<Uuid>,
    pub release_version: Option<String>,
}

impl HostAttributes {
    /// Reads the attribute columns out of a discovery row. Missing or null
    /// columns stay unset.
    pub fn from_row(row: &Row) -> Self {
        HostAttributes {
            datacenter: row.text("data_center").map(Into::into),
            rack: row.text("rack").map(Into::into),
            host_id: row.uuid("host_id"),
            release_version: row.text("release_version").map(Into::into),
        }
    }
}

/// One known cluster member. Immutable; identity is the IP address. When
/// discovery reports changed attributes the registry replaces the whole value
/// instead of mutating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    ip: IpAddr,
    attributes: HostAttributes,
}

impl Host {
    pub fn new(ip: IpAddr, attributes: HostAttributes) -> Self {
        Host { ip, attributes }
    }

    #[inline]
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn datacenter(&self) -> Option<&str> {
        self.attributes.datacenter.as_deref()
    }

    pub fn rack(&self) -> Option<&str> {
        self.attributes.rack.as_deref()
    }

    pub fn host_id(&self) -> Option<Uuid> {
        self.attributes.host_id
    }

    pub fn release_version(&self) -> Option<&str> {
        self.attributes.release_version.as_deref()
    }

    pub(crate) fn attributes(&self) -> &HostAttributes {
        &self.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Value;

    #[test]
    fn attributes_read_from_discovery_row() {
        let host_id = Uuid::from_u128(7);
        let row = Row::new()
            .with_column("data_center", Value::Text("dc1".into()))
            .with_column("rack", Value::Text("rack1".into()))
            .with_column("host_id", Value::Uuid(host_id))
            .with_column("release_version", Value::Text("4.1.3".into()));

        let attributes = HostAttributes::from_row(&row);
        let host = Host::new("10.0.1.1".parse().unwrap(), attributes);

        assert_eq!(host.datacenter(), Some("dc1"));
        assert_eq!(host.rack(), Some("rack1"));
        assert_eq!(host.host_id(), Some(host_id));
        assert_eq!(host.release_version(), Some("4.1.3"));
    }

    #[test]
    fn missing_columns_leave_attributes_unset() {
        let attributes = HostAttributes::from_row(&Row::new());
        assert_eq!(attributes, HostAttributes::default());
    }
}
