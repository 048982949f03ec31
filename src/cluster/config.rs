use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::authenticators::{NoneAuthenticatorProvider, SaslAuthenticatorProvider};
use crate::frame::{DEFAULT_PORT, DEFAULT_PROTOCOL_VERSION};
use crate::load_balancing::{LoadBalancingPolicy, RoundRobinLoadBalancingPolicy};
use crate::retry::{ConstantReconnectionPolicy, ReconnectionPolicy};

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Driver-wide configuration shared between the control connection and its
/// collaborators. All fields are fixed at build time except the protocol
/// version, which is written only during version negotiation.
pub struct ClusterConfig {
    protocol_version: AtomicU8,
    authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
    reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    load_balancing: Arc<dyn LoadBalancingPolicy>,
    connection_timeout: Duration,
    port: u16,
}

impl ClusterConfig {
    /// Protocol version currently in use.
    #[inline]
    pub fn protocol_version(&self) -> u8 {
        self.protocol_version.load(Ordering::Acquire)
    }

    // written only during negotiation
    pub(crate) fn set_protocol_version(&self, version: u8) {
        self.protocol_version.store(version, Ordering::Release);
    }

    pub fn authenticator_provider(&self) -> &Arc<dyn SaslAuthenticatorProvider + Send + Sync> {
        &self.authenticator_provider
    }

    pub fn reconnection_policy(&self) -> &Arc<dyn ReconnectionPolicy + Send + Sync> {
        &self.reconnection_policy
    }

    pub fn load_balancing(&self) -> &Arc<dyn LoadBalancingPolicy> {
        &self.load_balancing
    }

    #[inline]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Builder for [`ClusterConfig`].
pub struct ClusterConfigBuilder {
    protocol_version: u8,
    authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
    reconnection_policy: Option<Arc<dyn ReconnectionPolicy + Send + Sync>>,
    reconnect_interval: Duration,
    load_balancing: Arc<dyn LoadBalancingPolicy>,
    connection_timeout: Duration,
    port: u16,
}

impl Default for ClusterConfigBuilder {
    fn default() -> Self {
        ClusterConfigBuilder {
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            authenticator_provider: Arc::new(NoneAuthenticatorProvider),
            reconnection_policy: None,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            load_balancing: Arc::new(RoundRobinLoadBalancingPolicy::new()),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            port: DEFAULT_PORT,
        }
    }
}

impl ClusterConfigBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the newest protocol version to attempt; negotiation walks
    /// downward from here.
    pub fn with_protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    /// Sets the authentication provider.
    pub fn with_authenticator_provider(
        mut self,
        authenticator_provider: Arc<dyn SaslAuthenticatorProvider + Send + Sync>,
    ) -> Self {
        self.authenticator_provider = authenticator_provider;
        self
    }

    /// Sets the delay between reconnection attempts. Shorthand for a constant
    /// reconnection policy; ignored when an explicit policy is set.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets the reconnection policy.
    pub fn with_reconnection_policy(
        mut self,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    ) -> Self {
        self.reconnection_policy = Some(reconnection_policy);
        self
    }

    /// Sets the load-balancing policy fed by registry notifications.
    pub fn with_load_balancing(mut self, load_balancing: Arc<dyn LoadBalancingPolicy>) -> Self {
        self.load_balancing = load_balancing;
        self
    }

    /// Sets the timeout for opening connections and for individual control
    /// requests.
    pub fn with_connection_timeout(mut self, connection_timeout: Duration) -> Self {
        self.connection_timeout = connection_timeout;
        self
    }

    /// Sets the port used for every contact point and discovered peer.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn build(self) -> ClusterConfig {
        let reconnection_policy = self.reconnection_policy.unwrap_or_else(|| {
            Arc::new(ConstantReconnectionPolicy::new(self.reconnect_interval))
        });

        ClusterConfig {
            protocol_version: AtomicU8::new(self.protocol_version),
            authenticator_provider: self.authenticator_provider,
            reconnection_policy,
            load_balancing: self.load_balancing,
            connection_timeout: self.connection_timeout,
            port: self.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = ClusterConfigBuilder::new().build();

        assert_eq!(config.protocol_version(), DEFAULT_PROTOCOL_VERSION);
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.connection_timeout(), DEFAULT_CONNECTION_TIMEOUT);
        assert!(config.authenticator_provider().name().is_none());
    }

    #[test]
    fn reconnect_interval_becomes_constant_policy() {
        let config = ClusterConfigBuilder::new()
            .with_reconnect_interval(Duration::from_secs(2))
            .build();

        let mut schedule = config.reconnection_policy().new_schedule();
        assert_eq!(schedule.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn protocol_version_is_mutable_for_negotiation() {
        let config = ClusterConfigBuilder::new().with_protocol_version(7).build();

        assert_eq!(config.protocol_version(), 7);
        config.set_protocol_version(6);
        assert_eq!(config.protocol_version(), 6);
    }
}
