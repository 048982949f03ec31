mod round_robin;

use std::net::IpAddr;

pub use crate::load_balancing::round_robin::RoundRobinLoadBalancingPolicy;

use crate::cluster::ClusterListener;

/// Hosts to try for a request, best candidates first.
pub type QueryPlan = Vec<IpAddr>;

/// Load balancing policy. Policies learn about the cluster exclusively
/// through the [`ClusterListener`] notifications the registry feeds them.
pub trait LoadBalancingPolicy: ClusterListener {
    /// Returns the hosts to try for the next request.
    fn query_plan(&self) -> QueryPlan;
}
