use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cluster::{ClusterListener, Host};
use crate::load_balancing::{LoadBalancingPolicy, QueryPlan};

struct PolicyEntry {
    ip: IpAddr,
    up: bool,
}

/// Round-robin load balancing over the hosts currently marked up.
#[derive(Default)]
pub struct RoundRobinLoadBalancingPolicy {
    entries: Mutex<Vec<PolicyEntry>>,
    prev_idx: AtomicUsize,
}

impl RoundRobinLoadBalancingPolicy {
    pub fn new() -> Self {
        Default::default()
    }

    fn set_up(&self, ip: IpAddr, up: bool) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter_mut().find(|entry| entry.ip == ip) {
            entry.up = up;
        }
    }
}

impl ClusterListener for RoundRobinLoadBalancingPolicy {
    fn host_found(&self, host: &Host) {
        let mut entries = self.entries.lock().unwrap();
        if !entries.iter().any(|entry| entry.ip == host.ip()) {
            entries.push(PolicyEntry {
                ip: host.ip(),
                up: true,
            });
        }
    }

    fn host_lost(&self, ip: IpAddr) {
        self.entries.lock().unwrap().retain(|entry| entry.ip != ip);
    }

    fn host_up(&self, ip: IpAddr) {
        self.set_up(ip, true);
    }

    fn host_down(&self, ip: IpAddr) {
        self.set_up(ip, false);
    }
}

impl LoadBalancingPolicy for RoundRobinLoadBalancingPolicy {
    fn query_plan(&self) -> QueryPlan {
        let mut plan: QueryPlan = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.up)
            .map(|entry| entry.ip)
            .collect();

        if plan.is_empty() {
            return plan;
        }

        let cur_idx = self.prev_idx.fetch_add(1, Ordering::SeqCst) % plan.len();
        plan.rotate_left(cur_idx);
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::HostAttributes;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    fn found(policy: &RoundRobinLoadBalancingPolicy, last: u8) {
        policy.host_found(&Host::new(ip(last), HostAttributes::default()));
    }

    #[test]
    fn plans_rotate_through_hosts() {
        let policy = RoundRobinLoadBalancingPolicy::new();
        found(&policy, 1);
        found(&policy, 2);
        found(&policy, 3);

        assert_eq!(policy.query_plan(), vec![ip(1), ip(2), ip(3)]);
        assert_eq!(policy.query_plan(), vec![ip(2), ip(3), ip(1)]);
        assert_eq!(policy.query_plan(), vec![ip(3), ip(1), ip(2)]);
        assert_eq!(policy.query_plan(), vec![ip(1), ip(2), ip(3)]);
    }

    #[test]
    fn down_hosts_leave_the_plan_until_up_again() {
        let policy = RoundRobinLoadBalancingPolicy::new();
        found(&policy, 1);
        found(&policy, 2);

        policy.host_down(ip(1));
        assert_eq!(policy.query_plan(), vec![ip(2)]);

        policy.host_up(ip(1));
        assert!(policy.query_plan().contains(&ip(1)));
    }

    #[test]
    fn lost_hosts_are_forgotten() {
        let policy = RoundRobinLoadBalancingPolicy::new();
        found(&policy, 1);
        policy.host_lost(ip(1));

        assert!(policy.query_plan().is_empty());

        // duplicate finds collapse into one entry
        found(&policy, 2);
        found(&policy, 2);
        assert_eq!(policy.query_plan(), vec![ip(2)]);
    }
}
