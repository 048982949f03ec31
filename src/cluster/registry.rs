use derive_more::Display;
use fxhash::FxHashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::*;

use crate::cluster::{Host, HostAttributes};

/// Liveness of a host, as viewed from the driver.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum HostState {
    /// The host has an active connection, or the server reported it up.
    Up,
    /// The server reported the host down.
    Down,
}

/// Observer of registry mutations. Load-balancing policies are the primary
/// implementation.
///
/// Notifications are delivered synchronously on the mutating call; listeners
/// must not block and must not mutate the registry from inside a
/// notification. For any address, `host_found` is always the first
/// notification, and no notification follows `host_lost` until the address is
/// found again.
pub trait ClusterListener: Send + Sync {
    /// A new host appeared, or a known host changed attributes.
    fn host_found(&self, host: &Host);

    /// A host left the cluster.
    fn host_lost(&self, ip: IpAddr);

    /// A known host transitioned to up.
    fn host_up(&self, ip: IpAddr);

    /// A known host transitioned to down.
    fn host_down(&self, ip: IpAddr);
}

struct HostEntry {
    host: Arc<Host>,
    state: HostState,
}

#[derive(Default)]
struct RegistryInner {
    // insertion order of first discovery; `hosts` carries the data
    order: Vec<IpAddr>,
    hosts: FxHashMap<IpAddr, HostEntry>,
}

enum Notification {
    Found(Arc<Host>),
    Lost(IpAddr),
    Up(IpAddr),
    Down(IpAddr),
}

/// The authoritative in-memory set of known hosts.
///
/// Mutations come from the control connection (discovery and server events)
/// and are expected on a single thread of execution; listeners observe them
/// in mutation order.
#[derive(Default)]
pub struct ClusterRegistry {
    inner: Mutex<RegistryInner>,
    listeners: Mutex<Vec<Arc<dyn ClusterListener>>>,
    notifying: AtomicBool,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a listener. Listeners added after hosts were discovered do
    /// not receive retroactive notifications.
    pub fn add_listener(&self, listener: Arc<dyn ClusterListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Records a host, creating it or replacing its attributes. Emits
    /// `host_found` on first discovery of the address and on every attribute
    /// change; a repeated call with equal attributes is a no-op. Passing no
    /// attributes never downgrades known ones.
    pub fn host_found(&self, ip: IpAddr, attributes: Option<HostAttributes>) {
        if self.reject_reentrant("host_found") {
            return;
        }

        let found = {
            let mut inner = self.inner.lock().unwrap();
            match inner.hosts.get_mut(&ip) {
                Some(entry) => match attributes {
                    Some(attributes) if *entry.host.attributes() != attributes => {
                        let host = Arc::new(Host::new(ip, attributes));
                        entry.host = host.clone();
                        Some(host)
                    }
                    _ => None,
                },
                None => {
                    let host = Arc::new(Host::new(ip, attributes.unwrap_or_default()));
                    inner.order.push(ip);
                    inner.hosts.insert(
                        ip,
                        HostEntry {
                            host: host.clone(),
                            state: HostState::Up,
                        },
                    );
                    Some(host)
                }
            }
        };

        if let Some(host) = found {
            self.notify(Notification::Found(host));
        }
    }

    /// Forgets a host. Emits `host_lost` if the address was known.
    pub fn host_lost(&self, ip: IpAddr) {
        if self.reject_reentrant("host_lost") {
            return;
        }

        let removed = {
            let mut inner = self.inner.lock().unwrap();
            match inner.hosts.remove(&ip) {
                Some(_) => {
                    inner.order.retain(|known| *known != ip);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.notify(Notification::Lost(ip));
        }
    }

    /// Marks a known host up. Emits `host_up` only when the liveness state
    /// actually flips.
    pub fn host_up(&self, ip: IpAddr) {
        if self.reject_reentrant("host_up") {
            return;
        }

        if self.flip_state(ip, HostState::Up) {
            self.notify(Notification::Up(ip));
        }
    }

    /// Marks a known host down. Emits `host_down` only when the liveness
    /// state actually flips.
    pub fn host_down(&self, ip: IpAddr) {
        if self.reject_reentrant("host_down") {
            return;
        }

        if self.flip_state(ip, HostState::Down) {
            self.notify(Notification::Down(ip));
        }
    }

    /// Constant-time membership test.
    pub fn is_known(&self, ip: IpAddr) -> bool {
        self.inner.lock().unwrap().hosts.contains_key(&ip)
    }

    /// Snapshot of the current hosts, in insertion order of first discovery.
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .filter_map(|ip| inner.hosts.get(ip))
            .map(|entry| entry.host.clone())
            .collect()
    }

    /// Snapshot of the known addresses, in insertion order of first
    /// discovery.
    pub fn ips(&self) -> Vec<IpAddr> {
        self.inner.lock().unwrap().order.clone()
    }

    /// Liveness of a known host.
    pub fn host_state(&self, ip: IpAddr) -> Option<HostState> {
        self.inner
            .lock()
            .unwrap()
            .hosts
            .get(&ip)
            .map(|entry| entry.state)
    }

    fn flip_state(&self, ip: IpAddr, state: HostState) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.hosts.get_mut(&ip) {
            Some(entry) if entry.state != state => {
                entry.state = state;
                true
            }
            _ => false,
        }
    }

    // Listener re-entry into mutation is not supported; a listener that calls
    // back is dropped on the floor with an error, leaving the registry as the
    // outer mutation left it.
    fn reject_reentrant(&self, operation: &str) -> bool {
        if self.notifying.load(Ordering::Acquire) {
            error!("Rejected re-entrant registry mutation {operation} from a listener");
            return true;
        }

        false
    }

    fn notify(&self, notification: Notification) {
        let listeners = self.listeners.lock().unwrap().clone();

        self.notifying.store(true, Ordering::Release);
        for listener in &listeners {
            match &notification {
                Notification::Found(host) => listener.host_found(host),
                Notification::Lost(ip) => listener.host_lost(*ip),
                Notification::Up(ip) => listener.host_up(*ip),
                Notification::Down(ip) => listener.host_down(*ip),
            }
        }
        self.notifying.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Seen {
        Found(IpAddr),
        Lost(IpAddr),
        Up(IpAddr),
        Down(IpAddr),
    }

    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<Seen>>,
    }

    impl RecordingListener {
        fn seen(&self) -> Vec<Seen> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ClusterListener for RecordingListener {
        fn host_found(&self, host: &Host) {
            self.seen.lock().unwrap().push(Seen::Found(host.ip()));
        }

        fn host_lost(&self, ip: IpAddr) {
            self.seen.lock().unwrap().push(Seen::Lost(ip));
        }

        fn host_up(&self, ip: IpAddr) {
            self.seen.lock().unwrap().push(Seen::Up(ip));
        }

        fn host_down(&self, ip: IpAddr) {
            self.seen.lock().unwrap().push(Seen::Down(ip));
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    fn attributes(datacenter: &str) -> HostAttributes {
        HostAttributes {
            datacenter: Some(datacenter.into()),
            rack: Some("rack1".into()),
            host_id: Some(Uuid::from_u128(42)),
            release_version: Some("4.1.3".into()),
        }
    }

    #[test]
    fn hosts_keep_insertion_order() {
        let registry = ClusterRegistry::new();
        registry.host_found(ip(3), None);
        registry.host_found(ip(1), None);
        registry.host_found(ip(2), None);
        // refresh must not reorder
        registry.host_found(ip(1), Some(attributes("dc1")));

        assert_eq!(registry.ips(), vec![ip(3), ip(1), ip(2)]);
        assert_eq!(
            registry.hosts().iter().map(|host| host.ip()).collect::<Vec<_>>(),
            vec![ip(3), ip(1), ip(2)]
        );
    }

    #[test]
    fn host_found_is_idempotent_for_equal_attributes() {
        let registry = ClusterRegistry::new();
        let listener = Arc::new(RecordingListener::default());
        registry.add_listener(listener.clone());

        registry.host_found(ip(1), Some(attributes("dc1")));
        registry.host_found(ip(1), Some(attributes("dc1")));
        registry.host_found(ip(1), None);

        assert_eq!(listener.seen(), vec![Seen::Found(ip(1))]);
    }

    #[test]
    fn host_found_emits_again_on_attribute_change() {
        let registry = ClusterRegistry::new();
        let listener = Arc::new(RecordingListener::default());
        registry.add_listener(listener.clone());

        registry.host_found(ip(1), Some(attributes("dc1")));
        registry.host_found(ip(1), Some(attributes("dc2")));

        assert_eq!(listener.seen(), vec![Seen::Found(ip(1)), Seen::Found(ip(1))]);
        assert_eq!(registry.hosts()[0].datacenter(), Some("dc2"));
    }

    #[test]
    fn found_then_lost_round_trip() {
        let registry = ClusterRegistry::new();
        let listener = Arc::new(RecordingListener::default());
        registry.add_listener(listener.clone());

        registry.host_found(ip(1), None);
        registry.host_lost(ip(1));

        assert!(!registry.is_known(ip(1)));
        assert!(registry.ips().is_empty());
        assert_eq!(listener.seen(), vec![Seen::Found(ip(1)), Seen::Lost(ip(1))]);

        // unknown hosts produce no notifications at all
        registry.host_lost(ip(1));
        registry.host_down(ip(1));
        registry.host_up(ip(1));
        assert_eq!(listener.seen().len(), 2);
    }

    #[test]
    fn liveness_notifications_fire_only_on_flip() {
        let registry = ClusterRegistry::new();
        let listener = Arc::new(RecordingListener::default());
        registry.add_listener(listener.clone());

        registry.host_found(ip(1), None);
        assert_eq!(registry.host_state(ip(1)), Some(HostState::Up));

        registry.host_up(ip(1));
        registry.host_down(ip(1));
        registry.host_down(ip(1));
        registry.host_up(ip(1));

        assert_eq!(
            listener.seen(),
            vec![Seen::Found(ip(1)), Seen::Down(ip(1)), Seen::Up(ip(1))]
        );
    }

    #[test]
    fn every_listener_sees_every_notification_once() {
        let registry = ClusterRegistry::new();
        let first = Arc::new(RecordingListener::default());
        let second = Arc::new(RecordingListener::default());
        registry.add_listener(first.clone());
        registry.add_listener(second.clone());

        registry.host_found(ip(1), None);
        registry.host_down(ip(1));

        assert_eq!(first.seen(), second.seen());
        assert_eq!(first.seen(), vec![Seen::Found(ip(1)), Seen::Down(ip(1))]);
    }

    #[test]
    fn reentrant_mutation_is_rejected() {
        struct ReentrantListener {
            registry: Mutex<Option<Arc<ClusterRegistry>>>,
        }

        impl ClusterListener for ReentrantListener {
            fn host_found(&self, host: &Host) {
                if let Some(registry) = &*self.registry.lock().unwrap() {
                    registry.host_lost(host.ip());
                }
            }

            fn host_lost(&self, _ip: IpAddr) {}
            fn host_up(&self, _ip: IpAddr) {}
            fn host_down(&self, _ip: IpAddr) {}
        }

        let registry = Arc::new(ClusterRegistry::new());
        let listener = Arc::new(ReentrantListener {
            registry: Mutex::new(Some(registry.clone())),
        });
        registry.add_listener(listener);

        registry.host_found(ip(1), None);

        // the re-entrant host_lost was dropped, not applied
        assert!(registry.is_known(ip(1)));
    }
}
