// # Interface State Cache
//
// In-memory map from interface name to last-observed IPv4 address.
//
// ## Ownership
//
// The cache is a plain owned value held by the single reconciliation worker.
// It is never shared, so there is no lock around it.
//
// ## Crash Behavior
//
// - All state is lost on restart
// - The first pass after a restart treats every interface as changed from
//   "unknown", which only adds the current address to annotated Services
//
// ## Update Rule
//
// An entry advances only through `observe()` after a successful sample.
// A failed sample never touches it: stale-known beats unknown.
//
// ## Unsettled Interfaces
//
// The cached address always follows the interface, even when the Services
// for a change could not all be written. Such an interface is marked
// unsettled with `unsettle()`, remembering every address that may still sit
// in some Service's externalIPs. Until `settle()` is called those addresses
// are withdrawn by every later change, and `retry()` hands the current
// address back to the worker on each pass.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::Ipv4Addr;

/// A detected address change for one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceChange {
    /// Interface name
    pub interface: String,
    /// Previously cached address (`None` when first seen or on a retry)
    pub old_ip: Option<Ipv4Addr>,
    /// Newly sampled address
    pub new_ip: Ipv4Addr,
    /// Earlier addresses of this interface that were never fully withdrawn
    pub stale_ips: BTreeSet<Ipv4Addr>,
}

impl InterfaceChange {
    /// A plain change with nothing left over from earlier passes
    pub fn new(interface: impl Into<String>, old_ip: Option<Ipv4Addr>, new_ip: Ipv4Addr) -> Self {
        Self {
            interface: interface.into(),
            old_ip,
            new_ip,
            stale_ips: BTreeSet::new(),
        }
    }

    /// Old address rendered as a string, empty when unknown
    pub fn old_ip_string(&self) -> String {
        self.old_ip.map(|ip| ip.to_string()).unwrap_or_default()
    }

    /// Every address to remove from a Service: the old one plus stale ones
    ///
    /// Never contains the new address.
    pub fn withdrawn(&self) -> BTreeSet<String> {
        self.old_ip
            .iter()
            .chain(self.stale_ips.iter())
            .filter(|ip| **ip != self.new_ip)
            .map(|ip| ip.to_string())
            .collect()
    }
}

impl fmt::Display for InterfaceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] from [{}] => [{}]",
            self.interface,
            self.old_ip_string(),
            self.new_ip
        )
    }
}

/// Last-known IPv4 address per interface
///
/// # Example
///
/// ```rust
/// use extip_core::state::InterfaceStateCache;
/// use std::net::Ipv4Addr;
///
/// let mut cache = InterfaceStateCache::new();
/// let ip = Ipv4Addr::new(10, 0, 0, 5);
///
/// // First sighting is a change from "unknown"
/// let change = cache.observe("eth0", ip).expect("first sample is a change");
/// assert_eq!(change.old_ip, None);
///
/// // Same value again is not
/// assert!(cache.observe("eth0", ip).is_none());
/// assert_eq!(cache.get("eth0"), Some(ip));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InterfaceStateCache {
    entries: HashMap<String, Ipv4Addr>,
    unsettled: HashMap<String, BTreeSet<Ipv4Addr>>,
}

impl InterfaceStateCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-known address of an interface
    pub fn get(&self, interface: &str) -> Option<Ipv4Addr> {
        self.entries.get(interface).copied()
    }

    /// Record a successful sample
    ///
    /// Returns the change when `ip` differs from the cached value (including
    /// when nothing was cached), `None` otherwise. Stale addresses of an
    /// unsettled interface ride along on the change.
    pub fn observe(&mut self, interface: &str, ip: Ipv4Addr) -> Option<InterfaceChange> {
        let old_ip = self.entries.insert(interface.to_string(), ip);
        if old_ip == Some(ip) {
            return None;
        }
        let mut change = InterfaceChange::new(interface, old_ip, ip);
        change.stale_ips = self.stale_ips(interface, ip);
        Some(change)
    }

    /// The pending work for an unsettled interface, if any
    ///
    /// The returned record carries no old address: it re-applies the cached
    /// address and withdraws every stale one.
    pub fn retry(&self, interface: &str) -> Option<InterfaceChange> {
        if !self.unsettled.contains_key(interface) {
            return None;
        }
        let ip = self.get(interface)?;
        let mut change = InterfaceChange::new(interface, None, ip);
        change.stale_ips = self.stale_ips(interface, ip);
        Some(change)
    }

    /// Mark the Services for `change` as not fully written
    pub fn unsettle(&mut self, change: &InterfaceChange) {
        let stale = self.unsettled.entry(change.interface.clone()).or_default();
        stale.extend(change.old_ip);
        stale.extend(change.stale_ips.iter().copied());
        stale.remove(&change.new_ip);
    }

    /// Mark every Service of the interface as written
    pub fn settle(&mut self, interface: &str) {
        self.unsettled.remove(interface);
    }

    /// Whether the last patch for this interface failed
    pub fn is_unsettled(&self, interface: &str) -> bool {
        self.unsettled.contains_key(interface)
    }

    /// Number of interfaces with a known address
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been sampled yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn stale_ips(&self, interface: &str, current: Ipv4Addr) -> BTreeSet<Ipv4Addr> {
        self.unsettled
            .get(interface)
            .map(|stale| stale.iter().copied().filter(|ip| *ip != current).collect())
            .unwrap_or_default()
    }
}
