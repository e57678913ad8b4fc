// # Interface Source Trait
//
// Defines the interface for reading the local network interface table.
//
// ## Implementations
//
// - getifaddrs(3) based (Unix): `extip-iface` crate
// - Scripted tables in tests
//
// ## Usage
//
// ```rust,ignore
// use extip_core::{InterfaceSource, sampler::sample_ipv4};
//
// fn main() -> extip_core::Result<()> {
//     let source = /* InterfaceSource implementation */;
//
//     for iface in source.interfaces()? {
//         println!("{} -> {:?}", iface.name, iface.addresses);
//     }
//
//     let ip = sample_ipv4(&source, "eth0")?;
//     println!("eth0 is {ip}");
//     Ok(())
// }
// ```

use std::net::IpAddr;

/// One local network interface and the addresses bound to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name as reported by the OS (e.g. "eth0")
    pub name: String,
    /// Bound addresses in the order the OS reports them
    pub addresses: Vec<IpAddr>,
}

impl NetworkInterface {
    /// Create an interface entry
    pub fn new(name: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        Self {
            name: name.into(),
            addresses,
        }
    }
}

/// Trait for reading the local interface table
///
/// Implementations are pure reads of system state: no caching of the
/// enumeration, no side effects. Every call returns a fresh snapshot.
///
/// The trait is synchronous. Reading the table is a handful of syscalls and
/// the single reconciliation worker is the only caller.
pub trait InterfaceSource: Send + Sync {
    /// Enumerate every local interface with its bound addresses
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<NetworkInterface>)`: The current interface table
    /// - `Err(Error::InterfaceEnumeration)`: If the table could not be read
    fn interfaces(&self) -> Result<Vec<NetworkInterface>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str {
        "unknown"
    }
}
