//! Interface address sampling
//!
//! Resolves an interface name to the first IPv4 address bound to it.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{Error, Result};
use crate::traits::{InterfaceSource, NetworkInterface};

/// Sample the IPv4 address of `interface_name`
///
/// The interface table is enumerated on every call. Among the addresses of
/// the interface with exactly this name, the first IPv4 address wins; IPv6
/// addresses are ignored.
///
/// # Errors
///
/// - [`Error::SampleNotFound`] if the interface does not exist or carries no
///   IPv4 address. The error lists every interface currently known.
/// - [`Error::InterfaceEnumeration`] if the table could not be read.
pub fn sample_ipv4<S>(source: &S, interface_name: &str) -> Result<Ipv4Addr>
where
    S: InterfaceSource + ?Sized,
{
    let interfaces = source.interfaces()?;
    first_ipv4(&interfaces, interface_name).ok_or_else(|| {
        Error::sample_not_found(
            interface_name,
            interfaces.iter().map(|iface| iface.name.clone()).collect(),
        )
    })
}

/// Find the first IPv4 address of the named interface in a table snapshot
pub fn first_ipv4(interfaces: &[NetworkInterface], interface_name: &str) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .filter(|iface| iface.name == interface_name)
        .flat_map(|iface| iface.addresses.iter())
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
}
