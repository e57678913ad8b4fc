// # System Interface Source
//
// This crate provides the OS-backed `InterfaceSource` for extip.
//
// ## Implementation
//
// Interfaces and their addresses are read with getifaddrs(3), through
// `nix::ifaddrs`, on every call.
// Entries without an inet/inet6 address (e.g. AF_PACKET on Linux) still
// contribute the interface name, so "not found" diagnostics list every
// interface the kernel knows about, addressed or not.
//
// ## Platform Support
//
// Unix only. On other targets every enumeration fails with
// `Error::InterfaceEnumeration`.

use extip_core::traits::{InterfaceSource, NetworkInterface};
use extip_core::Result;

/// Interface table read from the running system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl SystemInterfaces {
    pub fn new() -> Self {
        Self
    }
}

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let interfaces = sys::read_interfaces()?;
        tracing::trace!("Enumerated {} interface(s)", interfaces.len());
        Ok(interfaces)
    }

    fn source_name(&self) -> &'static str {
        "getifaddrs"
    }
}

/// Append an address to the named interface, creating the entry on first sight
#[cfg_attr(not(unix), allow(dead_code))]
fn record(interfaces: &mut Vec<NetworkInterface>, name: String, addr: Option<std::net::IpAddr>) {
    let index = match interfaces.iter().position(|iface| iface.name == name) {
        Some(index) => index,
        None => {
            interfaces.push(NetworkInterface::new(name, Vec::new()));
            interfaces.len() - 1
        }
    };
    if let Some(addr) = addr {
        interfaces[index].addresses.push(addr);
    }
}

#[cfg(unix)]
mod sys {
    use super::record;
    use extip_core::traits::NetworkInterface;
    use extip_core::{Error, Result};
    use nix::sys::socket::SockaddrStorage;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    pub(super) fn read_interfaces() -> Result<Vec<NetworkInterface>> {
        let addrs = nix::ifaddrs::getifaddrs().map_err(|e| Error::enumeration(e.to_string()))?;

        let mut interfaces = Vec::new();
        for ifaddr in addrs {
            let addr = ifaddr.address.as_ref().and_then(ip_of);
            record(&mut interfaces, ifaddr.interface_name, addr);
        }
        Ok(interfaces)
    }

    /// Decode an inet or inet6 socket address, other families yield `None`
    fn ip_of(addr: &SockaddrStorage) -> Option<IpAddr> {
        if let Some(sin) = addr.as_sockaddr_in() {
            return Some(IpAddr::V4(Ipv4Addr::from(sin.ip())));
        }
        addr.as_sockaddr_in6()
            .map(|sin6| IpAddr::V6(Ipv6Addr::from(sin6.ip())))
    }
}

#[cfg(not(unix))]
mod sys {
    use extip_core::traits::NetworkInterface;
    use extip_core::{Error, Result};

    pub(super) fn read_interfaces() -> Result<Vec<NetworkInterface>> {
        Err(Error::enumeration(
            "interface enumeration is only supported on Unix",
        ))
    }
}
