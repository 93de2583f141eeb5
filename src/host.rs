//! Host identity for the startup banner.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

/// Local host name, or "localhost" when it cannot be determined.
pub fn hostname() -> String {
    sysinfo::System::host_name()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Resolve `host` to an address, preferring IPv4. Falls back to loopback.
pub fn resolve_host_ip(host: &str) -> IpAddr {
    let addrs: Vec<IpAddr> = match (host, 0u16).to_socket_addrs() {
        Ok(addrs) => addrs.map(|addr| addr.ip()).collect(),
        Err(err) => {
            log::warn!("could not resolve host {}: {}", host, err);
            Vec::new()
        }
    };
    addrs
        .iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| addrs.first().copied())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
