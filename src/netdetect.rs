use anyhow::{Context, Result};
use if_addrs::{get_if_addrs, IfAddr};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Detect local non-loopback IPv4 addresses, for picking the listen host.
///
/// Duplicates are removed and the result is sorted for stable output.
pub fn local_ipv4_addrs() -> Result<Vec<Ipv4Addr>> {
    let mut set = BTreeSet::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(v4.ip);
        }
    }
    Ok(set.into_iter().collect())
}

/// First detected local address, or `0.0.0.0` when none can be found.
pub fn default_host() -> Ipv4Addr {
    local_ipv4_addrs()
        .ok()
        .and_then(|ips| ips.into_iter().next())
        .unwrap_or(Ipv4Addr::UNSPECIFIED)
}

/// Parse a listen host. Only IPv4 is supported.
pub fn parse_host(s: &str) -> Result<Ipv4Addr> {
    s.trim()
        .parse::<Ipv4Addr>()
        .with_context(|| format!("invalid IPv4 host: {s}"))
}
