//! Local interface enumeration.

use std::net::Ipv4Addr;

use if_addrs::{get_if_addrs, IfAddr};
use tracing::warn;

/// Interface name prefixes that never take part in LAN discovery:
/// loopback, tunnels and virtual bridges.
const SKIP_PREFIXES: &[&str] = &["lo", "tun", "tap", "utun", "wg", "ppp", "docker", "veth"];

/// Usable local IPv4 addresses for multicast joins and sweep targets.
///
/// `name_filter` restricts to interfaces whose name starts with the given
/// prefix; `None` or `"*"` accepts every eligible interface.
pub fn eligible_ipv4_addrs(name_filter: Option<&str>) -> Vec<Ipv4Addr> {
    let interfaces = match get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            warn!(error = %err, "failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter_map(|iface| {
            if let Some(filter) = name_filter {
                if filter != "*" && !iface.name.starts_with(filter) {
                    return None;
                }
            }
            if SKIP_PREFIXES.iter().any(|p| iface.name.starts_with(p)) {
                return None;
            }
            match iface.addr {
                IfAddr::V4(v4) if !v4.ip.is_loopback() => Some(v4.ip),
                _ => None,
            }
        })
        .collect()
}
