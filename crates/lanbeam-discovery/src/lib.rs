//! Peer discovery: UDP multicast announcements with a mutual-announce
//! handshake, and an HTTP sweep fallback for networks without multicast.

mod multicast;
mod netif;

pub mod engine;

pub use engine::{DiscoveryConfig, DiscoveryEngine};
pub use netif::eligible_ipv4_addrs;
