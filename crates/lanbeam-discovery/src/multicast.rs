//! Multicast socket construction.

use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Receive buffer sized for the largest tolerated announcement.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Socket listening on the multicast port, joined to the group on every
/// eligible interface. Joins that fail on one interface are logged and
/// skipped; at least one must succeed unless the interface list is empty.
pub fn listener_socket(
    group: Ipv4Addr,
    port: u16,
    interfaces: &[Ipv4Addr],
) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.set_recv_buffer_size(256 * 1024)?;
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&bind_addr.into())?;

    let mut joined = 0usize;
    for local in interfaces {
        match socket.join_multicast_v4(&group, local) {
            Ok(()) => {
                joined += 1;
                debug!(%group, interface = %local, "joined multicast group");
            }
            Err(err) => warn!(%group, interface = %local, error = %err, "multicast join failed"),
        }
    }
    if joined == 0 {
        // Fall back to the default interface. A host with no multicast
        // route at all keeps a deaf listener; sweep mode still covers it.
        if let Err(err) = socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
            warn!(%group, error = %err, "no multicast membership available");
        }
    }
    socket.set_multicast_loop_v4(true)?;

    UdpSocket::from_std(socket.into())
}

/// Socket for sending announcements to the group.
pub async fn sender_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.set_multicast_ttl_v4(1)?;
    let bind_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
    socket.bind(&bind_addr.into())?;
    UdpSocket::from_std(socket.into())
}
