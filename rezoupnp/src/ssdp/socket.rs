//! Async SSDP sockets.

use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use super::{SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpEvent, format_msearch, parse_message};

/// Async UDP socket for SSDP, usable as a control-point listener or as the
/// beacon transport.
pub struct SsdpSocket {
    socket: UdpSocket,
}

impl SsdpSocket {
    /// Binds a control-point socket on an ephemeral port and joins the SSDP
    /// multicast group on every non-loopback IPv4 interface.
    pub fn bind_listener() -> std::io::Result<Self> {
        Self::bind(0)
    }

    /// Binds the device-mode socket on UDP 1900 so M-SEARCH requests are
    /// received.
    pub fn bind_device() -> std::io::Result<Self> {
        Self::bind(SSDP_PORT)
    }

    fn bind(port: u16) -> std::io::Result<Self> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        raw.set_nonblocking(true)?;

        let bind_addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
        raw.bind(&bind_addr.into())?;

        let std_socket: std::net::UdpSocket = raw.into();
        std_socket.set_multicast_loop_v4(true)?;

        let group: Ipv4Addr = SSDP_MULTICAST_ADDR
            .parse()
            .expect("multicast literal is valid");
        let mut joined = false;
        for iface in get_if_addrs::get_if_addrs()? {
            if let std::net::IpAddr::V4(ipv4) = iface.ip() {
                if ipv4.is_loopback() {
                    continue;
                }
                match std_socket.join_multicast_v4(&group, &ipv4) {
                    Ok(()) => {
                        debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4);
                        joined = true;
                    }
                    Err(e) => {
                        warn!("SSDP: failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, ipv4, e)
                    }
                }
            }
        }
        if !joined {
            // Single-homed containers sometimes expose no joinable interface;
            // unicast replies still arrive, so this is not fatal.
            if let Err(e) = std_socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
                warn!("SSDP: default multicast join failed: {}", e);
            }
        }

        let socket = UdpSocket::from_std(std_socket)?;
        Ok(Self { socket })
    }

    /// Multicasts an M-SEARCH for the given search target.
    pub async fn send_msearch(&self, st: &str, mx: u32) -> std::io::Result<()> {
        let msg = format_msearch(st, mx);
        let addr: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
            .parse()
            .expect("multicast address is valid");
        self.socket.send_to(msg.as_bytes(), addr).await?;
        debug!("M-SEARCH sent (ST={}, MX={})", st, mx);
        Ok(())
    }

    /// Receives the next datagram and parses it; `None` for datagrams that
    /// are not relevant SSDP events.
    pub async fn recv_event(&self) -> std::io::Result<Option<SsdpEvent>> {
        let mut buf = [0u8; 8192];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        let data = String::from_utf8_lossy(&buf[..n]);
        Ok(parse_message(&data, from))
    }

    /// Receives the next raw datagram (device mode needs the M-SEARCH text
    /// the event parser discards).
    pub async fn recv_raw(&self) -> std::io::Result<(String, SocketAddr)> {
        let mut buf = [0u8; 8192];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        Ok((String::from_utf8_lossy(&buf[..n]).into_owned(), from))
    }

    pub async fn send_to(&self, payload: &str, addr: SocketAddr) -> std::io::Result<()> {
        self.socket.send_to(payload.as_bytes(), addr).await?;
        Ok(())
    }

    /// Multicasts a raw payload to the SSDP group.
    pub async fn send_multicast(&self, payload: &str) -> std::io::Result<()> {
        let addr: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
            .parse()
            .expect("multicast address is valid");
        self.send_to(payload, addr).await
    }
}
