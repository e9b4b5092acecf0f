//! Small network helpers.

use std::net::Ipv4Addr;

/// Best-effort guess of the local IPv4 address: the first non-loopback
/// interface address.
pub fn guess_local_ip() -> Option<Ipv4Addr> {
    let interfaces = get_if_addrs::get_if_addrs().ok()?;
    interfaces.into_iter().find_map(|iface| match iface.ip() {
        std::net::IpAddr::V4(ipv4) if !ipv4.is_loopback() => Some(ipv4),
        _ => None,
    })
}
