//! SSDP presence signaling.
//!
//! Message parsing and formatting shared by the control-point listener and
//! the beacon. The listener side must not bind UDP port 1900: the beacon
//! (device mode) owns it, and two sockets on 1900 would load-balance
//! incoming datagrams between them, randomly losing NOTIFY messages.
//! The listener therefore uses an ephemeral port and still receives
//! multicast NOTIFY through group membership plus unicast M-SEARCH replies.

mod beacon;
mod socket;

pub use beacon::{BeaconDevice, SsdpBeacon};
pub use socket::SsdpSocket;

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::trace;

pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";
pub const SSDP_PORT: u16 = 1900;
pub const MAX_AGE: u32 = 1800;

/// SSDP events relevant to a control point.
#[derive(Debug, Clone)]
pub enum SsdpEvent {
    Alive {
        usn: String,
        nt: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
    ByeBye {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    SearchResponse {
        usn: String,
        st: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
}

impl SsdpEvent {
    /// Extracts the `uuid:...` part of the event's USN, lowercased.
    pub fn udn(&self) -> Option<String> {
        let usn = match self {
            SsdpEvent::Alive { usn, .. }
            | SsdpEvent::ByeBye { usn, .. }
            | SsdpEvent::SearchResponse { usn, .. } => usn,
        };
        extract_udn_from_usn(usn)
    }
}

/// Extracts the `uuid:...` segment from a USN header value.
pub fn extract_udn_from_usn(usn: &str) -> Option<String> {
    let lower = usn.trim().to_ascii_lowercase();
    let idx = lower.find("uuid:")?;
    let sub = &lower[idx..];
    match sub.find("::") {
        Some(end) => Some(sub[..end].to_string()),
        None => Some(sub.to_string()),
    }
}

/// Parses one SSDP datagram into an event, if it is one we care about.
pub fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpEvent> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    if upper.starts_with("NOTIFY ") {
        handle_notify(&headers, from)
    } else if upper.starts_with("HTTP/") && upper.contains(" 200 ") {
        handle_search_response(&headers, from)
    } else {
        // M-SEARCH from another control point, or something unknown.
        trace!("Ignoring SSDP message from {}: {}", from, first_line);
        None
    }
}

fn handle_notify(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.to_string();
    let usn = headers.get("USN")?.to_string();

    if nts == "ssdp:alive" {
        let location = headers.get("LOCATION")?.to_string();
        let server = headers
            .get("SERVER")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let max_age = parse_max_age(headers.get("CACHE-CONTROL"));

        Some(SsdpEvent::Alive {
            usn,
            nt,
            location,
            server,
            max_age,
            from,
        })
    } else if nts == "ssdp:byebye" {
        Some(SsdpEvent::ByeBye { usn, nt, from })
    } else {
        trace!("Unknown NTS value from {}: {}", from, nts);
        None
    }
}

fn handle_search_response(
    headers: &HashMap<String, String>,
    from: SocketAddr,
) -> Option<SsdpEvent> {
    let st = headers.get("ST")?.to_string();
    let usn = headers.get("USN")?.to_string();
    let location = headers.get("LOCATION")?.to_string();
    let server = headers
        .get("SERVER")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string());
    let max_age = parse_max_age(headers.get("CACHE-CONTROL"));

    Some(SsdpEvent::SearchResponse {
        usn,
        st,
        location,
        server,
        max_age,
        from,
    })
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        // Split on the first ':' only; values may contain ':'.
        if let Some(colon_pos) = line.find(':') {
            let (name, value_with_colon) = line.split_at(colon_pos);
            let value = &value_with_colon[1..];

            let name = name.trim().to_ascii_uppercase();
            let value = value.trim().to_string();
            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value);
            }
        } else {
            trace!("Skipping SSDP line without colon: '{}'", line);
        }
    }
    headers
}

fn parse_max_age(value: Option<&String>) -> u32 {
    if let Some(v) = value {
        let lower = v.to_ascii_lowercase();
        if let Some(idx) = lower.find("max-age") {
            let after_key = &v[idx + 7..];
            let after_eq = after_key.trim_start().trim_start_matches('=').trim_start();
            let digits: String = after_eq
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(age) = digits.parse::<u32>() {
                return age;
            }
        }
        trace!("Could not parse max-age from '{}', using default", v);
    }
    MAX_AGE
}

/// Formats an M-SEARCH request for the given search target.
pub fn format_msearch(st: &str, mx: u32) -> String {
    let mx = mx.max(1);
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         USER-AGENT: REZOBridge SSDP Client\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR, SSDP_PORT, mx, st
    )
}

pub(crate) fn usn_for(uuid: &str, nt: &str) -> String {
    if nt.starts_with("uuid:") {
        nt.to_string()
    } else {
        format!("{}::{}", uuid, nt)
    }
}

pub(crate) fn format_alive(uuid: &str, location: &str, server: &str, nt: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         LOCATION: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:alive\r\n\
         SERVER: {}\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        MAX_AGE,
        location,
        nt,
        server,
        usn_for(uuid, nt)
    )
}

pub(crate) fn format_byebye(uuid: &str, nt: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         NT: {}\r\n\
         NTS: ssdp:byebye\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        nt,
        usn_for(uuid, nt)
    )
}

pub(crate) fn format_search_response(
    uuid: &str,
    location: &str,
    server: &str,
    st: &str,
) -> String {
    let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         DATE: {}\r\n\
         EXT:\r\n\
         LOCATION: {}\r\n\
         SERVER: {}\r\n\
         ST: {}\r\n\
         USN: {}\r\n\
         \r\n",
        MAX_AGE,
        date,
        location,
        server,
        st,
        usn_for(uuid, st)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> SocketAddr {
        "10.0.0.9:1900".parse().unwrap()
    }

    #[test]
    fn parses_notify_alive() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                   HOST: 239.255.255.250:1900\r\n\
                   CACHE-CONTROL: max-age=100\r\n\
                   LOCATION: http://10.0.0.9:1400/xml/device_description.xml\r\n\
                   NT: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                   NTS: ssdp:alive\r\n\
                   SERVER: Linux UPnP/1.0 Sonos/70.1\r\n\
                   USN: uuid:RINCON_ABC::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\r\n";

        match parse_message(msg, from()).unwrap() {
            SsdpEvent::Alive {
                location, max_age, ..
            } => {
                assert_eq!(location, "http://10.0.0.9:1400/xml/device_description.xml");
                assert_eq!(max_age, 100);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn parses_byebye() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                   NT: upnp:rootdevice\r\n\
                   NTS: ssdp:byebye\r\n\
                   USN: uuid:abc::upnp:rootdevice\r\n\r\n";

        let event = parse_message(msg, from()).unwrap();
        assert!(matches!(event, SsdpEvent::ByeBye { .. }));
        assert_eq!(event.udn().unwrap(), "uuid:abc");
    }

    #[test]
    fn parses_search_response() {
        let msg = "HTTP/1.1 200 OK\r\n\
                   CACHE-CONTROL: max-age=1800\r\n\
                   LOCATION: http://10.0.0.7:8200/device.xml\r\n\
                   SERVER: REZOBridge/0.1\r\n\
                   ST: upnp:rootdevice\r\n\
                   USN: uuid:def::upnp:rootdevice\r\n\r\n";

        match parse_message(msg, from()).unwrap() {
            SsdpEvent::SearchResponse { usn, .. } => {
                assert_eq!(usn, "uuid:def::upnp:rootdevice");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn ignores_msearch_and_garbage() {
        let msearch = "M-SEARCH * HTTP/1.1\r\nST: ssdp:all\r\n\r\n";
        assert!(parse_message(msearch, from()).is_none());
        assert!(parse_message("not even http", from()).is_none());
    }

    #[test]
    fn alive_without_location_is_ignored() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                   NT: upnp:rootdevice\r\n\
                   NTS: ssdp:alive\r\n\
                   USN: uuid:abc\r\n\r\n";
        assert!(parse_message(msg, from()).is_none());
    }

    #[test]
    fn extracts_udn_case_insensitively() {
        assert_eq!(
            extract_udn_from_usn("UUID:RINCON_X::urn:foo").unwrap(),
            "uuid:rincon_x"
        );
        assert!(extract_udn_from_usn("no-uuid-here").is_none());
    }

    #[test]
    fn max_age_defaults_when_unparseable() {
        let headers = Some("private".to_string());
        assert_eq!(parse_max_age(headers.as_ref()), MAX_AGE);
    }
}
