//! Periodic presence beacon for the local device.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{MAX_AGE, SsdpSocket, format_alive, format_byebye, format_search_response};

/// Identity advertised by the beacon.
#[derive(Debug, Clone)]
pub struct BeaconDevice {
    /// `uuid:...`, stable across restarts.
    pub uuid: String,
    /// URL of the device description document.
    pub location: String,
    /// SERVER header value.
    pub server: String,
    /// Root device type URN.
    pub device_type: String,
    /// Service type URNs of the device.
    pub service_types: Vec<String>,
}

impl BeaconDevice {
    /// Notification types announced for this device: its UUID, the root
    /// device marker, the device type, and each service type.
    fn notification_types(&self) -> Vec<String> {
        let mut nts = vec![self.uuid.clone(), "upnp:rootdevice".to_string()];
        nts.push(self.device_type.clone());
        nts.extend(self.service_types.iter().cloned());
        nts
    }

    fn matches_st(&self, st: &str) -> Vec<String> {
        if st == "ssdp:all" {
            self.notification_types()
        } else {
            self.notification_types()
                .into_iter()
                .filter(|nt| nt == st)
                .collect()
        }
    }
}

/// SSDP beacon: announces the device periodically, answers M-SEARCH, and
/// sends byebye when shut down.
pub struct SsdpBeacon {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SsdpBeacon {
    /// Binds UDP 1900 and starts the announcement task.
    pub fn start(device: BeaconDevice) -> std::io::Result<Self> {
        let socket = SsdpSocket::bind_device()?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        info!(
            uuid = %device.uuid,
            location = %device.location,
            "SSDP beacon started"
        );

        let handle = tokio::spawn(beacon_loop(socket, device, shutdown_rx));
        Ok(Self { shutdown, handle })
    }

    /// Signals the beacon to stop and waits for the byebye burst.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

async fn beacon_loop(
    socket: SsdpSocket,
    device: BeaconDevice,
    mut shutdown: watch::Receiver<bool>,
) {
    // Re-announce at half the advertised lifetime so records never expire.
    let period = Duration::from_secs((MAX_AGE / 2) as u64);
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                send_alive_burst(&socket, &device).await;
            }
            received = socket.recv_raw() => {
                match received {
                    Ok((data, from)) => handle_datagram(&socket, &device, &data, from).await,
                    Err(e) => warn!("SSDP beacon read error: {}", e),
                }
            }
            _ = shutdown.changed() => {
                send_byebye_burst(&socket, &device).await;
                info!(uuid = %device.uuid, "SSDP beacon stopped");
                return;
            }
        }
    }
}

async fn send_alive_burst(socket: &SsdpSocket, device: &BeaconDevice) {
    for nt in device.notification_types() {
        let msg = format_alive(&device.uuid, &device.location, &device.server, &nt);
        if let Err(e) = socket.send_multicast(&msg).await {
            warn!("Failed to send NOTIFY alive for {}: {}", nt, e);
        } else {
            debug!("NOTIFY alive: {}", nt);
        }
    }
}

async fn send_byebye_burst(socket: &SsdpSocket, device: &BeaconDevice) {
    for nt in device.notification_types() {
        let msg = format_byebye(&device.uuid, &nt);
        if let Err(e) = socket.send_multicast(&msg).await {
            warn!("Failed to send NOTIFY byebye for {}: {}", nt, e);
        }
    }
}

async fn handle_datagram(
    socket: &SsdpSocket,
    device: &BeaconDevice,
    data: &str,
    from: SocketAddr,
) {
    if !data.starts_with("M-SEARCH") {
        return;
    }

    let Some(st) = parse_st(data) else {
        return;
    };

    for nt in device.matches_st(&st) {
        let resp = format_search_response(&device.uuid, &device.location, &device.server, &nt);
        match socket.send_to(&resp, from).await {
            Ok(()) => debug!("M-SEARCH response sent to {} (ST={})", from, nt),
            Err(e) => warn!("Failed to send M-SEARCH response to {}: {}", from, e),
        }
    }
}

fn parse_st(data: &str) -> Option<String> {
    for line in data.lines() {
        if line.to_ascii_uppercase().starts_with("ST:") {
            return Some(line[3..].trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> BeaconDevice {
        BeaconDevice {
            uuid: "uuid:1234".to_string(),
            location: "http://10.0.0.5:8200/device.xml".to_string(),
            server: "REZOBridge/0.1 UPnP/1.0".to_string(),
            device_type: "urn:schemas-upnp-org:device:MediaServer:1".to_string(),
            service_types: vec![
                "urn:schemas-upnp-org:service:ContentDirectory:1".to_string(),
                "urn:schemas-upnp-org:service:ConnectionManager:1".to_string(),
            ],
        }
    }

    #[test]
    fn notification_types_cover_device_and_services() {
        let nts = device().notification_types();
        assert_eq!(nts.len(), 4);
        assert!(nts.contains(&"upnp:rootdevice".to_string()));
        assert!(nts.contains(&"uuid:1234".to_string()));
    }

    #[test]
    fn st_matching_filters_targets() {
        let d = device();
        assert_eq!(d.matches_st("ssdp:all").len(), 4);
        assert_eq!(
            d.matches_st("urn:schemas-upnp-org:service:ContentDirectory:1")
                .len(),
            1
        );
        assert!(d.matches_st("urn:other:service:Queue:1").is_empty());
    }

    #[test]
    fn parses_st_header() {
        let msg = "M-SEARCH * HTTP/1.1\r\nHOST: x\r\nst: upnp:rootdevice\r\n\r\n";
        assert_eq!(parse_st(msg).unwrap(), "upnp:rootdevice");
    }
}
