//! Discovery manager: SSDP events and the vendor push channel feed the
//! registry; description resolution runs in background tasks.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, warn};

use rezoupnp::fetch_description;
use rezoupnp::ssdp::{SsdpEvent, SsdpSocket};

use crate::errors::ControlError;
use crate::registry::DeviceRegistry;

/// Bound on a single description fetch.
pub const DESCRIPTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum interval between two background icon re-resolutions of the same
/// record.
pub const ICON_RECHECK_BACKOFF: Duration = Duration::from_secs(300);

/// Fixed description endpoint of the Sonos push channel.
const SONOS_DESCRIPTION_PORT: u16 = 1400;

pub struct DiscoveryManager {
    registry: Arc<DeviceRegistry>,
    socket: SsdpSocket,
}

impl DiscoveryManager {
    pub fn new(registry: Arc<DeviceRegistry>) -> std::io::Result<Self> {
        let socket = SsdpSocket::bind_listener()?;
        Ok(Self { registry, socket })
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Listens for SSDP events until `shutdown` flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                received = self.socket.recv_event() => {
                    match received {
                        Ok(Some(event)) => self.on_announce(event).await,
                        Ok(None) => {}
                        Err(e) => warn!("SSDP receive error: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("Discovery manager stopping");
                    return;
                }
            }
        }
    }

    /// Handles one passive presence signal.
    pub async fn on_announce(self: &Arc<Self>, event: SsdpEvent) {
        match event {
            SsdpEvent::Alive { location, from, .. }
            | SsdpEvent::SearchResponse { location, from, .. } => {
                debug!(location = %location, peer = %from, "Presence signal");
                self.sight_location(location);
            }
            SsdpEvent::ByeBye { ref usn, .. } => {
                if let Some(udn) = event.udn() {
                    self.registry.on_byebye(&udn);
                } else {
                    debug!(usn = %usn, "ByeBye without UDN ignored");
                }
            }
        }
    }

    /// Handles the vendor-specific discovery channel: Sonos players push
    /// their host address, and the description URL is fixed per vendor.
    pub async fn on_vendor_push(self: &Arc<Self>, host: IpAddr) {
        let location = format!(
            "http://{}:{}/xml/device_description.xml",
            host, SONOS_DESCRIPTION_PORT
        );
        debug!(location = %location, "Vendor push");
        self.sight_location(location);
    }

    /// Active probe: multicast an M-SEARCH for every device type.
    pub async fn trigger_search(&self) -> Result<(), ControlError> {
        self.socket
            .send_msearch("ssdp:all", 3)
            .await
            .map_err(|err| ControlError::Network(format!("M-SEARCH failed: {err}")))
    }

    /// Common path for both discovery channels: start a resolution for an
    /// unknown location, refresh a known one.
    fn sight_location(self: &Arc<Self>, location: String) {
        if self.registry.begin_resolution(&location).is_some() {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                manager.resolve(&location, true).await;
            });
            return;
        }

        self.registry.touch(&location);
        self.maybe_recheck_icon(&location);
    }

    /// Fetches and applies a description. Failures for provisional records
    /// are expected probing noise and dropped silently.
    async fn resolve(&self, location: &str, provisional: bool) {
        match fetch_description(location, DESCRIPTION_TIMEOUT).await {
            Ok(desc) => {
                if let Err(err) = self.registry.complete_resolution(location, desc) {
                    warn!(location, error = %err, "Failed to register resolved device");
                }
            }
            Err(err) => {
                debug!(location, error = %err, "Description resolution failed");
                if provisional {
                    self.registry.resolution_failed(location);
                }
            }
        }
    }

    /// Re-resolves a record missing an icon, at most once per backoff
    /// interval. The gate timestamp is written before the fetch starts, so
    /// an announce racing with the background task cannot double-schedule
    /// (last-writer-wins on the record itself).
    fn maybe_recheck_icon(self: &Arc<Self>, location: &str) {
        let Some(record) = self.registry.device_by_location(location) else {
            return;
        };

        {
            let mut guard = record.lock().expect("Device mutex poisoned");
            if guard.loading || guard.icon_url.is_some() {
                return;
            }
            if let Some(checked_at) = guard.icon_checked_at {
                if checked_at.elapsed() < ICON_RECHECK_BACKOFF {
                    return;
                }
            }
            guard.icon_checked_at = Some(Instant::now());
        }

        debug!(location, "Re-resolving device missing an icon");
        let manager = Arc::clone(self);
        let location = location.to_string();
        tokio::spawn(async move {
            manager.resolve(&location, false).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Socket-free checks of the announce bookkeeping run against the
    // registry directly; the network paths are covered by the mock-device
    // integration tests.

    #[test]
    fn vendor_push_location_shape() {
        let host: IpAddr = "10.0.0.23".parse().unwrap();
        let location = format!(
            "http://{}:{}/xml/device_description.xml",
            host, SONOS_DESCRIPTION_PORT
        );
        assert_eq!(location, "http://10.0.0.23:1400/xml/device_description.xml");
    }
}
