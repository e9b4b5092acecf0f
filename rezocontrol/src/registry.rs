//! Device registry.
//!
//! Owns the device directory: a map keyed by description location plus a
//! UDN index pointing at the same shared records. All mutation goes through
//! registry methods; locks are released before any suspension point, so
//! the single-writer discipline holds without async locking.
//!
//! Retention is deliberate: byebye signals and failed refreshes never
//! delete a resolved record. Records leave the registry only through
//! [`DeviceRegistry::remove_device`] or [`DeviceRegistry::shutdown`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use rezoupnp::DeviceDescription;

use crate::errors::ControlError;
use crate::model::DeviceRecord;

pub type SharedDevice = Arc<Mutex<DeviceRecord>>;

/// Seed entry supplied by the persistence collaborator at startup.
#[derive(Debug, Clone)]
pub struct DeviceSeed {
    pub location: String,
    pub udn: String,
    pub friendly_name: String,
    pub custom_name: Option<String>,
    pub renderer_disabled: bool,
    pub server_disabled: bool,
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_location: HashMap<String, SharedDevice>,
    udn_index: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the device list persisted by a previous run. Seeded records are
    /// not `loading`: they are stale but usable until re-sighted.
    pub fn seed(&self, seeds: Vec<DeviceSeed>) {
        let mut inner = self.inner.lock().expect("Registry mutex poisoned");
        for seed in seeds {
            let udn = seed.udn.to_ascii_lowercase();
            let mut record = DeviceRecord::provisional(&seed.location);
            record.loading = false;
            record.udn = Some(udn.clone());
            record.friendly_name = seed.friendly_name;
            record.custom_name = seed.custom_name;
            record.renderer_disabled = seed.renderer_disabled;
            record.server_disabled = seed.server_disabled;

            inner
                .by_location
                .insert(seed.location.clone(), Arc::new(Mutex::new(record)));
            inner.udn_index.insert(udn, seed.location);
        }
    }

    /// Registers a provisional record for an unconfirmed location and
    /// returns it, or `None` when the location is already known.
    pub fn begin_resolution(&self, location: &str) -> Option<SharedDevice> {
        let mut inner = self.inner.lock().expect("Registry mutex poisoned");
        if inner.by_location.contains_key(location) {
            return None;
        }

        let record = Arc::new(Mutex::new(DeviceRecord::provisional(location)));
        inner
            .by_location
            .insert(location.to_string(), Arc::clone(&record));
        debug!(location, "Provisional device record inserted");
        Some(record)
    }

    /// Drops a provisional record whose description could not be fetched.
    /// Resolved records are never deleted this way.
    pub fn resolution_failed(&self, location: &str) {
        let mut inner = self.inner.lock().expect("Registry mutex poisoned");
        let still_loading = inner
            .by_location
            .get(location)
            .map(|record| record.lock().expect("Device mutex poisoned").loading)
            .unwrap_or(false);

        if still_loading {
            inner.by_location.remove(location);
            debug!(location, "Provisional device dropped after failed resolution");
        }
    }

    /// Promotes a record with its resolved description, reconciling identity
    /// when the UDN was previously seen at a different location.
    pub fn complete_resolution(
        &self,
        location: &str,
        desc: DeviceDescription,
    ) -> Result<SharedDevice, ControlError> {
        let udn = desc.udn.to_ascii_lowercase();
        let mut inner = self.inner.lock().expect("Registry mutex poisoned");

        let record = match inner.by_location.get(location) {
            Some(record) => Arc::clone(record),
            None => {
                // Resolution can be requested for a location the registry has
                // never seen (vendor push); register it on the fly.
                let record = Arc::new(Mutex::new(DeviceRecord::provisional(location)));
                inner
                    .by_location
                    .insert(location.to_string(), Arc::clone(&record));
                record
            }
        };

        // The device moved address: drop the stale location entry and carry
        // user edits over to the merged record.
        let mut carried: Option<(Option<String>, bool, bool)> = None;
        if let Some(old_location) = inner.udn_index.get(&udn).cloned() {
            if old_location != location {
                if let Some(stale) = inner.by_location.remove(&old_location) {
                    let stale = stale.lock().expect("Device mutex poisoned");
                    carried = Some((
                        stale.custom_name.clone(),
                        stale.renderer_disabled,
                        stale.server_disabled,
                    ));
                }
                info!(
                    udn = %udn,
                    old = %old_location,
                    new = %location,
                    "Device moved; records merged"
                );
            }
        }

        let previous_udn = {
            let mut guard = record.lock().expect("Device mutex poisoned");
            let previous_udn = guard.udn.clone();
            guard.apply_description(desc);
            if let Some((custom_name, renderer_disabled, server_disabled)) = carried {
                if guard.custom_name.is_none() {
                    guard.custom_name = custom_name;
                }
                guard.renderer_disabled = renderer_disabled;
                guard.server_disabled = server_disabled;
            }
            previous_udn
        };

        // A different device answering at the same location invalidates the
        // old UDN key.
        if let Some(previous) = previous_udn {
            if previous != udn && inner.udn_index.get(&previous).map(String::as_str) == Some(location)
            {
                inner.udn_index.remove(&previous);
            }
        }

        inner.udn_index.insert(udn, location.to_string());
        Ok(record)
    }

    /// Refreshes `last_seen` on a re-sighted record.
    pub fn touch(&self, location: &str) {
        if let Some(record) = self.device_by_location(location) {
            record.lock().expect("Device mutex poisoned").last_seen = SystemTime::now();
        }
    }

    /// A device said goodbye. Absence is not deletion: the record stays,
    /// untouched, until explicitly removed.
    pub fn on_byebye(&self, udn: &str) {
        if self.device_by_udn(udn).is_some() {
            debug!(udn, "Device announced byebye; record retained");
        }
    }

    pub fn device_by_location(&self, location: &str) -> Option<SharedDevice> {
        let inner = self.inner.lock().expect("Registry mutex poisoned");
        inner.by_location.get(location).cloned()
    }

    pub fn device_by_udn(&self, udn: &str) -> Option<SharedDevice> {
        let lookup = udn.to_ascii_lowercase();
        let inner = self.inner.lock().expect("Registry mutex poisoned");
        inner
            .udn_index
            .get(&lookup)
            .and_then(|location| inner.by_location.get(location))
            .cloned()
    }

    pub fn list_devices(&self) -> Vec<SharedDevice> {
        let inner = self.inner.lock().expect("Registry mutex poisoned");
        inner.by_location.values().cloned().collect()
    }

    /// Snapshot of every record, for the collaborator boundary.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.list_devices()
            .iter()
            .map(|record| record.lock().expect("Device mutex poisoned").clone())
            .collect()
    }

    pub fn set_custom_name(&self, udn: &str, name: Option<String>) -> Result<(), ControlError> {
        let record = self
            .device_by_udn(udn)
            .ok_or_else(|| ControlError::NotFound(udn.to_string()))?;
        record.lock().expect("Device mutex poisoned").custom_name = name;
        Ok(())
    }

    pub fn set_renderer_disabled(&self, udn: &str, disabled: bool) -> Result<(), ControlError> {
        let record = self
            .device_by_udn(udn)
            .ok_or_else(|| ControlError::NotFound(udn.to_string()))?;
        record
            .lock()
            .expect("Device mutex poisoned")
            .renderer_disabled = disabled;
        Ok(())
    }

    pub fn set_server_disabled(&self, udn: &str, disabled: bool) -> Result<(), ControlError> {
        let record = self
            .device_by_udn(udn)
            .ok_or_else(|| ControlError::NotFound(udn.to_string()))?;
        record
            .lock()
            .expect("Device mutex poisoned")
            .server_disabled = disabled;
        Ok(())
    }

    /// Explicit external removal, the only way a record leaves the registry.
    pub fn remove_device(&self, udn: &str) -> Result<(), ControlError> {
        let lookup = udn.to_ascii_lowercase();
        let mut inner = self.inner.lock().expect("Registry mutex poisoned");
        let location = inner
            .udn_index
            .remove(&lookup)
            .ok_or_else(|| ControlError::NotFound(udn.to_string()))?;
        inner.by_location.remove(&location);
        info!(udn = %lookup, "Device removed");
        Ok(())
    }

    /// Teardown: clears both indexes.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("Registry mutex poisoned");
        let count = inner.by_location.len();
        inner.by_location.clear();
        inner.udn_index.clear();
        if count > 0 {
            warn!(count, "Registry shut down with devices still known");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rezoupnp::Classification;

    fn description(udn: &str, name: &str) -> DeviceDescription {
        DeviceDescription {
            udn: udn.to_string(),
            friendly_name: name.to_string(),
            manufacturer: "Acme".to_string(),
            model_name: "Box".to_string(),
            services: Vec::new(),
            classification: Classification::Renderer,
            icon_url: None,
            is_sonos: false,
        }
    }

    #[test]
    fn provisional_records_are_dropped_on_failure() {
        let registry = DeviceRegistry::new();
        assert!(registry.begin_resolution("http://l1/d.xml").is_some());
        assert!(registry.begin_resolution("http://l1/d.xml").is_none());

        registry.resolution_failed("http://l1/d.xml");
        assert!(registry.device_by_location("http://l1/d.xml").is_none());
    }

    #[test]
    fn resolved_records_survive_failed_refresh() {
        let registry = DeviceRegistry::new();
        registry.begin_resolution("http://l1/d.xml");
        registry
            .complete_resolution("http://l1/d.xml", description("uuid:A", "One"))
            .unwrap();

        registry.resolution_failed("http://l1/d.xml");
        assert!(registry.device_by_location("http://l1/d.xml").is_some());
    }

    #[test]
    fn udn_and_location_reach_the_same_record() {
        let registry = DeviceRegistry::new();
        registry.begin_resolution("http://l1/d.xml");
        registry
            .complete_resolution("http://l1/d.xml", description("uuid:A", "One"))
            .unwrap();

        let by_location = registry.device_by_location("http://l1/d.xml").unwrap();
        let by_udn = registry.device_by_udn("uuid:A").unwrap();
        assert!(Arc::ptr_eq(&by_location, &by_udn));
    }

    #[test]
    fn moved_device_is_reconciled_and_keeps_user_edits() {
        let registry = DeviceRegistry::new();

        registry.begin_resolution("http://l1/d.xml");
        registry
            .complete_resolution("http://l1/d.xml", description("uuid:U", "One"))
            .unwrap();
        registry
            .set_custom_name("uuid:U", Some("Kitchen".to_string()))
            .unwrap();
        registry.set_renderer_disabled("uuid:U", true).unwrap();

        // Same UDN shows up at a new address.
        registry.begin_resolution("http://l2/d.xml");
        registry
            .complete_resolution("http://l2/d.xml", description("uuid:U", "One"))
            .unwrap();

        assert!(registry.device_by_location("http://l1/d.xml").is_none());
        assert_eq!(registry.list_devices().len(), 1);

        let record = registry.device_by_udn("uuid:U").unwrap();
        let record = record.lock().unwrap();
        assert_eq!(record.location, "http://l2/d.xml");
        assert_eq!(record.custom_name.as_deref(), Some("Kitchen"));
        assert!(record.renderer_disabled);
    }

    #[test]
    fn byebye_is_not_destructive() {
        let registry = DeviceRegistry::new();
        registry.begin_resolution("http://l1/d.xml");
        registry
            .complete_resolution("http://l1/d.xml", description("uuid:A", "One"))
            .unwrap();

        registry.on_byebye("uuid:A");
        assert!(registry.device_by_udn("uuid:A").is_some());
    }

    #[test]
    fn remove_device_clears_both_keys() {
        let registry = DeviceRegistry::new();
        registry.begin_resolution("http://l1/d.xml");
        registry
            .complete_resolution("http://l1/d.xml", description("uuid:A", "One"))
            .unwrap();

        registry.remove_device("uuid:A").unwrap();
        assert!(registry.device_by_udn("uuid:A").is_none());
        assert!(registry.device_by_location("http://l1/d.xml").is_none());
        assert!(matches!(
            registry.remove_device("uuid:A"),
            Err(ControlError::NotFound(_))
        ));
    }

    #[test]
    fn udn_lookup_is_case_insensitive() {
        let registry = DeviceRegistry::new();
        registry.begin_resolution("http://l1/d.xml");
        registry
            .complete_resolution("http://l1/d.xml", description("uuid:RINCON_X", "One"))
            .unwrap();

        assert!(registry.device_by_udn("UUID:rincon_x").is_some());
    }
}
