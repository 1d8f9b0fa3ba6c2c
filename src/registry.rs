use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::events::{BusEvent, EventSink};
use crate::Result;

type UpdateListener = Box<dyn Fn(&str, &Map<String, Value>) -> Result<()> + Send + Sync>;

/// One metering device as the hub knows it.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device_id: String,
    pub name: String,
    /// Normalized uppercase colon-separated MAC, when known.
    pub mac: Option<String>,
    /// Last reported value per protocol field, merge-updated.
    pub current_state: Map<String, Value>,
    /// Set only by genuine device-originated updates, never by restores.
    pub last_update_time: Option<DateTime<Utc>>,
}

/// In-memory device store, one per running hub instance. Indexed by id and
/// by MAC; serial lookups scan (device counts are tens, not thousands).
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
    by_mac: HashMap<String, String>,
    listeners: Vec<UpdateListener>,
    sink: Arc<dyn EventSink>,
}

impl DeviceRegistry {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            devices: HashMap::new(),
            by_mac: HashMap::new(),
            listeners: Vec::new(),
            sink,
        }
    }

    /// Add a device. `current_state` starts as an empty map, not absent, so
    /// downstream priority logic can tell "no data yet" from "empty data".
    pub fn add(
        &mut self,
        device_id: impl Into<String>,
        name: impl Into<String>,
        mac: Option<String>,
    ) -> bool {
        let device_id = device_id.into();
        if self.devices.contains_key(&device_id) {
            warn!(device_id = %device_id, "device already exists");
            return false;
        }

        let name = name.into();
        let mac = mac.map(|m| m.to_uppercase());
        if let Some(mac) = &mac {
            self.by_mac.insert(mac.clone(), device_id.clone());
            info!(device_id = %device_id, name = %name, mac = %mac, "device added");
        } else {
            info!(device_id = %device_id, name = %name, "device added");
        }

        self.devices.insert(
            device_id.clone(),
            DeviceRecord {
                device_id,
                name,
                mac,
                current_state: Map::new(),
                last_update_time: None,
            },
        );
        true
    }

    pub fn remove(&mut self, device_id: &str) -> bool {
        let Some(record) = self.devices.remove(device_id) else {
            warn!(device_id, "device not found");
            return false;
        };
        if let Some(mac) = &record.mac {
            self.by_mac.remove(mac);
        }
        info!(device_id, name = %record.name, "device removed");
        true
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.devices.get(device_id)
    }

    pub fn get_by_mac(&self, mac: &str) -> Option<&DeviceRecord> {
        let id = self.by_mac.get(&mac.to_uppercase())?;
        self.devices.get(id)
    }

    pub fn get_by_serial(&self, serial: &str) -> Option<&DeviceRecord> {
        self.devices.values().find(|record| {
            record
                .current_state
                .get("key")
                .and_then(Value::as_str)
                .is_some_and(|key| key == serial)
        })
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Merge reported fields into a device's state. Field-wise overwrite,
    /// nothing is ever deleted; `last_update_time` moves only when the
    /// payload carries the device's own `timestamp` marker.
    pub fn update_state(&mut self, device_id: &str, fields: &Map<String, Value>) -> bool {
        let Some(record) = self.devices.get_mut(device_id) else {
            warn!(device_id, "device not found");
            return false;
        };

        let first_update = record.current_state.is_empty() || record.last_update_time.is_none();

        for (key, value) in fields {
            record.current_state.insert(key.clone(), value.clone());
        }

        if fields.contains_key("timestamp") {
            record.last_update_time = Some(Utc::now());
        }

        for listener in &self.listeners {
            if let Err(e) = listener(device_id, fields) {
                error!(device_id, error = %e, "device update listener failed");
            }
        }

        self.sink.publish(BusEvent::DeviceUpdate {
            device_id: device_id.to_string(),
            fields: fields.clone(),
        });

        if first_update {
            info!(device_id, keys = fields.len(), "first data received from device");
        } else {
            debug!(device_id, keys = fields.len(), "device state updated");
        }
        true
    }

    /// Seed a field during restore without marking the device as live and
    /// without waking listeners.
    pub fn restore_state(&mut self, device_id: &str, field: &str, value: Value) -> bool {
        let Some(record) = self.devices.get_mut(device_id) else {
            return false;
        };
        record.current_state.insert(field.to_string(), value);
        true
    }

    pub fn register_listener(
        &mut self,
        listener: impl Fn(&str, &Map<String, Value>) -> Result<()> + Send + Sync + 'static,
    ) {
        self.listeners.push(Box::new(listener));
    }
}
