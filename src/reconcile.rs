use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::announce::WelcomeAnnouncer;
use crate::config::{DeviceConfigStore, DeviceEntry};
use crate::events::{BusEvent, EventSink};
use crate::notify::Notifier;
use crate::payload::Telemetry;
use crate::registry::DeviceRegistry;
use crate::validate::{clean, validate};
use crate::{Error, Result};

/// Strip separators and normalize a MAC to `XX:XX:XX:XX:XX:XX`.
/// Anything that does not reduce to exactly 12 hex digits is rejected.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_ascii_uppercase();
    if hex.len() != 12 {
        return None;
    }
    let mut out = String::with_capacity(17);
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(':');
        }
        out.push(chunk[0] as char);
        out.push(chunk[1] as char);
    }
    Some(out)
}

/// Deterministic device id for a normalized MAC.
pub fn device_id_from_mac(mac: &str) -> String {
    format!("meter_{}", mac.replace(':', "").to_ascii_lowercase())
}

/// Display name from the MAC tail, e.g. `Meter #EEFF`.
pub fn device_name_from_mac(mac: &str) -> String {
    let hex = mac.replace(':', "");
    let tail = &hex[hex.len().saturating_sub(4)..];
    format!("Meter #{tail}")
}

/// What the boundary echoes back to the device after an ingest.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub mac: Option<String>,
}

impl IngestOutcome {
    pub fn to_json(&self) -> Value {
        json!({
            "status": "ok",
            "device_id": self.device_id,
            "device_name": self.device_name,
            "mac": self.mac,
        })
    }
}

/// Resolves inbound payloads to devices, auto-provisioning when allowed, and
/// merges reported state into the registry.
pub struct Reconciler {
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn EventSink>,
    announcer: Option<Arc<WelcomeAnnouncer>>,
}

impl Reconciler {
    pub fn new(notifier: Arc<dyn Notifier>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            notifier,
            sink,
            announcer: None,
        }
    }

    pub fn with_announcer(mut self, announcer: Arc<WelcomeAnnouncer>) -> Self {
        self.announcer = Some(announcer);
        self
    }

    /// Run one payload through the ingestion pipeline.
    ///
    /// Validation is advisory: a payload that fails checks is still sanitized
    /// and processed. The only hard identification failure is a present but
    /// malformed MAC, which rejects the request before any state mutation.
    pub fn ingest(
        &self,
        registry: &mut DeviceRegistry,
        config: &mut dyn DeviceConfigStore,
        payload: &mut Value,
    ) -> Result<IngestOutcome> {
        let (valid, errors) = validate(payload);
        if !valid {
            warn!(
                errors = ?errors,
                "payload failed validation, processing sanitized data anyway"
            );
        }

        let cleaned = clean(payload);
        let telemetry = Telemetry::from_sanitized(&cleaned);

        let mac = match telemetry.mac.as_deref() {
            Some(raw) => {
                Some(normalize_mac(raw).ok_or_else(|| Error::InvalidMac(raw.to_string()))?)
            }
            None => None,
        };

        let mut resolved: Option<(String, String)> = None;
        let mut merged = false;

        if let Some(mac) = mac.as_deref() {
            if let Some(record) = registry.get_by_mac(mac) {
                debug!(
                    device_id = %record.device_id,
                    name = %record.name,
                    mac,
                    "payload resolved to known device"
                );
                resolved = Some((record.device_id.clone(), record.name.clone()));
            } else if config.auto_add_devices() {
                debug!(mac, "unknown device, attempting auto-provision");
                resolved = self.auto_provision(registry, config, mac, &telemetry, &cleaned);
                merged = resolved.is_some();
            } else {
                warn!(mac, "unknown device and auto-add disabled, dropping");
            }
        }

        match &resolved {
            Some((device_id, device_name)) => {
                if !merged {
                    registry.update_state(device_id, &cleaned);
                }

                if let Some(key) = telemetry.key.as_deref() {
                    match config.update_device_key(device_id, key) {
                        Ok(true) => debug!(device_id = %device_id, "persisted new device serial"),
                        Ok(false) => {}
                        Err(e) => warn!(device_id = %device_id, error = %e, "failed to persist device serial"),
                    }
                }

                debug!(
                    device_id = %device_id,
                    ch0 = ?telemetry.ch0,
                    ch1 = ?telemetry.ch1,
                    voltage = ?telemetry.voltage,
                    battery = ?telemetry.battery,
                    rssi = ?telemetry.rssi,
                    "data received"
                );

                self.sink.publish(BusEvent::DeviceDataReceived {
                    device_id: device_id.clone(),
                    device_name: device_name.clone(),
                    mac: mac.clone().unwrap_or_default(),
                });

                Ok(IngestOutcome {
                    device_id: Some(device_id.clone()),
                    device_name: Some(device_name.clone()),
                    mac,
                })
            }
            None => {
                info!(
                    mac = mac.as_deref().unwrap_or("unknown"),
                    ch0 = ?telemetry.ch0,
                    key = ?telemetry.key,
                    "data received from unrecognized device"
                );
                self.notifier.unrecognized_data(mac.as_deref());
                self.sink
                    .publish(BusEvent::DataReceived { mac: mac.clone() });
                Ok(IngestOutcome {
                    device_id: None,
                    device_name: None,
                    mac,
                })
            }
        }
    }

    /// Create, persist and announce a device for a first-contact MAC.
    ///
    /// Reported fields are merged before the announcement so that anything
    /// listening to `DeviceAdded` initializes from live values rather than
    /// defaults. Persist failure rolls the registry entry back; nothing is
    /// announced in that case.
    fn auto_provision(
        &self,
        registry: &mut DeviceRegistry,
        config: &mut dyn DeviceConfigStore,
        mac: &str,
        telemetry: &Telemetry,
        cleaned: &Map<String, Value>,
    ) -> Option<(String, String)> {
        let device_id = device_id_from_mac(mac);
        let device_name = device_name_from_mac(mac);

        if registry.get(&device_id).is_some() {
            warn!(device_id = %device_id, "device id already present, not re-adding");
            return None;
        }
        if registry.get_by_mac(mac).is_some() {
            warn!(mac, "MAC already registered, not re-adding");
            return None;
        }
        let already_persisted = config.devices().iter().any(|d| {
            d.device_mac
                .as_deref()
                .and_then(normalize_mac)
                .as_deref()
                == Some(mac)
        });
        if already_persisted {
            warn!(mac, "MAC already present in persisted config, not re-adding");
            return None;
        }

        if !registry.add(device_id.clone(), device_name.clone(), Some(mac.to_string())) {
            error!(device_id = %device_id, "failed to add device to registry");
            return None;
        }

        let entry = DeviceEntry {
            device_id: device_id.clone(),
            device_name: device_name.clone(),
            device_mac: Some(mac.to_string()),
            device_key: telemetry.key.clone(),
        };
        if let Err(e) = config.append_device(entry) {
            error!(device_id = %device_id, error = %e, "failed to persist device, rolling back");
            registry.remove(&device_id);
            return None;
        }

        registry.update_state(&device_id, cleaned);

        info!(
            device_id = %device_id,
            name = %device_name,
            mac,
            "auto-provisioned new device"
        );
        self.sink.publish(BusEvent::DeviceAdded {
            device_id: device_id.clone(),
            device_name: device_name.clone(),
            device_mac: mac.to_string(),
        });

        if let Some(announcer) = &self.announcer {
            announcer.schedule(device_id.clone(), device_name.clone(), mac.to_string());
        }

        Some((device_id, device_name))
    }
}
