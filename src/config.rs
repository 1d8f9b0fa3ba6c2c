use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// One persisted device record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub device_id: String,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_key: Option<String>,
}

/// Persisted hub configuration: the ordered device list plus the auto-add
/// toggle, mutated exclusively through whole-record rewrite.
pub trait DeviceConfigStore: Send {
    fn devices(&self) -> Vec<DeviceEntry>;
    fn replace_devices(&mut self, devices: Vec<DeviceEntry>) -> Result<()>;
    fn auto_add_devices(&self) -> bool;
    fn set_auto_add_devices(&mut self, enabled: bool) -> Result<()>;

    fn append_device(&mut self, entry: DeviceEntry) -> Result<()> {
        let mut devices = self.devices();
        devices.push(entry);
        self.replace_devices(devices)
    }

    /// Compare-and-write a device's serial. Returns whether anything changed.
    fn update_device_key(&mut self, device_id: &str, key: &str) -> Result<bool> {
        let mut devices = self.devices();
        let Some(entry) = devices.iter_mut().find(|d| d.device_id == device_id) else {
            return Ok(false);
        };
        if entry.device_key.as_deref() == Some(key) {
            return Ok(false);
        }
        debug!(
            device_id,
            old = entry.device_key.as_deref().unwrap_or("(unset)"),
            new = key,
            "device serial updated"
        );
        entry.device_key = Some(key.to_string());
        self.replace_devices(devices)?;
        Ok(true)
    }
}

/// Volatile store for tests and embedded use.
pub struct MemoryStore {
    devices: Vec<DeviceEntry>,
    auto_add: bool,
}

impl MemoryStore {
    pub fn new(auto_add: bool) -> Self {
        Self {
            devices: Vec::new(),
            auto_add,
        }
    }

    pub fn with_devices(auto_add: bool, devices: Vec<DeviceEntry>) -> Self {
        Self { devices, auto_add }
    }
}

impl DeviceConfigStore for MemoryStore {
    fn devices(&self) -> Vec<DeviceEntry> {
        self.devices.clone()
    }

    fn replace_devices(&mut self, devices: Vec<DeviceEntry>) -> Result<()> {
        self.devices = devices;
        Ok(())
    }

    fn auto_add_devices(&self) -> bool {
        self.auto_add
    }

    fn set_auto_add_devices(&mut self, enabled: bool) -> Result<()> {
        self.auto_add = enabled;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedConfig {
    #[serde(default)]
    devices: Vec<DeviceEntry>,
    #[serde(default = "default_auto_add")]
    auto_add_devices: bool,
}

fn default_auto_add() -> bool {
    true
}

/// JSON-file-backed store. Every mutation rewrites the whole file.
pub struct JsonFileStore {
    path: PathBuf,
    state: PersistedConfig,
}

impl JsonFileStore {
    /// Open an existing config file, or start fresh if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Config(format!("unreadable config {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedConfig {
                devices: Vec::new(),
                auto_add_devices: true,
            },
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Self { path, state })
    }

    fn flush(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.state)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl DeviceConfigStore for JsonFileStore {
    fn devices(&self) -> Vec<DeviceEntry> {
        self.state.devices.clone()
    }

    fn replace_devices(&mut self, devices: Vec<DeviceEntry>) -> Result<()> {
        self.state.devices = devices;
        self.flush()
    }

    fn auto_add_devices(&self) -> bool {
        self.state.auto_add_devices
    }

    fn set_auto_add_devices(&mut self, enabled: bool) -> Result<()> {
        self.state.auto_add_devices = enabled;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, mac: &str) -> DeviceEntry {
        DeviceEntry {
            device_id: id.to_string(),
            device_name: format!("Meter {id}"),
            device_mac: Some(mac.to_string()),
            device_key: None,
        }
    }

    #[test]
    fn update_device_key_writes_only_on_change() {
        let mut store = MemoryStore::with_devices(true, vec![entry("meter_1", "AA:BB:CC:DD:EE:FF")]);
        assert!(store.update_device_key("meter_1", "SN-1").unwrap());
        assert!(!store.update_device_key("meter_1", "SN-1").unwrap());
        assert!(store.update_device_key("meter_1", "SN-2").unwrap());
        assert!(!store.update_device_key("meter_9", "SN-1").unwrap());
        assert_eq!(store.devices()[0].device_key.as_deref(), Some("SN-2"));
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");

        let mut store = JsonFileStore::open(&path).unwrap();
        assert!(store.auto_add_devices());
        store.append_device(entry("meter_1", "AA:BB:CC:DD:EE:FF")).unwrap();
        store.set_auto_add_devices(false).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.devices().len(), 1);
        assert_eq!(reopened.devices()[0].device_id, "meter_1");
        assert!(!reopened.auto_add_devices());
    }

    #[test]
    fn missing_file_starts_empty_with_auto_add_on() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("absent.json")).unwrap();
        assert!(store.devices().is_empty());
        assert!(store.auto_add_devices());
    }

    #[test]
    fn optional_key_is_omitted_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let mut store = JsonFileStore::open(&path).unwrap();
        store.append_device(entry("meter_1", "AA:BB:CC:DD:EE:FF")).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("device_key"));
    }
}
