use chrono::{DateTime, Duration, Utc};

use crate::notify::Notifier;
use crate::registry::DeviceRegistry;

/// Advisory raised when a device stops reporting. Not an error: the device
/// keeps running on its last-known configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilenceAdvisory {
    pub device_id: String,
    pub device_name: String,
    pub hours_silent: i64,
}

pub fn default_silence_threshold() -> Duration {
    Duration::hours(24)
}

/// Devices whose last genuine update is older than `threshold`. Devices that
/// never reported are skipped; there is no way to tell a fresh restore from
/// real silence for those.
pub fn silent_devices(
    registry: &DeviceRegistry,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Vec<SilenceAdvisory> {
    let mut advisories = Vec::new();
    for record in registry.devices() {
        let Some(last) = record.last_update_time else {
            continue;
        };
        let silence = now - last;
        if silence > threshold {
            advisories.push(SilenceAdvisory {
                device_id: record.device_id.clone(),
                device_name: record.name.clone(),
                hours_silent: silence.num_hours(),
            });
        }
    }
    advisories
}

/// Periodic health pass: raise advisories for silent devices, clear them for
/// devices that have reported within the threshold.
pub fn run_health_check(registry: &DeviceRegistry, notifier: &dyn Notifier, threshold: Duration) {
    let now = Utc::now();
    let silent = silent_devices(registry, threshold, now);
    for advisory in &silent {
        notifier.device_silent(advisory);
    }
    for record in registry.devices() {
        let is_silent = silent.iter().any(|a| a.device_id == record.device_id);
        if record.last_update_time.is_some() && !is_silent {
            notifier.clear_device_silent(&record.device_id);
        }
    }
}
