use tracing::{info, warn};

use crate::health::SilenceAdvisory;

/// User-facing notification seam. The host decides how these surface
/// (persistent notifications, repair issues); the core only emits them.
pub trait Notifier: Send + Sync {
    /// One-time welcome for a freshly auto-provisioned device. `linked` is
    /// false when the host entity record never materialized in time.
    fn device_welcome(&self, device_id: &str, device_name: &str, mac: &str, linked: bool);

    /// Data arrived from a device nobody knows and auto-add is off.
    fn unrecognized_data(&self, mac: Option<&str>);

    /// A known device has been silent past the advisory threshold.
    fn device_silent(&self, advisory: &SilenceAdvisory);

    /// The device reported again; clear any standing silence advisory.
    fn clear_device_silent(&self, device_id: &str);
}

/// Default notifier that routes everything to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn device_welcome(&self, device_id: &str, device_name: &str, mac: &str, linked: bool) {
        info!(device_id, device_name, mac, linked, "new device provisioned");
    }

    fn unrecognized_data(&self, mac: Option<&str>) {
        warn!(mac = mac.unwrap_or("unknown"), "data received from unrecognized device");
    }

    fn device_silent(&self, advisory: &SilenceAdvisory) {
        warn!(
            device_id = %advisory.device_id,
            device_name = %advisory.device_name,
            hours = advisory.hours_silent,
            "device has not reported for too long"
        );
    }

    fn clear_device_silent(&self, device_id: &str) {
        info!(device_id, "device reporting again, silence advisory cleared");
    }
}
