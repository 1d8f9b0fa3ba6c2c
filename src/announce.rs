use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::events::{BroadcastSink, BusEvent};
use crate::notify::Notifier;

pub const WELCOME_TIMEOUT: Duration = Duration::from_secs(10);

/// Issues the one-time welcome notification for auto-provisioned devices.
///
/// The host entity layer signals `EntityReady` on the bus once a device's
/// entities exist; we wait for that so the notification can carry a device
/// link. The wait is bounded: on timeout the notification still goes out,
/// just without the link. Pending waits are cancelled on shutdown and must
/// not fire afterward.
pub struct WelcomeAnnouncer {
    notifier: Arc<dyn Notifier>,
    bus: Arc<BroadcastSink>,
    timeout: Duration,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl WelcomeAnnouncer {
    pub fn new(notifier: Arc<dyn Notifier>, bus: Arc<BroadcastSink>) -> Self {
        Self::with_timeout(notifier, bus, WELCOME_TIMEOUT)
    }

    pub fn with_timeout(
        notifier: Arc<dyn Notifier>,
        bus: Arc<BroadcastSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            notifier,
            bus,
            timeout,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Schedule the welcome for one device. Must be called from within a
    /// tokio runtime.
    pub fn schedule(&self, device_id: String, device_name: String, mac: String) {
        let mut events = self.bus.subscribe();
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.timeout;

        let handle = tokio::spawn(async move {
            let wait = async {
                loop {
                    match events.recv().await {
                        Ok(BusEvent::EntityReady { device_id: ready }) if ready == device_id => {
                            break true;
                        }
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break false,
                    }
                }
            };

            let linked = matches!(tokio::time::timeout(timeout, wait).await, Ok(true));
            if linked {
                debug!(device_id = %device_id, "entity record ready, welcoming with link");
            } else {
                info!(
                    device_id = %device_id,
                    "entity record did not appear in time, welcoming without link"
                );
            }
            notifier.device_welcome(&device_id, &device_name, &mac, linked);
        });

        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Cancel every pending wait. Cancelled waits never notify.
    pub fn shutdown(&self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for handle in pending.drain(..) {
            handle.abort();
        }
    }
}
