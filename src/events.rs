use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Host-level events fanned out for UI reactivity and entity wiring.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// Registry state merged for a device; carries the merged fields.
    DeviceUpdate {
        device_id: String,
        fields: Map<String, Value>,
    },
    /// A device was auto-provisioned and persisted.
    DeviceAdded {
        device_id: String,
        device_name: String,
        device_mac: String,
    },
    /// A known device delivered a payload.
    DeviceDataReceived {
        device_id: String,
        device_name: String,
        mac: String,
    },
    /// Data arrived that could not be attributed to a known device.
    DataReceived { mac: Option<String> },
    /// The host entity layer finished materializing a device's entities.
    EntityReady { device_id: String },
}

/// Narrow publish seam handed to the registry and reconciler instead of an
/// ambient event bus.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: BusEvent);
}

/// Broadcast-backed sink; publishing with no subscribers is not an error.
pub struct BroadcastSink {
    tx: broadcast::Sender<BusEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: BusEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sink that discards everything, for tests and headless use.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: BusEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let sink = BroadcastSink::new(4);
        sink.publish(BusEvent::DataReceived { mac: None });
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let sink = BroadcastSink::new(4);
        let mut rx = sink.subscribe();
        sink.publish(BusEvent::EntityReady {
            device_id: "meter_1".into(),
        });
        match rx.recv().await {
            Ok(BusEvent::EntityReady { device_id }) => assert_eq!(device_id, "meter_1"),
            other => panic!("expected EntityReady, got {other:?}"),
        }
    }
}
