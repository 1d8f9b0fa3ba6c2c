use std::sync::Arc;

use meterhub::{
    AppState, BroadcastSink, EventSink, Hub, LogNotifier, MemoryStore, Reconciler, MAX_JSON_SIZE,
};
use serde_json::{json, Value};

async fn spawn_hub(auto_add: bool) -> (String, AppState) {
    let bus = Arc::new(BroadcastSink::new(16));
    let sink: Arc<dyn EventSink> = bus.clone();
    let hub = Hub::new(Box::new(MemoryStore::new(auto_add)), sink.clone());
    let reconciler = Reconciler::new(Arc::new(LogNotifier), sink);
    let state = AppState::new(hub, reconciler);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(meterhub::serve(listener, state.clone()));
    (format!("http://{addr}"), state)
}

#[tokio::test]
async fn auto_provision_end_to_end() {
    let (base, state) = spawn_hub(true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/meter"))
        .json(&json!({
            "mac": "AABBCCDDEEFF",
            "ch0": 12.3,
            "battery": 90,
            "timestamp": "2024-01-01T00:00:00",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["device_id"], "meter_aabbccddeeff");
    assert_eq!(body["device_name"], "Meter #EEFF");
    assert_eq!(body["mac"], "AA:BB:CC:DD:EE:FF");

    let hub = state.hub.lock().unwrap();
    let record = hub.registry.get("meter_aabbccddeeff").expect("device should exist");
    assert_eq!(record.current_state.get("ch0").unwrap(), 12.3);
    assert!(record.last_update_time.is_some());
    assert_eq!(hub.config.devices().len(), 1);
}

#[tokio::test]
async fn same_mac_twice_creates_one_device() {
    let (base, state) = spawn_hub(true).await;
    let client = reqwest::Client::new();

    for reading in [1.0, 2.5] {
        let resp = client
            .post(format!("{base}/api/meter"))
            .json(&json!({"mac": "aa:bb:cc:dd:ee:ff", "ch0": reading}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let hub = state.hub.lock().unwrap();
    assert_eq!(hub.registry.len(), 1);
    assert_eq!(
        hub.registry
            .get("meter_aabbccddeeff")
            .unwrap()
            .current_state
            .get("ch0")
            .unwrap(),
        2.5
    );
    assert_eq!(hub.config.devices().len(), 1);
}

#[tokio::test]
async fn oversized_body_rejected_413() {
    let (base, _state) = spawn_hub(true).await;

    let padding = "x".repeat(MAX_JSON_SIZE);
    let body = format!("{{\"mac\":\"AABBCCDDEEFF\",\"place\":\"{padding}\"}}");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/meter"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn invalid_json_rejected_400() {
    let (base, _state) = spawn_hub(true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/meter"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn invalid_utf8_rejected_400() {
    let (base, _state) = spawn_hub(true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/meter"))
        .header("content-type", "application/json")
        .body(vec![0xff, 0xfe, 0x80, 0x81])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("encoding"));
}

#[tokio::test]
async fn malformed_mac_rejected_400_without_mutation() {
    let (base, state) = spawn_hub(true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/meter"))
        .json(&json!({"mac": "definitely-not-a-mac", "ch0": 1.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let hub = state.hub.lock().unwrap();
    assert!(hub.registry.is_empty());
    assert!(hub.config.devices().is_empty());
}

#[tokio::test]
async fn auto_add_disabled_drops_unknown_device() {
    let (base, state) = spawn_hub(false).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/meter"))
        .json(&json!({"mac": "AABBCCDDEEFF", "ch0": 1.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["device_id"], Value::Null);

    let hub = state.hub.lock().unwrap();
    assert!(hub.registry.is_empty());
}

#[tokio::test]
async fn invalid_fields_logged_but_ingested() {
    let (base, state) = spawn_hub(true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/meter"))
        .json(&json!({"mac": "AABBCCDDEEFF", "rssi": 5, "battery": 90}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let hub = state.hub.lock().unwrap();
    let state_map = &hub.registry.get("meter_aabbccddeeff").unwrap().current_state;
    assert_eq!(state_map.get("rssi").unwrap(), 5);
    assert_eq!(state_map.get("battery").unwrap(), 90);
}

#[tokio::test]
async fn dangerous_strings_arrive_sanitized() {
    let (base, state) = spawn_hub(true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/meter"))
        .json(&json!({"mac": "AABBCCDDEEFF", "version_esp": "<script>x</script>"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let hub = state.hub.lock().unwrap();
    let stored = hub
        .registry
        .get("meter_aabbccddeeff")
        .unwrap()
        .current_state
        .get("version_esp")
        .unwrap()
        .as_str()
        .unwrap();
    assert!(stored.contains("&lt;script&gt;"));
    assert!(!stored.contains("<script>"));
}

#[tokio::test]
async fn reported_serial_is_persisted() {
    let (base, state) = spawn_hub(true).await;

    reqwest::Client::new()
        .post(format!("{base}/api/meter"))
        .json(&json!({"mac": "AABBCCDDEEFF", "key": "SN-0042"}))
        .send()
        .await
        .unwrap();

    let hub = state.hub.lock().unwrap();
    assert_eq!(hub.config.devices()[0].device_key.as_deref(), Some("SN-0042"));
}

#[tokio::test]
async fn get_probe_answers_ok() {
    let (base, _state) = spawn_hub(true).await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/api/meter"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
