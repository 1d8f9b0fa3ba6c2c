use std::sync::{Arc, Mutex, MutexGuard};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::DeviceConfigStore;
use crate::events::EventSink;
use crate::journal::IngestJournal;
use crate::reconcile::{normalize_mac, Reconciler};
use crate::registry::DeviceRegistry;
use crate::sync::{settings_for_device, DesiredSettings, PushGate};
use crate::{Error, Result};

/// Upper bound on request bodies. The firmware sends small flat objects;
/// anything bigger is rejected before parsing.
pub const MAX_JSON_SIZE: usize = 5 * 1024;

/// Everything the boundary mutates, behind one lock so that each request's
/// registry work, and in particular the gate's read-decide-disarm sequence,
/// runs as a single critical section.
pub struct Hub {
    pub registry: DeviceRegistry,
    pub config: Box<dyn DeviceConfigStore>,
    pub desired: DesiredSettings,
    pub gate: PushGate,
    pub journal: Option<IngestJournal>,
}

impl Hub {
    /// Build a hub, restoring persisted devices into the registry. Restored
    /// serials are seeded as synthetic state so settings lookups by key work
    /// before a device's first post of the session.
    pub fn new(config: Box<dyn DeviceConfigStore>, sink: Arc<dyn EventSink>) -> Self {
        let mut registry = DeviceRegistry::new(sink);
        for entry in config.devices() {
            registry.add(
                entry.device_id.clone(),
                entry.device_name.clone(),
                entry.device_mac.clone(),
            );
            if let Some(key) = &entry.device_key {
                registry.restore_state(&entry.device_id, "key", Value::from(key.as_str()));
            }
        }
        Self {
            registry,
            config,
            desired: DesiredSettings::new(),
            gate: PushGate::new(),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: IngestJournal) -> Self {
        self.journal = Some(journal);
        self
    }
}

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Mutex<Hub>>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(hub: Hub, reconciler: Reconciler) -> Self {
        Self {
            hub: Arc::new(Mutex::new(hub)),
            reconciler: Arc::new(reconciler),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/meter", post(ingest).get(probe))
        .route("/api/meter/cfg", post(settings))
        .with_state(state)
}

/// Serve until the listener closes.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> Result<()> {
    axum::serve(listener, router(state)).await.map_err(Error::Io)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"status": "error", "message": message.into()})),
    )
        .into_response()
}

fn lock_hub(state: &AppState) -> std::result::Result<MutexGuard<'_, Hub>, Response> {
    state.hub.lock().map_err(|_| {
        error!("hub state unavailable");
        error_response(StatusCode::SERVICE_UNAVAILABLE, "service not available")
    })
}

/// Decode a request body into JSON, enforcing the boundary contract:
/// bounded size, valid UTF-8, valid JSON.
fn decode_body(body: &Bytes) -> std::result::Result<Value, Response> {
    if body.len() > MAX_JSON_SIZE {
        warn!(size = body.len(), max = MAX_JSON_SIZE, "request body too large");
        return Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request too large: {} bytes (max {MAX_JSON_SIZE})", body.len()),
        ));
    }
    let text = std::str::from_utf8(body).map_err(|e| {
        warn!(error = %e, "request body is not valid UTF-8");
        error_response(StatusCode::BAD_REQUEST, "invalid encoding")
    })?;
    serde_json::from_str(text).map_err(|e| {
        warn!(error = %e, "request body is not valid JSON");
        error_response(StatusCode::BAD_REQUEST, "invalid JSON")
    })
}

async fn ingest(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let mut payload = match decode_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut hub = match lock_hub(&state) {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    let Hub {
        registry,
        config,
        journal,
        ..
    } = &mut *hub;

    match state
        .reconciler
        .ingest(registry, config.as_mut(), &mut payload)
    {
        Ok(outcome) => {
            if let Some(journal) = journal
                && let Some(fields) = payload.as_object()
            {
                journal.log_ingest(outcome.device_id.as_deref(), outcome.mac.as_deref(), fields);
            }
            debug!(
                request_id = %request_id,
                device_id = outcome.device_id.as_deref().unwrap_or("unknown"),
                "ingest handled"
            );
            Json(outcome.to_json()).into_response()
        }
        Err(e) => {
            let status =
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                error!(request_id = %request_id, error = %e, "ingest failed");
            } else {
                warn!(request_id = %request_id, error = %e, "ingest rejected");
            }
            error_response(status, e.to_string())
        }
    }
}

/// Settings poll. The device identifies itself by serial (`key`, preferred)
/// or MAC; the response is always a well-formed JSON object, empty whenever
/// nothing is due to be sent, so minimal firmware never gets stuck.
async fn settings(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let payload = match decode_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(map) = payload.as_object() else {
        return error_response(StatusCode::BAD_REQUEST, "payload must be a JSON object");
    };

    let mac = map.get("mac").and_then(Value::as_str);
    let key = map.get("key").and_then(Value::as_str);
    if mac.is_none() && key.is_none() {
        warn!(request_id = %request_id, "settings poll without MAC or key");
        return error_response(StatusCode::BAD_REQUEST, "MAC address or key required");
    }

    let mut hub = match lock_hub(&state) {
        Ok(guard) => guard,
        Err(resp) => return resp,
    };
    let Hub {
        registry,
        desired,
        gate,
        journal,
        ..
    } = &mut *hub;

    let mut device_id = key.and_then(|k| {
        registry
            .get_by_serial(k)
            .map(|record| record.device_id.clone())
    });
    if device_id.is_none()
        && let Some(raw_mac) = mac
    {
        let Some(normalized) = normalize_mac(raw_mac) else {
            warn!(request_id = %request_id, mac = raw_mac, "malformed MAC in settings poll");
            return error_response(
                StatusCode::BAD_REQUEST,
                Error::InvalidMac(raw_mac.to_string()).to_string(),
            );
        };
        device_id = registry
            .get_by_mac(&normalized)
            .map(|record| record.device_id.clone());
    }

    let Some(device_id) = device_id else {
        debug!(
            request_id = %request_id,
            mac = mac.unwrap_or("unset"),
            key = key.unwrap_or("unset"),
            "settings poll from unknown device"
        );
        return error_response(StatusCode::NOT_FOUND, "device not found");
    };

    let delivered = settings_for_device(registry, desired, gate, &device_id);
    if !delivered.is_empty()
        && let Some(journal) = journal
    {
        journal.log_settings(&device_id, &delivered);
    }
    Json(Value::Object(delivered)).into_response()
}

async fn probe() -> Response {
    Json(json!({
        "status": "ok",
        "message": "POST JSON telemetry to this endpoint",
    }))
    .into_response()
}
