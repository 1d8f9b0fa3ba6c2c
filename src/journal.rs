use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::diff::diff_fields;

pub enum JournalMode {
    Full,
    Diffed,
}

/// Append-only NDJSON record of inbound payloads and outbound settings.
/// Diffed mode keeps one snapshot per device and records only what changed.
pub struct IngestJournal {
    mode: JournalMode,
    file: File,
    previous: HashMap<String, Value>,
}

impl IngestJournal {
    pub fn new(mode: JournalMode, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    pub fn log_ingest(
        &mut self,
        device_id: Option<&str>,
        mac: Option<&str>,
        payload: &Map<String, Value>,
    ) {
        let body = Value::Object(payload.clone());

        let diffable = match (&self.mode, device_id) {
            (JournalMode::Diffed, Some(id)) => Some(id),
            _ => None,
        };

        let entry = match diffable {
            Some(id) => match self.previous.get(id) {
                Some(prev) => {
                    let mut changes = Vec::new();
                    diff_fields(prev, &body, "", &mut changes);
                    let change_entries: Vec<Value> = changes
                        .iter()
                        .map(|(path, old, new)| json!({"path": path, "old": old, "new": new}))
                        .collect();
                    self.previous.insert(id.to_string(), body);
                    json!({
                        "ts": Utc::now().to_rfc3339(),
                        "dir": "in",
                        "device_id": device_id,
                        "mac": mac,
                        "changes": change_entries,
                    })
                }
                None => {
                    self.previous.insert(id.to_string(), body.clone());
                    json!({
                        "ts": Utc::now().to_rfc3339(),
                        "dir": "in",
                        "device_id": device_id,
                        "mac": mac,
                        "full": true,
                        "body": body,
                    })
                }
            },
            None => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "in",
                "device_id": device_id,
                "mac": mac,
                "body": body,
            }),
        };

        self.write_line(&entry);
    }

    pub fn log_settings(&mut self, device_id: &str, settings: &Map<String, Value>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "out",
            "device_id": device_id,
            "body": Value::Object(settings.clone()),
        });
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write journal entry: {e}");
        }
    }
}
