use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::protocol::coerce_int;
use crate::registry::DeviceRegistry;

/// Parameters tracked by the settings synchronizer.
///
/// The telemetry key is what the device reports the value under; the
/// settings key is what the firmware expects back in a settings payload.
/// They differ for the factors and the wakeup period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncParam {
    CounterType0,
    CounterType1,
    CounterName0,
    CounterName1,
    Factor0,
    Factor1,
    PeriodMin,
}

impl SyncParam {
    pub const ALL: [SyncParam; 7] = [
        SyncParam::CounterType0,
        SyncParam::CounterType1,
        SyncParam::CounterName0,
        SyncParam::CounterName1,
        SyncParam::Factor0,
        SyncParam::Factor1,
        SyncParam::PeriodMin,
    ];

    pub fn telemetry_key(self) -> &'static str {
        match self {
            SyncParam::CounterType0 => "ctype0",
            SyncParam::CounterType1 => "ctype1",
            SyncParam::CounterName0 => "cname0",
            SyncParam::CounterName1 => "cname1",
            SyncParam::Factor0 => "f0",
            SyncParam::Factor1 => "f1",
            SyncParam::PeriodMin => "period_min",
        }
    }

    pub fn settings_key(self) -> &'static str {
        match self {
            SyncParam::CounterType0 => "ctype0",
            SyncParam::CounterType1 => "ctype1",
            SyncParam::CounterName0 => "cname0",
            SyncParam::CounterName1 => "cname1",
            SyncParam::Factor0 => "factor0",
            SyncParam::Factor1 => "factor1",
            SyncParam::PeriodMin => "wakeup_per_min",
        }
    }
}

/// Read side of the user's staged configuration. Inbound device payloads
/// never write here; only user-facing control paths do.
pub trait DesiredStore: Send {
    /// Desired value for one parameter, or `None` when the source is
    /// unavailable (control missing, never set, restored without value).
    fn desired(&self, device_id: &str, param: SyncParam) -> Option<i64>;
}

/// In-memory desired-value store backing the per-device controls.
#[derive(Debug, Default)]
pub struct DesiredSettings {
    values: HashMap<String, HashMap<SyncParam, i64>>,
}

impl DesiredSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, device_id: &str, param: SyncParam, value: i64) {
        self.values
            .entry(device_id.to_string())
            .or_default()
            .insert(param, value);
    }

    pub fn clear(&mut self, device_id: &str, param: SyncParam) {
        if let Some(per_device) = self.values.get_mut(device_id) {
            per_device.remove(&param);
        }
    }

    pub fn remove_device(&mut self, device_id: &str) {
        self.values.remove(device_id);
    }
}

impl DesiredStore for DesiredSettings {
    fn desired(&self, device_id: &str, param: SyncParam) -> Option<i64> {
        self.values.get(device_id)?.get(&param).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Synchronized,
    NotSynchronized,
    Unknown,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Synchronized => "synchronized",
            SyncStatus::NotSynchronized => "not_synchronized",
            SyncStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDifference {
    pub param: SyncParam,
    pub desired: i64,
    pub current: i64,
}

/// Result of one desired-vs-current comparison pass. Ephemeral, recomputed
/// on demand, never persisted.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub differences: Vec<ParamDifference>,
    pub checked: usize,
}

/// Build the outbound settings payload for a device from the desired store.
///
/// Parameters without a resolvable desired value are skipped. Returns `None`
/// when nothing at all resolves: a recoverable "no settings available", not
/// an error.
pub fn build_settings(
    registry: &DeviceRegistry,
    desired: &dyn DesiredStore,
    device_id: &str,
) -> Option<Map<String, Value>> {
    let Some(record) = registry.get(device_id) else {
        warn!(device_id, "device not found while building settings");
        return None;
    };

    let mut settings = Map::new();
    for param in SyncParam::ALL {
        match desired.desired(device_id, param) {
            Some(value) => {
                settings.insert(param.settings_key().to_string(), Value::from(value));
            }
            None => {
                debug!(device_id, param = param.settings_key(), "no desired value, skipping");
            }
        }
    }

    if settings.is_empty() {
        warn!(device_id, "no desired values resolvable, nothing to send");
        return None;
    }

    if let Some(key) = record.current_state.get("key").and_then(Value::as_str) {
        settings.insert("key".to_string(), Value::from(key));
    }

    Some(settings)
}

/// Compare desired configuration against what the device last reported.
///
/// A parameter counts as checked only when both sides resolve; with zero
/// checked parameters the status is `Unknown`.
pub fn sync_status(
    registry: &DeviceRegistry,
    desired: &dyn DesiredStore,
    device_id: &str,
) -> SyncReport {
    let mut differences = Vec::new();
    let mut checked = 0;

    let Some(record) = registry.get(device_id) else {
        return SyncReport {
            status: SyncStatus::Unknown,
            differences,
            checked,
        };
    };

    for param in SyncParam::ALL {
        let Some(current) = record
            .current_state
            .get(param.telemetry_key())
            .and_then(coerce_int)
        else {
            continue;
        };
        let Some(want) = desired.desired(device_id, param) else {
            continue;
        };
        checked += 1;
        if want != current {
            debug!(
                device_id,
                param = param.telemetry_key(),
                desired = want,
                current,
                "configuration difference"
            );
            differences.push(ParamDifference {
                param,
                desired: want,
                current,
            });
        }
    }

    let status = if checked == 0 {
        SyncStatus::Unknown
    } else if differences.is_empty() {
        SyncStatus::Synchronized
    } else {
        info!(
            device_id,
            mismatches = differences.len(),
            checked,
            "device configuration not synchronized"
        );
        SyncStatus::NotSynchronized
    };

    SyncReport {
        status,
        differences,
        checked,
    }
}

/// One-shot per-device transmission gate, default off.
///
/// While disarmed, settings polls get an empty payload and the device keeps
/// its current configuration. Arming allows exactly one delivery.
#[derive(Debug, Default)]
pub struct PushGate {
    armed: HashSet<String>,
}

impl PushGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, device_id: &str) {
        info!(device_id, "settings push armed");
        self.armed.insert(device_id.to_string());
    }

    pub fn disarm(&mut self, device_id: &str) {
        self.armed.remove(device_id);
    }

    pub fn is_armed(&self, device_id: &str) -> bool {
        self.armed.contains(device_id)
    }
}

/// Answer a device's settings poll.
///
/// The read-armed / build / disarm sequence is one synchronous critical
/// section: the caller holds the hub lock for the whole call and nothing in
/// here suspends, so two concurrent polls cannot both see the armed state.
/// Disarm happens only after a non-empty payload was actually produced; an
/// armed gate with nothing to send stays armed.
pub fn settings_for_device(
    registry: &DeviceRegistry,
    desired: &dyn DesiredStore,
    gate: &mut PushGate,
    device_id: &str,
) -> Map<String, Value> {
    if !gate.is_armed(device_id) {
        debug!(device_id, "settings push disarmed, returning empty payload");
        return Map::new();
    }

    match build_settings(registry, desired, device_id) {
        Some(settings) => {
            gate.disarm(device_id);
            info!(device_id, "settings delivered, push gate auto-disarmed");
            settings
        }
        None => {
            debug!(device_id, "armed but nothing to send yet, gate stays armed");
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use serde_json::json;
    use std::sync::Arc;

    fn registry_with_state(pairs: &[(&str, Value)]) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new(Arc::new(NullSink));
        registry.add("meter_1", "Meter #0001", None);
        let fields: Map<String, Value> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        if !fields.is_empty() {
            registry.update_state("meter_1", &fields);
        }
        registry
    }

    #[test]
    fn build_skips_unresolvable_and_appends_key() {
        let registry = registry_with_state(&[("key", json!("SN-1"))]);
        let mut desired = DesiredSettings::new();
        desired.set("meter_1", SyncParam::CounterType0, 2);
        desired.set("meter_1", SyncParam::PeriodMin, 720);

        let settings = build_settings(&registry, &desired, "meter_1").unwrap();
        assert_eq!(settings.get("ctype0").unwrap(), 2);
        assert_eq!(settings.get("wakeup_per_min").unwrap(), 720);
        assert_eq!(settings.get("key").unwrap(), "SN-1");
        assert!(!settings.contains_key("factor0"));
    }

    #[test]
    fn build_with_nothing_resolvable_is_none() {
        let registry = registry_with_state(&[]);
        let desired = DesiredSettings::new();
        assert!(build_settings(&registry, &desired, "meter_1").is_none());
        assert!(build_settings(&registry, &desired, "meter_9").is_none());
    }

    #[test]
    fn diff_unknown_when_nothing_checked() {
        let registry = registry_with_state(&[("ch0", json!(1.0))]);
        let desired = DesiredSettings::new();
        let report = sync_status(&registry, &desired, "meter_1");
        assert_eq!(report.status, SyncStatus::Unknown);
        assert_eq!(report.checked, 0);
        assert!(report.differences.is_empty());
    }

    #[test]
    fn diff_reports_exact_mismatch() {
        let registry = registry_with_state(&[("ctype0", json!(255)), ("f0", json!(1))]);
        let mut desired = DesiredSettings::new();
        desired.set("meter_1", SyncParam::CounterType0, 2);
        desired.set("meter_1", SyncParam::Factor0, 1);

        let report = sync_status(&registry, &desired, "meter_1");
        assert_eq!(report.status, SyncStatus::NotSynchronized);
        assert_eq!(report.checked, 2);
        assert_eq!(
            report.differences,
            vec![ParamDifference {
                param: SyncParam::CounterType0,
                desired: 2,
                current: 255,
            }]
        );
    }

    #[test]
    fn diff_synchronized_when_all_match() {
        let registry =
            registry_with_state(&[("ctype0", json!(2)), ("period_min", json!("1440"))]);
        let mut desired = DesiredSettings::new();
        desired.set("meter_1", SyncParam::CounterType0, 2);
        desired.set("meter_1", SyncParam::PeriodMin, 1440);

        let report = sync_status(&registry, &desired, "meter_1");
        assert_eq!(report.status, SyncStatus::Synchronized);
        assert_eq!(report.checked, 2);
    }

    #[test]
    fn diff_skips_param_with_device_value_but_no_desired_source() {
        let registry = registry_with_state(&[("ctype0", json!(2)), ("ctype1", json!(255))]);
        let mut desired = DesiredSettings::new();
        desired.set("meter_1", SyncParam::CounterType0, 2);

        let report = sync_status(&registry, &desired, "meter_1");
        assert_eq!(report.status, SyncStatus::Synchronized);
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn gate_delivers_exactly_once() {
        let registry = registry_with_state(&[]);
        let mut desired = DesiredSettings::new();
        desired.set("meter_1", SyncParam::CounterType0, 2);
        let mut gate = PushGate::new();

        // disarmed: empty
        let first = settings_for_device(&registry, &desired, &mut gate, "meter_1");
        assert!(first.is_empty());

        gate.arm("meter_1");
        let second = settings_for_device(&registry, &desired, &mut gate, "meter_1");
        assert_eq!(second.get("ctype0").unwrap(), 2);
        assert!(!gate.is_armed("meter_1"));

        let third = settings_for_device(&registry, &desired, &mut gate, "meter_1");
        assert!(third.is_empty());
    }

    #[test]
    fn gate_stays_armed_when_nothing_to_send() {
        let registry = registry_with_state(&[]);
        let desired = DesiredSettings::new();
        let mut gate = PushGate::new();
        gate.arm("meter_1");

        let payload = settings_for_device(&registry, &desired, &mut gate, "meter_1");
        assert!(payload.is_empty());
        assert!(gate.is_armed("meter_1"));
    }

    #[test]
    fn gate_is_per_device() {
        let mut gate = PushGate::new();
        gate.arm("meter_1");
        assert!(gate.is_armed("meter_1"));
        assert!(!gate.is_armed("meter_2"));
        gate.disarm("meter_1");
        assert!(!gate.is_armed("meter_1"));
    }
}
