use serde_json::{Map, Value};
use tracing::warn;

use crate::{Error, Result};

pub const MAX_RSSI: f64 = 0.0;
pub const MIN_RSSI: f64 = -120.0;
pub const MAX_BATTERY: f64 = 100.0;
pub const MIN_BATTERY: f64 = 0.0;
pub const MAX_VOLTAGE: f64 = 10.0;
pub const MIN_VOLTAGE: f64 = 0.0;

const DANGEROUS_PATTERNS: &[&str] = &[
    "<script",
    "javascript:",
    "onerror=",
    "onclick=",
    "onload=",
    "<iframe",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Number,
    Int,
    Str,
    Bool,
    /// Coercion allowance: firmware revisions disagree on int vs string.
    IntOrStr,
}

impl Expected {
    fn matches(self, value: &Value) -> bool {
        match self {
            Expected::Number => value.is_number(),
            Expected::Int => value.as_i64().is_some() || value.as_u64().is_some(),
            Expected::Str => value.is_string(),
            Expected::Bool => value.is_boolean(),
            Expected::IntOrStr => {
                value.is_string() || value.as_i64().is_some() || value.as_u64().is_some()
            }
        }
    }

    fn name(self) -> &'static str {
        match self {
            Expected::Number => "number",
            Expected::Int => "int",
            Expected::Str => "string",
            Expected::Bool => "bool",
            Expected::IntOrStr => "int | string",
        }
    }
}

const EXPECTED_TYPES: &[(&str, Expected)] = &[
    ("ch0", Expected::Number),
    ("ch1", Expected::Number),
    ("delta0", Expected::Number),
    ("delta1", Expected::Number),
    ("voltage", Expected::Number),
    ("voltage_low", Expected::Bool),
    ("voltage_diff", Expected::Number),
    ("battery", Expected::Number),
    ("rssi", Expected::Int),
    ("timestamp", Expected::Str),
    ("version", Expected::Int),
    ("version_esp", Expected::Str),
    ("mac", Expected::Str),
    ("ip", Expected::Str),
    ("period_min", Expected::Int),
    ("boot", Expected::Int),
    ("resets", Expected::Int),
    ("mode", Expected::Int),
    ("freemem", Expected::Int),
    ("channel", Expected::Int),
    ("wifi_phy_mode", Expected::IntOrStr),
    ("wifi_phy_mode_s", Expected::Str),
    ("router_mac", Expected::Str),
    ("dhcp", Expected::Bool),
    ("email", Expected::Str),
    ("company", Expected::Str),
    ("place", Expected::Str),
    ("esp_id", Expected::Int),
    ("flash_id", Expected::Int),
    ("ntp_errors", Expected::Int),
    ("setup_started", Expected::Int),
    ("setup_finished", Expected::Int),
    ("waketime", Expected::Int),
    ("setuptime", Expected::Int),
    ("period_min_tuned", Expected::Int),
    ("ctype0", Expected::Int),
    ("ctype1", Expected::Int),
    ("cname0", Expected::IntOrStr),
    ("cname1", Expected::IntOrStr),
    ("data_type0", Expected::Int),
    ("data_type1", Expected::Int),
    ("f0", Expected::Number),
    ("f1", Expected::Number),
    ("imp0", Expected::Int),
    ("imp1", Expected::Int),
    ("adc0", Expected::Int),
    ("adc1", Expected::Int),
    ("ch0_start", Expected::Number),
    ("ch1_start", Expected::Number),
    ("serial0", Expected::Str),
    ("serial1", Expected::Str),
    ("mqtt", Expected::Bool),
    ("ha", Expected::Bool),
    ("http", Expected::Bool),
    ("key", Expected::Str),
];

const RANGE_CHECKS: &[(&str, f64, f64)] = &[
    ("rssi", MIN_RSSI, MAX_RSSI),
    ("battery", MIN_BATTERY, MAX_BATTERY),
    ("voltage", MIN_VOLTAGE, MAX_VOLTAGE),
];

fn expected_type(field: &str) -> Option<Expected> {
    EXPECTED_TYPES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, expected)| *expected)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) => {
            if n.as_i64().is_some() || n.as_u64().is_some() {
                "int"
            } else {
                "float"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ASCII lowering keeps byte offsets aligned with the original string.
fn replace_ignore_case(haystack: &str, needle: &str, replacement: &str) -> String {
    let lower = haystack.to_ascii_lowercase();
    let needle_lower = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut cursor = 0;
    while let Some(pos) = lower[cursor..].find(&needle_lower) {
        let start = cursor + pos;
        out.push_str(&haystack[cursor..start]);
        out.push_str(replacement);
        cursor = start + needle.len();
    }
    out.push_str(&haystack[cursor..]);
    out
}

fn sanitize_string_value(value: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let pattern = *DANGEROUS_PATTERNS.iter().find(|p| lower.contains(*p))?;
    warn!(pattern, "dangerous pattern in device data, sanitizing");
    let escaped = value.replace('<', "&lt;").replace('>', "&gt;");
    Some(replace_ignore_case(&escaped, "javascript:", "blocked:"))
}

/// Escape dangerous content in every string field, in place. Runs regardless
/// of whether validation passed so nothing downstream sees raw script tags.
pub fn sanitize_in_place(map: &mut Map<String, Value>) {
    for value in map.values_mut() {
        if let Value::String(s) = value
            && let Some(clean) = sanitize_string_value(s)
        {
            *value = Value::String(clean);
        }
    }
}

/// Validate a device payload, sanitizing it in place.
///
/// Never panics: non-object input yields `(false, [..])`. A missing `mac` is
/// reported but does not stop the remaining checks. `null` values are treated
/// as absent for type and range purposes.
pub fn validate(data: &mut Value) -> (bool, Vec<String>) {
    let mut errors: Vec<String> = Vec::new();

    let Some(map) = data.as_object_mut() else {
        return (false, vec!["payload must be a JSON object".to_string()]);
    };

    sanitize_in_place(map);

    if !map.contains_key("mac") {
        errors.push("missing required field: mac".to_string());
    }

    for (key, value) in map.iter() {
        if value.is_null() {
            continue;
        }
        if let Some(expected) = expected_type(key)
            && !expected.matches(value)
        {
            errors.push(format!(
                "field '{key}' has wrong type: expected {}, got {}",
                expected.name(),
                json_type_name(value)
            ));
        }
    }

    for (field, min, max) in RANGE_CHECKS {
        if let Some(actual) = map.get(*field).and_then(Value::as_f64)
            && (actual < *min || actual > *max)
        {
            errors.push(format!(
                "{field} value out of range: {actual} (expected {min} to {max})"
            ));
        }
    }

    (errors.is_empty(), errors)
}

/// Raising variant of [`validate`]: sanitizes in place, then short-circuits
/// with a typed error on the first failed check.
pub fn validate_strict(data: &mut Value) -> Result<()> {
    let Some(map) = data.as_object_mut() else {
        return Err(Error::InvalidPayload("payload must be a JSON object"));
    };

    sanitize_in_place(map);

    if !map.contains_key("mac") {
        return Err(Error::MissingField("mac"));
    }

    for (key, value) in map.iter() {
        if value.is_null() {
            continue;
        }
        if let Some(expected) = expected_type(key)
            && !expected.matches(value)
        {
            return Err(Error::FieldType {
                field: key.clone(),
                expected: expected.name(),
                got: json_type_name(value),
            });
        }
    }

    for (field, min, max) in RANGE_CHECKS {
        if let Some(actual) = map.get(*field).and_then(Value::as_f64)
            && (actual < *min || actual > *max)
        {
            return Err(Error::OutOfRange {
                field: (*field).to_string(),
                value: actual,
                min: *min,
                max: *max,
            });
        }
    }

    Ok(())
}

/// Normalization pass applied before the registry merge: drops nulls and
/// trims surrounding whitespace off string values.
pub fn clean(data: &Value) -> Map<String, Value> {
    let Some(map) = data.as_object() else {
        return Map::new();
    };

    let mut cleaned = Map::new();
    for (key, value) in map {
        match value {
            Value::Null => continue,
            Value::String(s) => {
                cleaned.insert(key.clone(), Value::String(s.trim().to_string()));
            }
            other => {
                cleaned.insert(key.clone(), other.clone());
            }
        }
    }
    cleaned
}
