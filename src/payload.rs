use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde_json::{Map, Value};

use crate::protocol::{coerce_f64, coerce_int, ConversionFactor, CounterName, CounterType};

/// A validated, sanitized device payload with named fields.
///
/// The raw wire format is an untyped JSON map; after the validator has run,
/// this record gives downstream code typed access while `fields` keeps the
/// cleaned map for the field-wise registry merge.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub mac: Option<String>,
    pub key: Option<String>,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub ch0: Option<f64>,
    pub ch1: Option<f64>,
    pub delta0: Option<f64>,
    pub delta1: Option<f64>,
    pub voltage: Option<f64>,
    pub battery: Option<f64>,
    pub rssi: Option<i64>,
    pub ctype0: Option<CounterType>,
    pub ctype1: Option<CounterType>,
    pub cname0: Option<CounterName>,
    pub cname1: Option<CounterName>,
    pub f0: Option<ConversionFactor>,
    pub f1: Option<ConversionFactor>,
    pub period_min: Option<i64>,
    pub version: Option<i64>,
    pub version_esp: Option<String>,
    pub ip: Option<String>,
    pub fields: Map<String, Value>,
}

impl Telemetry {
    pub fn from_sanitized(fields: &Map<String, Value>) -> Self {
        let str_field = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .map(|s| s.to_string())
        };
        let num_field = |key: &str| fields.get(key).and_then(coerce_f64);
        let int_field = |key: &str| fields.get(key).and_then(coerce_int);

        Self {
            mac: str_field("mac"),
            key: str_field("key"),
            timestamp: fields
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(parse_device_timestamp),
            ch0: num_field("ch0"),
            ch1: num_field("ch1"),
            delta0: num_field("delta0"),
            delta1: num_field("delta1"),
            voltage: num_field("voltage"),
            battery: num_field("battery"),
            rssi: int_field("rssi"),
            ctype0: fields.get("ctype0").map(CounterType::from_value),
            ctype1: fields.get("ctype1").map(CounterType::from_value),
            cname0: fields.get("cname0").map(CounterName::from_value),
            cname1: fields.get("cname1").map(CounterName::from_value),
            f0: fields.get("f0").map(ConversionFactor::from_value),
            f1: fields.get("f1").map(ConversionFactor::from_value),
            period_min: int_field("period_min"),
            version: int_field("version"),
            version_esp: str_field("version_esp"),
            ip: str_field("ip"),
            fields: fields.clone(),
        }
    }

    /// Whether this payload marks a genuine device-originated update.
    pub fn marks_live_update(&self) -> bool {
        self.fields.contains_key("timestamp")
    }

    /// Combined firmware version string, when the device reported one.
    pub fn software_version(&self) -> Option<String> {
        match (&self.version_esp, self.version) {
            (Some(esp), Some(v)) => Some(format!("{esp}.{v}")),
            (Some(esp), None) => Some(esp.clone()),
            (None, Some(v)) => Some(v.to_string()),
            (None, None) => None,
        }
    }
}

/// Parse the device clock field. Firmware emits several shapes: RFC 3339,
/// `+0000` offsets without the colon, trailing `Z`, or no offset at all.
fn parse_device_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    let mut value = trimmed.to_string();

    if let Some(stripped) = value.strip_suffix('Z') {
        value = format!("{stripped}+00:00");
    }
    let bytes = value.as_bytes();
    if value.len() == 24
        && matches!(bytes[19], b'+' | b'-')
        && value[20..].bytes().all(|b| b.is_ascii_digit())
    {
        value = format!("{}:{}", &value[..22], &value[22..]);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&value) {
        return Some(parsed);
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::clean;
    use serde_json::json;

    #[test]
    fn typed_fields_extracted() {
        let payload = json!({
            "mac": "AABBCCDDEEFF",
            "key": "SN-1",
            "ch0": 12.3,
            "battery": 90,
            "rssi": -60,
            "ctype0": 2,
            "cname0": "3",
            "f0": 10,
            "period_min": 1440,
            "timestamp": "2024-01-01T00:00:00",
        });
        let t = Telemetry::from_sanitized(&clean(&payload));
        assert_eq!(t.mac.as_deref(), Some("AABBCCDDEEFF"));
        assert_eq!(t.key.as_deref(), Some("SN-1"));
        assert_eq!(t.ch0, Some(12.3));
        assert_eq!(t.battery, Some(90.0));
        assert_eq!(t.rssi, Some(-60));
        assert_eq!(t.ctype0, Some(CounterType::Electronic));
        assert_eq!(t.cname0, Some(CounterName::Gas));
        assert_eq!(t.f0, Some(ConversionFactor::X10));
        assert_eq!(t.period_min, Some(1440));
        assert!(t.marks_live_update());
        assert!(t.timestamp.is_some());
    }

    #[test]
    fn absent_fields_stay_none() {
        let t = Telemetry::from_sanitized(&clean(&json!({"mac": "AABBCCDDEEFF"})));
        assert!(t.ch0.is_none());
        assert!(t.ctype0.is_none());
        assert!(!t.marks_live_update());
    }

    #[test]
    fn timestamp_shapes_parse() {
        for raw in [
            "2025-11-28T19:09:36+0000",
            "2025-11-28T19:09:36+00:00",
            "2025-11-28T19:09:36Z",
            "2025-11-28T19:09:36",
        ] {
            let parsed = parse_device_timestamp(raw);
            assert!(parsed.is_some(), "failed on {raw}");
        }
        assert!(parse_device_timestamp("yesterday-ish").is_none());
    }

    #[test]
    fn software_version_combines_both_parts() {
        let t = Telemetry::from_sanitized(&clean(&json!({
            "mac": "AABBCCDDEEFF",
            "version_esp": "1.1.3",
            "version": 33,
        })));
        assert_eq!(t.software_version().as_deref(), Some("1.1.3.33"));

        let t = Telemetry::from_sanitized(&clean(&json!({"mac": "AABBCCDDEEFF", "version": 33})));
        assert_eq!(t.software_version().as_deref(), Some("33"));

        let t = Telemetry::from_sanitized(&clean(&json!({"mac": "AABBCCDDEEFF"})));
        assert_eq!(t.software_version(), None);
    }
}
