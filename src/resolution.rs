use serde_json::Value;

use crate::registry::DeviceRecord;

/// Where a materialized channel option came from.
///
/// Precedence, highest first: `LiveDeviceData` (the device has genuinely
/// reported, `last_update_time` is set), `RestoredUserChoice` (a value the
/// host restored from a previous session), `DefaultFallback` (state present
/// from a first contact not yet confirmed live, or a seeded default),
/// `NoData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueOrigin {
    NoData,
    DefaultFallback,
    RestoredUserChoice,
    LiveDeviceData,
}

/// Resolve one field of a device's state against a restored user choice.
///
/// Returns the chosen value and its origin; `default` is only used when
/// nothing else is available (origin `NoData`).
pub fn resolve_option(
    record: Option<&DeviceRecord>,
    field: &str,
    restored: Option<&Value>,
    default: Value,
) -> (Value, ValueOrigin) {
    let reported = record.and_then(|r| r.current_state.get(field));
    let live = record.is_some_and(|r| r.last_update_time.is_some());

    if let Some(value) = reported
        && live
    {
        return (value.clone(), ValueOrigin::LiveDeviceData);
    }
    if let Some(value) = restored {
        return (value.clone(), ValueOrigin::RestoredUserChoice);
    }
    if let Some(value) = reported {
        return (value.clone(), ValueOrigin::DefaultFallback);
    }
    (default, ValueOrigin::NoData)
}
