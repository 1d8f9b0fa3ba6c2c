use serde_json::Value;

/// Physical input kind for a metering channel.
///
/// Wire values come from the device firmware: DISCRETE=0, ELECTRONIC=2,
/// NONE=0xFF. Anything else (legacy NAMUR/HALL codes included) degrades to
/// `NotUsed` instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterType {
    Mechanic,
    Electronic,
    NotUsed,
}

impl CounterType {
    pub const ALL: [CounterType; 3] = [
        CounterType::Mechanic,
        CounterType::Electronic,
        CounterType::NotUsed,
    ];

    pub fn as_wire(self) -> i64 {
        match self {
            CounterType::Mechanic => 0,
            CounterType::Electronic => 2,
            CounterType::NotUsed => 255,
        }
    }

    pub fn from_wire(value: i64) -> Self {
        match value {
            0 => CounterType::Mechanic,
            2 => CounterType::Electronic,
            _ => CounterType::NotUsed,
        }
    }

    /// Total conversion from an untyped JSON value. Never fails.
    pub fn from_value(value: &Value) -> Self {
        match coerce_int(value) {
            Some(v) => CounterType::from_wire(v),
            None => CounterType::NotUsed,
        }
    }

    pub fn as_slug(self) -> &'static str {
        match self {
            CounterType::Mechanic => "mechanic",
            CounterType::Electronic => "electronic",
            CounterType::NotUsed => "not_used",
        }
    }

    pub fn from_slug(slug: &str) -> Self {
        match slug.trim().to_ascii_lowercase().as_str() {
            "mechanic" => CounterType::Mechanic,
            "electronic" => CounterType::Electronic,
            _ => CounterType::NotUsed,
        }
    }
}

/// What the channel is metering (firmware `CounterName`, sequential 0-7).
///
/// `Other` is both a legitimate wire value (6) and the fallback for anything
/// unmapped or unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterName {
    WaterCold,
    WaterHot,
    Electro,
    Gas,
    HeatGcal,
    PortableWater,
    Other,
    HeatKwt,
}

impl CounterName {
    pub const ALL: [CounterName; 8] = [
        CounterName::WaterCold,
        CounterName::WaterHot,
        CounterName::Electro,
        CounterName::Gas,
        CounterName::HeatGcal,
        CounterName::PortableWater,
        CounterName::Other,
        CounterName::HeatKwt,
    ];

    pub fn as_wire(self) -> i64 {
        match self {
            CounterName::WaterCold => 0,
            CounterName::WaterHot => 1,
            CounterName::Electro => 2,
            CounterName::Gas => 3,
            CounterName::HeatGcal => 4,
            CounterName::PortableWater => 5,
            CounterName::Other => 6,
            CounterName::HeatKwt => 7,
        }
    }

    pub fn from_wire(value: i64) -> Self {
        match value {
            0 => CounterName::WaterCold,
            1 => CounterName::WaterHot,
            2 => CounterName::Electro,
            3 => CounterName::Gas,
            4 => CounterName::HeatGcal,
            5 => CounterName::PortableWater,
            7 => CounterName::HeatKwt,
            _ => CounterName::Other,
        }
    }

    /// Total conversion from an untyped JSON value. Some firmware revisions
    /// send the code as a string, so numeric strings are accepted too.
    pub fn from_value(value: &Value) -> Self {
        match coerce_int(value) {
            Some(v) => CounterName::from_wire(v),
            None => CounterName::Other,
        }
    }

    pub fn as_slug(self) -> &'static str {
        match self {
            CounterName::WaterCold => "water_cold",
            CounterName::WaterHot => "water_hot",
            CounterName::Electro => "electro",
            CounterName::Gas => "gas",
            CounterName::HeatGcal => "heat_gcal",
            CounterName::PortableWater => "portable_water",
            CounterName::Other => "other",
            CounterName::HeatKwt => "heat_kwt",
        }
    }

    pub fn from_slug(slug: &str) -> Self {
        match slug.trim().to_ascii_lowercase().as_str() {
            "water_cold" => CounterName::WaterCold,
            "water_hot" => CounterName::WaterHot,
            "electro" => CounterName::Electro,
            "gas" => CounterName::Gas,
            "heat_gcal" => CounterName::HeatGcal,
            "portable_water" => CounterName::PortableWater,
            "heat_kwt" => CounterName::HeatKwt,
            _ => CounterName::Other,
        }
    }
}

/// Multiplier applied to raw impulse counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionFactor {
    X1,
    X10,
    X100,
}

impl ConversionFactor {
    pub const ALL: [ConversionFactor; 3] = [
        ConversionFactor::X1,
        ConversionFactor::X10,
        ConversionFactor::X100,
    ];

    pub fn as_wire(self) -> i64 {
        match self {
            ConversionFactor::X1 => 1,
            ConversionFactor::X10 => 10,
            ConversionFactor::X100 => 100,
        }
    }

    pub fn from_wire(value: i64) -> Self {
        match value {
            10 => ConversionFactor::X10,
            100 => ConversionFactor::X100,
            _ => ConversionFactor::X1,
        }
    }

    pub fn from_value(value: &Value) -> Self {
        match coerce_int(value) {
            Some(v) => ConversionFactor::from_wire(v),
            None => ConversionFactor::X1,
        }
    }

    pub fn as_option(self) -> &'static str {
        match self {
            ConversionFactor::X1 => "1",
            ConversionFactor::X10 => "10",
            ConversionFactor::X100 => "100",
        }
    }
}

/// Integer coercion matching how the firmware encodes enum codes: a JSON
/// number, or a string holding a number.
pub(crate) fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
