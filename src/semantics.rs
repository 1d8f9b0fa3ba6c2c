use crate::protocol::{CounterName, CounterType};

pub const UNIT_CUBIC_METERS: &str = "m³";
pub const UNIT_KILOWATT_HOURS: &str = "kWh";
pub const UNIT_GCAL: &str = "Gcal";

/// Host-side device class a channel reading maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Water,
    Gas,
    Energy,
}

/// Statistics treatment for a channel reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    TotalIncreasing,
    Measurement,
}

/// Display attributes derived from a channel's counter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSemantics {
    pub unit: &'static str,
    pub device_class: Option<DeviceClass>,
    pub icon: &'static str,
}

impl CounterName {
    /// Unit, device class and icon for a channel metering this quantity.
    ///
    /// Gcal is a unit the host statistics engine does not know, so that case
    /// carries no device class and `state_class` returns `None` for it.
    pub fn semantics(self) -> ChannelSemantics {
        match self {
            CounterName::WaterCold => ChannelSemantics {
                unit: UNIT_CUBIC_METERS,
                device_class: Some(DeviceClass::Water),
                icon: "mdi:water",
            },
            CounterName::WaterHot => ChannelSemantics {
                unit: UNIT_CUBIC_METERS,
                device_class: Some(DeviceClass::Water),
                icon: "mdi:water-boiler",
            },
            CounterName::PortableWater => ChannelSemantics {
                unit: UNIT_CUBIC_METERS,
                device_class: Some(DeviceClass::Water),
                icon: "mdi:water-pump",
            },
            CounterName::Gas => ChannelSemantics {
                unit: UNIT_CUBIC_METERS,
                device_class: Some(DeviceClass::Gas),
                icon: "mdi:fire",
            },
            CounterName::Electro => ChannelSemantics {
                unit: UNIT_KILOWATT_HOURS,
                device_class: Some(DeviceClass::Energy),
                icon: "mdi:lightning-bolt",
            },
            CounterName::HeatGcal => ChannelSemantics {
                unit: UNIT_GCAL,
                device_class: None,
                icon: "mdi:radiator",
            },
            CounterName::HeatKwt => ChannelSemantics {
                unit: UNIT_KILOWATT_HOURS,
                device_class: Some(DeviceClass::Energy),
                icon: "mdi:radiator",
            },
            CounterName::Other => ChannelSemantics {
                unit: UNIT_CUBIC_METERS,
                device_class: Some(DeviceClass::Water),
                icon: "mdi:counter",
            },
        }
    }

    /// State class for a cumulative channel reading. `None` for the custom
    /// Gcal unit so the host never attempts statistics conversion on it.
    pub fn state_class(self) -> Option<StateClass> {
        if self.semantics().unit == UNIT_GCAL {
            None
        } else {
            Some(StateClass::TotalIncreasing)
        }
    }

    /// Display label override for a channel metering this quantity.
    ///
    /// `Other` yields `None`: callers must keep whatever name the channel
    /// already has instead of overwriting it with a technical placeholder.
    pub fn display_label(self) -> Option<&'static str> {
        match self {
            CounterName::WaterCold => Some("Cold water"),
            CounterName::WaterHot => Some("Hot water"),
            CounterName::Electro => Some("Electricity"),
            CounterName::Gas => Some("Gas"),
            CounterName::HeatGcal => Some("Heat (Gcal)"),
            CounterName::PortableWater => Some("Potable water"),
            CounterName::Other => None,
            CounterName::HeatKwt => Some("Heat (kWh)"),
        }
    }
}

/// Whether a channel's counter-name, conversion-factor and raw-value surfaces
/// should be visible. Recomputed whenever the counter type changes.
pub fn channel_visible(counter_type: CounterType) -> bool {
    counter_type != CounterType::NotUsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn water_channels_share_volume_semantics() {
        for name in [
            CounterName::WaterCold,
            CounterName::WaterHot,
            CounterName::PortableWater,
        ] {
            let s = name.semantics();
            assert_eq!(s.unit, UNIT_CUBIC_METERS);
            assert_eq!(s.device_class, Some(DeviceClass::Water));
        }
    }

    #[test]
    fn heat_gcal_has_no_device_class_and_no_state_class() {
        let s = CounterName::HeatGcal.semantics();
        assert_eq!(s.unit, UNIT_GCAL);
        assert_eq!(s.device_class, None);
        assert_eq!(CounterName::HeatGcal.state_class(), None);
    }

    #[test]
    fn standard_units_keep_total_increasing() {
        assert_eq!(
            CounterName::WaterCold.state_class(),
            Some(StateClass::TotalIncreasing)
        );
        assert_eq!(
            CounterName::HeatKwt.state_class(),
            Some(StateClass::TotalIncreasing)
        );
    }

    #[test]
    fn energy_channels() {
        assert_eq!(
            CounterName::Electro.semantics().device_class,
            Some(DeviceClass::Energy)
        );
        assert_eq!(CounterName::HeatKwt.semantics().unit, UNIT_KILOWATT_HOURS);
    }

    #[test]
    fn other_is_safe_default_without_label() {
        let s = CounterName::Other.semantics();
        assert_eq!(s.unit, UNIT_CUBIC_METERS);
        assert_eq!(s.device_class, Some(DeviceClass::Water));
        assert_eq!(CounterName::Other.display_label(), None);
        assert_eq!(CounterName::Gas.display_label(), Some("Gas"));
    }

    #[test]
    fn unused_channel_is_hidden() {
        assert!(!channel_visible(CounterType::NotUsed));
        assert!(channel_visible(CounterType::Mechanic));
        assert!(channel_visible(CounterType::Electronic));
    }
}
