//! Host-facing capabilities and their value types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value type a capability accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Boolean,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Number => f.write_str("number"),
            ValueKind::Boolean => f.write_str("boolean"),
        }
    }
}

/// Capabilities exposed by the supported devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    #[serde(rename = "onoff")]
    OnOff,
    MeasureBattery,
    MeasureTemperature,
    MeasurePower,
    MeterPower,
    MeasureCurrent,
    MeasureVoltage,
    AlarmGeneric,
    AlarmWater,
    AlarmContact,
    AlarmMotion,
    AlarmTamper,
}

impl Capability {
    /// Host capability name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Capability::OnOff => "onoff",
            Capability::MeasureBattery => "measure_battery",
            Capability::MeasureTemperature => "measure_temperature",
            Capability::MeasurePower => "measure_power",
            Capability::MeterPower => "meter_power",
            Capability::MeasureCurrent => "measure_current",
            Capability::MeasureVoltage => "measure_voltage",
            Capability::AlarmGeneric => "alarm_generic",
            Capability::AlarmWater => "alarm_water",
            Capability::AlarmContact => "alarm_contact",
            Capability::AlarmMotion => "alarm_motion",
            Capability::AlarmTamper => "alarm_tamper",
        }
    }

    /// Declared value type
    #[must_use]
    pub fn value_kind(self) -> ValueKind {
        match self {
            Capability::OnOff
            | Capability::AlarmGeneric
            | Capability::AlarmWater
            | Capability::AlarmContact
            | Capability::AlarmMotion
            | Capability::AlarmTamper => ValueKind::Boolean,
            Capability::MeasureBattery
            | Capability::MeasureTemperature
            | Capability::MeasurePower
            | Capability::MeterPower
            | Capability::MeasureCurrent
            | Capability::MeasureVoltage => ValueKind::Number,
        }
    }

    /// Whether the host may set this capability
    #[must_use]
    pub fn is_settable(self) -> bool {
        matches!(self, Capability::OnOff)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded capability value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Boolean(bool),
    Number(f64),
}

impl CapabilityValue {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            CapabilityValue::Boolean(_) => ValueKind::Boolean,
            CapabilityValue::Number(_) => ValueKind::Number,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CapabilityValue::Boolean(b) => Some(*b),
            CapabilityValue::Number(_) => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CapabilityValue::Number(n) => Some(*n),
            CapabilityValue::Boolean(_) => None,
        }
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityValue::Boolean(b) => write!(f, "{b}"),
            CapabilityValue::Number(n) => write!(f, "{n}"),
        }
    }
}
