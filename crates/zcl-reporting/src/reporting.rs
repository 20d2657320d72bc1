//! Attribute report subscriptions

use crate::capability::{Capability, CapabilityValue};
use crate::cluster::AttributeKey;
use crate::decoder::Decoder;
use crate::error::SpecError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// One capability derived from an attribute
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapabilityBinding {
    pub capability: Capability,
    pub decoder: Decoder,
}

/// Subscription descriptor for one (cluster, attribute) pair
///
/// A spec may bind several capabilities to the same attribute (IAS zone
/// status bits). All bindings are decoded from the same raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeReportSpec {
    pub key: AttributeKey,
    pub min_interval: u16,
    pub max_interval: u16,
    pub reportable_change: f64,
    pub bindings: Vec<CapabilityBinding>,
    /// Read the attribute once during attach
    #[serde(default)]
    pub read_on_start: bool,
    /// Poll interval used when reports are not flowing
    #[serde(default, with = "optional_secs")]
    pub poll_interval: Option<Duration>,
}

impl AttributeReportSpec {
    /// Spec with a single capability binding
    #[must_use]
    pub fn new(
        key: AttributeKey,
        min_interval: u16,
        max_interval: u16,
        reportable_change: f64,
        capability: Capability,
        decoder: Decoder,
    ) -> Self {
        Self {
            key,
            min_interval,
            max_interval,
            reportable_change,
            bindings: vec![CapabilityBinding {
                capability,
                decoder,
            }],
            read_on_start: false,
            poll_interval: None,
        }
    }

    /// Add another capability decoded from the same attribute
    #[must_use]
    pub fn with_binding(mut self, capability: Capability, decoder: Decoder) -> Self {
        self.bindings.push(CapabilityBinding {
            capability,
            decoder,
        });
        self
    }

    #[must_use]
    pub fn read_on_start(mut self) -> Self {
        self.read_on_start = true;
        self
    }

    #[must_use]
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Check interval, threshold and type preconditions
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.min_interval > self.max_interval {
            return Err(SpecError::IntervalOrder {
                min: self.min_interval,
                max: self.max_interval,
            });
        }
        if !self.reportable_change.is_finite() || self.reportable_change < 0.0 {
            return Err(SpecError::ReportableChange(self.reportable_change.to_string()));
        }
        if self.poll_interval.is_some_and(|interval| interval.as_secs() == 0) {
            return Err(SpecError::ZeroPollInterval);
        }
        if self.bindings.is_empty() {
            return Err(SpecError::NoBindings);
        }
        let mut seen = HashSet::new();
        for binding in &self.bindings {
            let expected = binding.capability.value_kind();
            let produced = binding.decoder.output_kind();
            if expected != produced {
                return Err(SpecError::TypeMismatch {
                    capability: binding.capability,
                    expected,
                    decoder: produced,
                });
            }
            if !seen.insert(binding.capability) {
                return Err(SpecError::DuplicateBinding(binding.capability));
            }
        }
        Ok(())
    }

    /// Decode every binding from one raw snapshot
    #[must_use]
    pub fn decode(&self, raw: i64) -> Vec<(Capability, CapabilityValue)> {
        self.bindings
            .iter()
            .map(|b| (b.capability, b.decoder.decode(raw)))
            .collect()
    }

    /// Capabilities this spec writes
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.bindings.iter().map(|b| b.capability)
    }
}

/// Raw attribute report delivered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttributeReport {
    pub key: AttributeKey,
    pub raw_value: i64,
}

impl RawAttributeReport {
    #[must_use]
    pub fn new(key: AttributeKey, raw_value: i64) -> Self {
        Self { key, raw_value }
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ias_zone_attrs, power_cfg_attrs, zone_status, Cluster};

    fn battery_spec(min: u16, max: u16) -> AttributeReportSpec {
        AttributeReportSpec::new(
            AttributeKey::new(Cluster::PowerConfig, power_cfg_attrs::BATTERY_PERCENTAGE_REMAINING),
            min,
            max,
            0.0,
            Capability::MeasureBattery,
            Decoder::BatteryHalfPercent,
        )
    }

    #[test]
    fn test_validate_interval_order() {
        assert!(battery_spec(60, 3600).validate().is_ok());
        assert!(battery_spec(60, 60).validate().is_ok());
        assert_eq!(
            battery_spec(300, 60).validate(),
            Err(SpecError::IntervalOrder { min: 300, max: 60 })
        );
    }

    #[test]
    fn test_validate_reportable_change() {
        let mut spec = battery_spec(60, 3600);
        spec.reportable_change = -1.0;
        assert!(matches!(spec.validate(), Err(SpecError::ReportableChange(_))));
        spec.reportable_change = f64::NAN;
        assert!(matches!(spec.validate(), Err(SpecError::ReportableChange(_))));
    }

    #[test]
    fn test_validate_poll_interval() {
        let spec = battery_spec(60, 3600).poll_every(Duration::ZERO);
        assert_eq!(spec.validate(), Err(SpecError::ZeroPollInterval));
        let spec = battery_spec(60, 3600).poll_every(Duration::from_millis(500));
        assert_eq!(spec.validate(), Err(SpecError::ZeroPollInterval));
        let spec = battery_spec(60, 3600).poll_every(Duration::from_secs(1));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_type_mismatch() {
        let spec = battery_spec(60, 3600).with_binding(Capability::AlarmWater, Decoder::Identity);
        assert_eq!(
            spec.validate(),
            Err(SpecError::TypeMismatch {
                capability: Capability::AlarmWater,
                expected: crate::capability::ValueKind::Boolean,
                decoder: crate::capability::ValueKind::Number,
            })
        );
    }

    #[test]
    fn test_decode_snapshot() {
        let spec = AttributeReportSpec::new(
            AttributeKey::new(Cluster::IasZone, ias_zone_attrs::ZONE_STATUS),
            1,
            300,
            0.0,
            Capability::AlarmContact,
            Decoder::Bit {
                mask: zone_status::ALARM1,
            },
        )
        .with_binding(
            Capability::AlarmMotion,
            Decoder::Bit {
                mask: zone_status::ALARM2,
            },
        )
        .with_binding(
            Capability::AlarmTamper,
            Decoder::Bit {
                mask: zone_status::TAMPER,
            },
        );
        assert!(spec.validate().is_ok());

        let values = spec.decode(6);
        assert_eq!(
            values,
            vec![
                (Capability::AlarmContact, CapabilityValue::Boolean(false)),
                (Capability::AlarmMotion, CapabilityValue::Boolean(true)),
                (Capability::AlarmTamper, CapabilityValue::Boolean(true)),
            ]
        );
    }

    #[test]
    fn test_spec_deserialize_with_poll() {
        let json = r#"{
            "key": {"cluster": "powerConfig", "attribute": 33},
            "min_interval": 60,
            "max_interval": 3600,
            "reportable_change": 0,
            "bindings": [{"capability": "measure_battery", "decoder": {"kind": "battery_half_percent"}}],
            "poll_interval": 300
        }"#;
        let spec: AttributeReportSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, battery_spec(60, 3600).poll_every(Duration::from_secs(300)));
    }
}
