//! Declarative device profiles
//!
//! A profile is everything a session needs to know about one hardware
//! model: which attributes to subscribe to, how to decode them, which
//! metadata to read and which clusters to bind.

use crate::capability::Capability;
use crate::cluster::{
    basic_attrs, electrical_attrs, ias_zone_attrs, metering_attrs, on_off_attrs,
    power_cfg_attrs, temperature_attrs, zone_status, AttributeKey, Cluster,
};
use crate::config::Calibration;
use crate::decoder::Decoder;
use crate::error::SpecError;
use crate::reporting::AttributeReportSpec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Samjin button
pub const MODEL_SAMJIN_BUTTON: &str = "im6001-btp02";
/// Samjin water leak sensor
pub const MODEL_SAMJIN_WATER: &str = "im6001-wlp01";
/// Samjin multi sensor (contact, motion, tamper)
pub const MODEL_SAMJIN_MULTI: &str = "im6001-mpp01";
/// CentraLite smart outlet
pub const MODEL_CENTRALITE_OUTLET: &str = "3200-Sgb";

/// Basic cluster attributes read once during attach
pub const METADATA_ATTRIBUTES: [u16; 6] = [
    basic_attrs::MANUFACTURER_NAME,
    basic_attrs::MODEL_IDENTIFIER,
    basic_attrs::ZCL_VERSION,
    basic_attrs::APPLICATION_VERSION,
    basic_attrs::POWER_SOURCE,
    basic_attrs::SW_BUILD_ID,
];

/// Reporting setup for one hardware model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub model_id: String,
    pub name: String,
    pub reports: Vec<AttributeReportSpec>,
    #[serde(default)]
    pub metadata_attributes: Vec<u16>,
    #[serde(default)]
    pub binds: Vec<Cluster>,
}

impl DeviceProfile {
    /// Built-in profile for a model identifier
    #[must_use]
    pub fn for_model(model_id: &str, calibration: Calibration) -> Option<Self> {
        match model_id {
            MODEL_SAMJIN_BUTTON => Some(Self::samjin_button()),
            MODEL_SAMJIN_WATER => Some(Self::samjin_water_leak()),
            MODEL_SAMJIN_MULTI => Some(Self::samjin_multi_sensor()),
            MODEL_CENTRALITE_OUTLET => Some(Self::centralite_outlet(calibration)),
            _ => None,
        }
    }

    /// Every capability the profile writes with the first attribute feeding
    /// it, in first-seen order
    #[must_use]
    pub fn capability_sources(&self) -> Vec<(AttributeKey, Capability)> {
        let mut sources: Vec<(AttributeKey, Capability)> = Vec::new();
        for spec in &self.reports {
            for capability in spec.capabilities() {
                if !sources.iter().any(|(_, c)| *c == capability) {
                    sources.push((spec.key, capability));
                }
            }
        }
        sources
    }

    /// Every capability the profile writes, in first-seen order
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        self.capability_sources()
            .into_iter()
            .map(|(_, capability)| capability)
            .collect()
    }

    /// Attribute that feeds `capability`
    #[must_use]
    pub fn source_of(&self, capability: Capability) -> Option<AttributeKey> {
        self.reports
            .iter()
            .find(|spec| spec.capabilities().any(|c| c == capability))
            .map(|spec| spec.key)
    }

    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.source_of(capability).is_some()
    }

    /// Check every report spec
    pub fn validate(&self) -> Result<(), (AttributeKey, SpecError)> {
        for spec in &self.reports {
            spec.validate().map_err(|e| (spec.key, e))?;
        }
        Ok(())
    }

    pub fn samjin_button() -> Self {
        Self {
            model_id: MODEL_SAMJIN_BUTTON.to_string(),
            name: "Samjin Button".to_string(),
            reports: vec![
                battery(3600),
                temperature(50.0),
                AttributeReportSpec::new(
                    zone_status_key(),
                    1,
                    300,
                    0.0,
                    Capability::AlarmGeneric,
                    Decoder::Bit {
                        mask: zone_status::ALARM1,
                    },
                ),
            ],
            metadata_attributes: METADATA_ATTRIBUTES.to_vec(),
            binds: Vec::new(),
        }
    }

    pub fn samjin_water_leak() -> Self {
        Self {
            model_id: MODEL_SAMJIN_WATER.to_string(),
            name: "Samjin Water Leak Sensor".to_string(),
            reports: vec![
                battery(3600),
                temperature(50.0),
                AttributeReportSpec::new(
                    zone_status_key(),
                    1,
                    300,
                    0.0,
                    Capability::AlarmWater,
                    Decoder::Bit {
                        mask: zone_status::ALARM1,
                    },
                ),
            ],
            metadata_attributes: METADATA_ATTRIBUTES.to_vec(),
            binds: vec![Cluster::Identify, Cluster::Ota],
        }
    }

    pub fn samjin_multi_sensor() -> Self {
        Self {
            model_id: MODEL_SAMJIN_MULTI.to_string(),
            name: "Samjin Multi Sensor".to_string(),
            reports: vec![
                battery(65534),
                temperature(0.0),
                AttributeReportSpec::new(
                    zone_status_key(),
                    1,
                    65534,
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
                ),
            ],
            metadata_attributes: METADATA_ATTRIBUTES.to_vec(),
            binds: vec![Cluster::Identify, Cluster::Ota],
        }
    }

    pub fn centralite_outlet(calibration: Calibration) -> Self {
        Self {
            model_id: MODEL_CENTRALITE_OUTLET.to_string(),
            name: "CentraLite Smart Outlet".to_string(),
            reports: vec![
                AttributeReportSpec::new(
                    AttributeKey::new(Cluster::OnOff, on_off_attrs::ON_OFF),
                    0,
                    300,
                    0.0,
                    Capability::OnOff,
                    Decoder::Bit { mask: 0x01 },
                )
                .read_on_start(),
                AttributeReportSpec::new(
                    AttributeKey::new(Cluster::Metering, metering_attrs::CURRENT_SUMMATION_DELIVERED),
                    1,
                    300,
                    1.0,
                    Capability::MeterPower,
                    Decoder::metering(calibration.metering_offset),
                )
                .read_on_start()
                .poll_every(Duration::from_secs(300)),
                AttributeReportSpec::new(
                    AttributeKey::new(Cluster::Metering, metering_attrs::INSTANTANEOUS_DEMAND),
                    1,
                    300,
                    1.0,
                    Capability::MeasurePower,
                    Decoder::Divide { divisor: 10.0 },
                ),
                AttributeReportSpec::new(
                    AttributeKey::new(Cluster::ElectricalMeasurement, electrical_attrs::ACTIVE_POWER),
                    1,
                    300,
                    1.0,
                    Capability::MeasurePower,
                    Decoder::Scaled {
                        numerator: calibration.measure_offset,
                        denominator: 100.0,
                    },
                )
                .read_on_start(),
                AttributeReportSpec::new(
                    AttributeKey::new(Cluster::ElectricalMeasurement, electrical_attrs::RMS_VOLTAGE),
                    1,
                    300,
                    1.0,
                    Capability::MeasureVoltage,
                    Decoder::Divide { divisor: 100.0 },
                )
                .read_on_start(),
                AttributeReportSpec::new(
                    AttributeKey::new(Cluster::ElectricalMeasurement, electrical_attrs::RMS_CURRENT),
                    1,
                    300,
                    1.0,
                    Capability::MeasureCurrent,
                    Decoder::Divide { divisor: 1000.0 },
                )
                .read_on_start(),
            ],
            metadata_attributes: METADATA_ATTRIBUTES.to_vec(),
            binds: Vec::new(),
        }
    }
}

fn zone_status_key() -> AttributeKey {
    AttributeKey::new(Cluster::IasZone, ias_zone_attrs::ZONE_STATUS)
}

fn battery(max_interval: u16) -> AttributeReportSpec {
    AttributeReportSpec::new(
        AttributeKey::new(Cluster::PowerConfig, power_cfg_attrs::BATTERY_PERCENTAGE_REMAINING),
        60,
        max_interval,
        0.0,
        Capability::MeasureBattery,
        Decoder::BatteryHalfPercent,
    )
}

fn temperature(reportable_change: f64) -> AttributeReportSpec {
    AttributeReportSpec::new(
        AttributeKey::new(Cluster::TemperatureMeasurement, temperature_attrs::MEASURED_VALUE),
        300,
        1800,
        reportable_change,
        Capability::MeasureTemperature,
        Decoder::CentiDegrees,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_are_valid() {
        for model in [
            MODEL_SAMJIN_BUTTON,
            MODEL_SAMJIN_WATER,
            MODEL_SAMJIN_MULTI,
            MODEL_CENTRALITE_OUTLET,
        ] {
            let profile = DeviceProfile::for_model(model, Calibration::default()).unwrap();
            assert_eq!(profile.model_id, model);
            assert!(profile.validate().is_ok(), "{model} has an invalid spec");
        }
        assert!(DeviceProfile::for_model("unknown", Calibration::default()).is_none());
    }

    #[test]
    fn test_multi_sensor_uses_alarm_motion() {
        let profile = DeviceProfile::samjin_multi_sensor();
        assert_eq!(
            profile.capabilities(),
            vec![
                Capability::MeasureBattery,
                Capability::MeasureTemperature,
                Capability::AlarmContact,
                Capability::AlarmMotion,
                Capability::AlarmTamper,
            ]
        );
    }

    #[test]
    fn test_outlet_capabilities_deduplicated() {
        let profile = DeviceProfile::centralite_outlet(Calibration::default());
        let capabilities = profile.capabilities();
        assert_eq!(
            capabilities
                .iter()
                .filter(|c| **c == Capability::MeasurePower)
                .count(),
            1
        );
        assert!(profile.supports(Capability::OnOff));
        assert!(!profile.supports(Capability::AlarmWater));
        assert_eq!(
            profile.source_of(Capability::MeasurePower),
            Some(AttributeKey::new(
                Cluster::Metering,
                metering_attrs::INSTANTANEOUS_DEMAND
            ))
        );
    }

    #[test]
    fn test_outlet_calibration_applied() {
        let profile = DeviceProfile::centralite_outlet(Calibration {
            metering_offset: 250.0,
            measure_offset: 1.0,
        });
        let meter = profile
            .reports
            .iter()
            .find(|s| s.capabilities().any(|c| c == Capability::MeterPower))
            .unwrap();
        assert_eq!(meter.bindings[0].decoder, Decoder::metering(250.0));
    }
}
