//! Raw attribute value decoding
//!
//! Every decoder is a total function over the raw integer domain. Values
//! outside the documented hardware range go through the same arithmetic and
//! are never clamped or rejected here.

use crate::capability::{CapabilityValue, ValueKind};
use serde::{Deserialize, Serialize};

/// Battery percentage: hardware reports 0-200 for 0-100 %
#[must_use]
pub fn decode_battery(raw: i64) -> f64 {
    raw as f64 / 2.0
}

/// Temperature: signed centi-degrees to degrees Celsius
#[must_use]
pub fn decode_temperature(raw: i64) -> f64 {
    raw as f64 / 100.0
}

/// Calibrated scaling: `raw * numerator / denominator`
#[must_use]
pub fn decode_scaled(raw: i64, numerator: f64, denominator: f64) -> f64 {
    raw as f64 * numerator / denominator
}

/// Fixed divisor matching the hardware's reporting resolution
#[must_use]
pub fn decode_divided(raw: i64, divisor: f64) -> f64 {
    raw as f64 / divisor
}

/// Bitmask test on a bitfield attribute
#[must_use]
pub fn decode_bit(raw: i64, mask: u32) -> bool {
    (raw & i64::from(mask)) != 0
}

/// Decoding rule attached to a capability binding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decoder {
    /// `raw / 2`
    BatteryHalfPercent,
    /// `raw / 100`
    CentiDegrees,
    /// `raw * numerator / denominator`
    Scaled { numerator: f64, denominator: f64 },
    /// `raw / divisor`
    Divide { divisor: f64 },
    /// `raw` unchanged
    Identity,
    /// `(raw & mask) != 0`
    Bit { mask: u32 },
}

impl Decoder {
    /// Metering style scaling with a per-device offset numerator over 100
    #[must_use]
    pub fn metering(offset_numerator: f64) -> Self {
        Decoder::Scaled {
            numerator: offset_numerator,
            denominator: 100.0,
        }
    }

    /// Value type this decoder produces
    #[must_use]
    pub fn output_kind(&self) -> ValueKind {
        match self {
            Decoder::Bit { .. } => ValueKind::Boolean,
            _ => ValueKind::Number,
        }
    }

    /// Decode a raw attribute value
    #[must_use]
    pub fn decode(&self, raw: i64) -> CapabilityValue {
        match *self {
            Decoder::BatteryHalfPercent => CapabilityValue::Number(decode_battery(raw)),
            Decoder::CentiDegrees => CapabilityValue::Number(decode_temperature(raw)),
            Decoder::Scaled {
                numerator,
                denominator,
            } => CapabilityValue::Number(decode_scaled(raw, numerator, denominator)),
            Decoder::Divide { divisor } => CapabilityValue::Number(decode_divided(raw, divisor)),
            Decoder::Identity => CapabilityValue::Number(raw as f64),
            Decoder::Bit { mask } => CapabilityValue::Boolean(decode_bit(raw, mask)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::zone_status;

    #[test]
    fn test_battery_range() {
        for v in 0..=200 {
            let pct = decode_battery(v);
            assert_eq!(pct, v as f64 / 2.0);
            assert!((0.0..=100.0).contains(&pct));
        }
    }

    #[test]
    fn test_battery_out_of_range_passes_through() {
        // 0xFF is "invalid" on the wire but is still decoded
        assert_eq!(decode_battery(255), 127.5);
    }

    #[test]
    fn test_temperature_sign_preserving() {
        assert_eq!(decode_temperature(2150), 21.5);
        assert_eq!(decode_temperature(-550), -5.5);
        assert_eq!(decode_temperature(0), 0.0);
        for v in [-32768_i64, -1, 1, 32767] {
            assert_eq!(decode_temperature(v).signum(), (v as f64).signum());
        }
    }

    #[test]
    fn test_scaled_and_divided() {
        assert_eq!(decode_scaled(1000, 1.0, 100.0), 10.0);
        assert_eq!(decode_scaled(1000, 250.0, 100.0), 2500.0);
        assert_eq!(decode_divided(23012, 100.0), 230.12);
        assert_eq!(decode_divided(1500, 1000.0), 1.5);
        assert_eq!(Decoder::Identity.decode(230), CapabilityValue::Number(230.0));
    }

    #[test]
    fn test_bits_are_independent() {
        let raw = 0b101;
        let full: Vec<bool> = [zone_status::ALARM1, zone_status::ALARM2, zone_status::TAMPER]
            .iter()
            .map(|mask| decode_bit(raw, *mask))
            .collect();
        assert_eq!(full, vec![true, false, true]);

        // Decoding in reverse order gives the same per-bit answers
        assert!(decode_bit(raw, zone_status::TAMPER));
        assert!(!decode_bit(raw, zone_status::ALARM2));
        assert!(decode_bit(raw, zone_status::ALARM1));

        // Every bit decoded alone matches the combined byte
        for shift in 0..8 {
            let mask = 1u32 << shift;
            assert_eq!(decode_bit(0xA5, mask), (0xA5 >> shift) & 1 == 1);
        }
    }

    #[test]
    fn test_decoder_output_kinds() {
        assert_eq!(Decoder::Bit { mask: 1 }.output_kind(), ValueKind::Boolean);
        assert_eq!(Decoder::metering(1.0).output_kind(), ValueKind::Number);
        assert_eq!(
            Decoder::Bit { mask: 2 }.decode(6),
            CapabilityValue::Boolean(true)
        );
    }

    #[test]
    fn test_decoder_deserialize() {
        let decoder: Decoder =
            serde_json::from_str(r#"{"kind":"divide","divisor":1000.0}"#).unwrap();
        assert_eq!(decoder, Decoder::Divide { divisor: 1000.0 });
        let decoder: Decoder = serde_json::from_str(r#"{"kind":"bit","mask":4}"#).unwrap();
        assert_eq!(decoder, Decoder::Bit { mask: 4 });
    }
}
