//! Device identity and static metadata

use crate::cluster::{basic_attrs, AttributeValue};
use crate::error::ParseIeeeError;
use serde::{Deserialize, Serialize};

/// Identity of the physical device a session drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// IEEE address (EUI-64), little-endian
    pub ieee_address: [u8; 8],
    /// Model identifier selecting the device profile
    pub model_id: String,
    /// User-assigned friendly name
    pub friendly_name: Option<String>,
}

impl DeviceIdentity {
    #[must_use]
    pub fn new(ieee_address: [u8; 8], model_id: impl Into<String>) -> Self {
        Self {
            ieee_address,
            model_id: model_id.into(),
            friendly_name: None,
        }
    }

    /// Get IEEE address as hex string
    #[must_use]
    pub fn ieee_address_string(&self) -> String {
        format_ieee(&self.ieee_address)
    }

    /// Get a display name (friendly name or model)
    #[must_use]
    pub fn display_name(&self) -> String {
        self.friendly_name
            .clone()
            .unwrap_or_else(|| self.model_id.clone())
    }
}

/// Format an IEEE address big-endian, colon separated
#[must_use]
pub fn format_ieee(ieee: &[u8; 8]) -> String {
    ieee.iter()
        .rev()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse an IEEE address written the way [`format_ieee`] prints it
pub fn parse_ieee_address(s: &str) -> Result<[u8; 8], ParseIeeeError> {
    let invalid = || ParseIeeeError(s.to_string());
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 8 {
        return Err(invalid());
    }

    let mut ieee = [0u8; 8];
    for (byte, part) in ieee.iter_mut().rev().zip(parts) {
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }
    Ok(ieee)
}

/// Basic cluster power source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Unknown,
    MainsSinglePhase,
    MainsThreePhase,
    Battery,
    DcSource,
    EmergencyMainsConstant,
    EmergencyMainsTransfer,
    Other(u8),
}

impl From<u8> for PowerSource {
    fn from(value: u8) -> Self {
        // Bit 7 flags a secondary battery backup
        match value & 0x7F {
            0x00 => PowerSource::Unknown,
            0x01 => PowerSource::MainsSinglePhase,
            0x02 => PowerSource::MainsThreePhase,
            0x03 => PowerSource::Battery,
            0x04 => PowerSource::DcSource,
            0x05 => PowerSource::EmergencyMainsConstant,
            0x06 => PowerSource::EmergencyMainsTransfer,
            v => PowerSource::Other(v),
        }
    }
}

/// Static metadata read from the Basic cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub zcl_version: Option<u8>,
    pub app_version: Option<u8>,
    pub power_source: Option<PowerSource>,
    pub sw_build_id: Option<String>,
}

impl DeviceMetadata {
    /// Record one Basic cluster attribute; unknown attributes are ignored
    pub fn apply(&mut self, attribute: u16, value: &AttributeValue) {
        let as_u8 = || value.as_integer().and_then(|v| u8::try_from(v).ok());
        match attribute {
            basic_attrs::MANUFACTURER_NAME => {
                self.manufacturer = value.as_text().map(str::to_string);
            }
            basic_attrs::MODEL_IDENTIFIER => self.model = value.as_text().map(str::to_string),
            basic_attrs::ZCL_VERSION => self.zcl_version = as_u8(),
            basic_attrs::APPLICATION_VERSION => self.app_version = as_u8(),
            basic_attrs::POWER_SOURCE => self.power_source = as_u8().map(PowerSource::from),
            basic_attrs::SW_BUILD_ID => self.sw_build_id = value.as_text().map(str::to_string),
            _ => {}
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ieee_address() {
        let result = parse_ieee_address("00:11:22:33:44:55:66:77").unwrap();
        assert_eq!(result, [0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
        assert_eq!(format_ieee(&result), "00:11:22:33:44:55:66:77");
        assert!(parse_ieee_address("00:11:22").is_err());
        assert!(parse_ieee_address("zz:11:22:33:44:55:66:77").is_err());
        assert!(parse_ieee_address("0:11:22:33:44:55:66:77").is_err());
        assert!(parse_ieee_address("+f:11:22:33:44:55:66:77").is_err());
        assert!(parse_ieee_address("00:11:22:33:44:55:66:77:88").is_err());
        assert_eq!(
            parse_ieee_address("28:6D:97:00:01:04:A1:B2").unwrap(),
            [0xb2, 0xa1, 0x04, 0x01, 0x00, 0x97, 0x6d, 0x28]
        );
    }

    #[test]
    fn test_display_name() {
        let mut device = DeviceIdentity::new([1; 8], "im6001-wlp01");
        assert_eq!(device.display_name(), "im6001-wlp01");
        device.friendly_name = Some("Basement leak".to_string());
        assert_eq!(device.display_name(), "Basement leak");
    }

    #[test]
    fn test_metadata_apply() {
        let mut metadata = DeviceMetadata::default();
        assert!(metadata.is_empty());
        metadata.apply(
            basic_attrs::MANUFACTURER_NAME,
            &AttributeValue::Text("Samjin".to_string()),
        );
        metadata.apply(basic_attrs::POWER_SOURCE, &AttributeValue::Integer(0x83));
        metadata.apply(basic_attrs::ZCL_VERSION, &AttributeValue::Integer(3));
        metadata.apply(0x9999, &AttributeValue::Integer(1));

        assert_eq!(metadata.manufacturer.as_deref(), Some("Samjin"));
        assert_eq!(metadata.power_source, Some(PowerSource::Battery));
        assert_eq!(metadata.zcl_version, Some(3));
    }
}
