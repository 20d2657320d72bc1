//! ZCL (Zigbee Cluster Library) identifiers used by the reporting layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Clusters the supported devices expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cluster {
    Basic,
    PowerConfig,
    Identify,
    OnOff,
    TemperatureMeasurement,
    IasZone,
    Ota,
    Metering,
    ElectricalMeasurement,
}

impl Cluster {
    /// Numeric cluster ID
    #[must_use]
    pub fn id(self) -> u16 {
        match self {
            Cluster::Basic => 0x0000,
            Cluster::PowerConfig => 0x0001,
            Cluster::Identify => 0x0003,
            Cluster::OnOff => 0x0006,
            Cluster::Ota => 0x0019,
            Cluster::TemperatureMeasurement => 0x0402,
            Cluster::IasZone => 0x0500,
            Cluster::Metering => 0x0702,
            Cluster::ElectricalMeasurement => 0x0B04,
        }
    }

    /// Look a cluster up by its numeric ID
    #[must_use]
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0x0000 => Some(Cluster::Basic),
            0x0001 => Some(Cluster::PowerConfig),
            0x0003 => Some(Cluster::Identify),
            0x0006 => Some(Cluster::OnOff),
            0x0019 => Some(Cluster::Ota),
            0x0402 => Some(Cluster::TemperatureMeasurement),
            0x0500 => Some(Cluster::IasZone),
            0x0702 => Some(Cluster::Metering),
            0x0B04 => Some(Cluster::ElectricalMeasurement),
            _ => None,
        }
    }

    /// Conventional cluster name (zigbee-herdsman style)
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Cluster::Basic => "genBasic",
            Cluster::PowerConfig => "genPowerCfg",
            Cluster::Identify => "genIdentify",
            Cluster::OnOff => "genOnOff",
            Cluster::Ota => "genOta",
            Cluster::TemperatureMeasurement => "msTemperatureMeasurement",
            Cluster::IasZone => "ssIasZone",
            Cluster::Metering => "seMetering",
            Cluster::ElectricalMeasurement => "haElectricalMeasurement",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Basic cluster attributes
pub mod basic_attrs {
    pub const ZCL_VERSION: u16 = 0x0000;
    pub const APPLICATION_VERSION: u16 = 0x0001;
    pub const MANUFACTURER_NAME: u16 = 0x0004;
    pub const MODEL_IDENTIFIER: u16 = 0x0005;
    pub const POWER_SOURCE: u16 = 0x0007;
    pub const SW_BUILD_ID: u16 = 0x4000;
}

/// Power configuration cluster attributes
pub mod power_cfg_attrs {
    pub const BATTERY_VOLTAGE: u16 = 0x0020;
    pub const BATTERY_PERCENTAGE_REMAINING: u16 = 0x0021;
}

/// On/Off cluster attributes
pub mod on_off_attrs {
    pub const ON_OFF: u16 = 0x0000;
}

/// Temperature measurement cluster attributes
pub mod temperature_attrs {
    pub const MEASURED_VALUE: u16 = 0x0000;
}

/// IAS Zone cluster attributes
pub mod ias_zone_attrs {
    pub const ZONE_STATE: u16 = 0x0000;
    pub const ZONE_TYPE: u16 = 0x0001;
    pub const ZONE_STATUS: u16 = 0x0002;
}

/// IAS Zone status bits
pub mod zone_status {
    pub const ALARM1: u32 = 0x0001;
    pub const ALARM2: u32 = 0x0002;
    pub const TAMPER: u32 = 0x0004;
    pub const BATTERY_LOW: u32 = 0x0008;
}

/// Metering cluster attributes
pub mod metering_attrs {
    pub const CURRENT_SUMMATION_DELIVERED: u16 = 0x0000;
    pub const INSTANTANEOUS_DEMAND: u16 = 0x0400;
}

/// Electrical measurement cluster attributes
pub mod electrical_attrs {
    pub const RMS_VOLTAGE: u16 = 0x0505;
    pub const RMS_CURRENT: u16 = 0x0508;
    pub const ACTIVE_POWER: u16 = 0x050B;
}

/// Name of a known attribute, if any
#[must_use]
pub fn attribute_name(cluster: Cluster, attribute: u16) -> Option<&'static str> {
    let name = match (cluster, attribute) {
        (Cluster::Basic, basic_attrs::ZCL_VERSION) => "zclVersion",
        (Cluster::Basic, basic_attrs::APPLICATION_VERSION) => "appVersion",
        (Cluster::Basic, basic_attrs::MANUFACTURER_NAME) => "manufacturerName",
        (Cluster::Basic, basic_attrs::MODEL_IDENTIFIER) => "modelId",
        (Cluster::Basic, basic_attrs::POWER_SOURCE) => "powerSource",
        (Cluster::Basic, basic_attrs::SW_BUILD_ID) => "swBuildId",
        (Cluster::PowerConfig, power_cfg_attrs::BATTERY_VOLTAGE) => "batteryVoltage",
        (Cluster::PowerConfig, power_cfg_attrs::BATTERY_PERCENTAGE_REMAINING) => {
            "batteryPercentageRemaining"
        }
        (Cluster::OnOff, on_off_attrs::ON_OFF) => "onOff",
        (Cluster::TemperatureMeasurement, temperature_attrs::MEASURED_VALUE) => "measuredValue",
        (Cluster::IasZone, ias_zone_attrs::ZONE_STATE) => "zoneState",
        (Cluster::IasZone, ias_zone_attrs::ZONE_TYPE) => "zoneType",
        (Cluster::IasZone, ias_zone_attrs::ZONE_STATUS) => "zoneStatus",
        (Cluster::Metering, metering_attrs::CURRENT_SUMMATION_DELIVERED) => {
            "currentSummationDelivered"
        }
        (Cluster::Metering, metering_attrs::INSTANTANEOUS_DEMAND) => "instantaneousDemand",
        (Cluster::ElectricalMeasurement, electrical_attrs::RMS_VOLTAGE) => "rmsVoltage",
        (Cluster::ElectricalMeasurement, electrical_attrs::RMS_CURRENT) => "rmsCurrent",
        (Cluster::ElectricalMeasurement, electrical_attrs::ACTIVE_POWER) => "activePower",
        _ => return None,
    };
    Some(name)
}

/// A (cluster, attribute) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKey {
    pub cluster: Cluster,
    pub attribute: u16,
}

impl AttributeKey {
    #[must_use]
    pub const fn new(cluster: Cluster, attribute: u16) -> Self {
        Self { cluster, attribute }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match attribute_name(self.cluster, self.attribute) {
            Some(name) => write!(f, "{}/{}", self.cluster, name),
            None => write!(f, "{}/{:#06x}", self.cluster, self.attribute),
        }
    }
}

/// Value returned by a ReadAttributes request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl AttributeValue {
    /// Integer view of the value, booleans map to 0/1
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(v) => Some(*v),
            AttributeValue::Boolean(b) => Some(i64::from(*b)),
            AttributeValue::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// On/Off cluster commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OnOffCommand {
    Off = 0x00,
    On = 0x01,
    Toggle = 0x02,
}

/// Cluster-specific command sent on behalf of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterCommand {
    OnOff(OnOffCommand),
}

impl ClusterCommand {
    #[must_use]
    pub fn cluster(self) -> Cluster {
        match self {
            ClusterCommand::OnOff(_) => Cluster::OnOff,
        }
    }

    #[must_use]
    pub fn command_id(self) -> u8 {
        match self {
            ClusterCommand::OnOff(cmd) => cmd as u8,
        }
    }
}
