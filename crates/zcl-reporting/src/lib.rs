//! ZCL attribute reporting for Zigbee end devices
//!
//! This crate turns raw ZCL attribute reports into typed capability values.
//! A [`DeviceSession`] subscribes to the attributes its [`DeviceProfile`]
//! declares, decodes each incoming report and commits the results to the
//! home-automation host through a [`CapabilityBridge`].

pub mod bridge;
pub mod capability;
pub mod cluster;
pub mod config;
pub mod decoder;
pub mod device;
pub mod error;
pub mod host;
pub mod hub;
pub mod memory;
pub mod profile;
pub mod registry;
pub mod reporting;
pub mod session;
pub mod transport;

pub use bridge::CapabilityBridge;
pub use capability::{Capability, CapabilityValue, ValueKind};
pub use cluster::{AttributeKey, AttributeValue, Cluster, ClusterCommand, OnOffCommand};
pub use config::{load_config, BridgeConfig, Calibration};
pub use decoder::Decoder;
pub use device::{parse_ieee_address, DeviceIdentity, DeviceMetadata};
pub use error::{
    CommandError, CommitError, ConfigError, HostError, HubError, RegistrationError, SpecError,
    TransportError,
};
pub use host::CapabilityHost;
pub use hub::DeviceHub;
pub use profile::DeviceProfile;
pub use registry::{AttributeReportRegistry, RegistrationOutcome, ReportingConfig};
pub use reporting::{AttributeReportSpec, CapabilityBinding, RawAttributeReport};
pub use session::{DeviceSession, DispatchOutcome, SessionEvent, SessionState};
pub use transport::{SubscriptionRequest, ZclTransport};
