//! Capability storage owned by the home-automation host

use crate::capability::{Capability, CapabilityValue};
use crate::error::HostError;
use async_trait::async_trait;

/// Capability read/write surface the host exposes for one device
#[async_trait]
pub trait CapabilityHost: Send + Sync {
    fn has_capability(&self, capability: Capability) -> bool;

    async fn add_capability(&self, capability: Capability) -> Result<(), HostError>;

    fn capability_value(&self, capability: Capability) -> Option<CapabilityValue>;

    async fn set_capability_value(
        &self,
        capability: Capability,
        value: CapabilityValue,
    ) -> Result<(), HostError>;
}
