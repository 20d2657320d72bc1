//! In-memory transport and host
//!
//! Stand-ins for the radio stack and the home-automation host. They record
//! every call and can be told to fail specific requests, which makes them
//! useful for tests and for replaying captured reports without hardware.

use crate::capability::{Capability, CapabilityValue};
use crate::cluster::{AttributeKey, AttributeValue, Cluster, ClusterCommand};
use crate::error::{HostError, TransportError};
use crate::host::CapabilityHost;
use crate::transport::{SubscriptionRequest, ZclTransport};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport that answers from memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    subscriptions: Mutex<Vec<SubscriptionRequest>>,
    reads: Mutex<Vec<(Cluster, Vec<u16>)>>,
    binds: Mutex<Vec<(Cluster, u8)>>,
    commands: Mutex<Vec<ClusterCommand>>,
    subscribe_failures: DashMap<AttributeKey, TransportError>,
    read_failures: DashMap<Cluster, TransportError>,
    bind_failures: DashMap<Cluster, TransportError>,
    command_failure: Mutex<Option<TransportError>>,
    attribute_values: DashMap<AttributeKey, AttributeValue>,
    subscribe_delay: Mutex<Option<Duration>>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subscriptions for `key` fail with `error`
    pub fn fail_subscription(&self, key: AttributeKey, error: TransportError) {
        self.subscribe_failures.insert(key, error);
    }

    pub fn fail_reads(&self, cluster: Cluster, error: TransportError) {
        self.read_failures.insert(cluster, error);
    }

    pub fn fail_binds(&self, cluster: Cluster, error: TransportError) {
        self.bind_failures.insert(cluster, error);
    }

    pub fn fail_commands(&self, error: TransportError) {
        *locked(&self.command_failure) = Some(error);
    }

    /// Forget every injected failure
    pub fn clear_failures(&self) {
        self.subscribe_failures.clear();
        self.read_failures.clear();
        self.bind_failures.clear();
        *locked(&self.command_failure) = None;
    }

    /// Value returned when `key` is read
    pub fn set_attribute(&self, key: AttributeKey, value: AttributeValue) {
        self.attribute_values.insert(key, value);
    }

    /// Delay every subscription acknowledgement
    pub fn set_subscribe_delay(&self, delay: Duration) {
        *locked(&self.subscribe_delay) = Some(delay);
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionRequest> {
        locked(&self.subscriptions).clone()
    }

    #[must_use]
    pub fn reads(&self) -> Vec<(Cluster, Vec<u16>)> {
        locked(&self.reads).clone()
    }

    #[must_use]
    pub fn binds(&self) -> Vec<(Cluster, u8)> {
        locked(&self.binds).clone()
    }

    #[must_use]
    pub fn commands(&self) -> Vec<ClusterCommand> {
        locked(&self.commands).clone()
    }
}

#[async_trait]
impl ZclTransport for MemoryTransport {
    async fn subscribe_attribute_report(
        &self,
        request: SubscriptionRequest,
    ) -> Result<(), TransportError> {
        locked(&self.subscriptions).push(request);
        let delay = *locked(&self.subscribe_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let key = AttributeKey::new(request.cluster, request.attribute);
        match self.subscribe_failures.get(&key) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn read_attributes(
        &self,
        cluster: Cluster,
        attributes: &[u16],
    ) -> Result<Vec<(u16, AttributeValue)>, TransportError> {
        locked(&self.reads).push((cluster, attributes.to_vec()));
        if let Some(error) = self.read_failures.get(&cluster) {
            return Err(error.clone());
        }
        // Unsupported attributes are left out of the response
        Ok(attributes
            .iter()
            .filter_map(|attr| {
                self.attribute_values
                    .get(&AttributeKey::new(cluster, *attr))
                    .map(|v| (*attr, v.value().clone()))
            })
            .collect())
    }

    async fn bind_cluster(
        &self,
        cluster: Cluster,
        target_endpoint: u8,
    ) -> Result<(), TransportError> {
        locked(&self.binds).push((cluster, target_endpoint));
        match self.bind_failures.get(&cluster) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn send_command(&self, command: ClusterCommand) -> Result<(), TransportError> {
        locked(&self.commands).push(command);
        match locked(&self.command_failure).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Capability store standing in for the host
#[derive(Debug, Default)]
pub struct MemoryHost {
    capabilities: DashMap<Capability, Option<CapabilityValue>>,
    set_failures: DashMap<Capability, HostError>,
    add_failures: DashMap<Capability, HostError>,
    added: Mutex<Vec<Capability>>,
    writes: Mutex<Vec<(Capability, CapabilityValue)>>,
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Host that already carries some capabilities
    #[must_use]
    pub fn with_capabilities(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let host = Self::default();
        for capability in capabilities {
            host.capabilities.insert(capability, None);
        }
        host
    }

    /// Reject writes to `capability`
    pub fn fail_set(&self, capability: Capability, error: HostError) {
        self.set_failures.insert(capability, error);
    }

    /// Reject adding `capability`
    pub fn fail_add(&self, capability: Capability, error: HostError) {
        self.add_failures.insert(capability, error);
    }

    /// Capabilities added through `add_capability`
    #[must_use]
    pub fn added(&self) -> Vec<Capability> {
        locked(&self.added).clone()
    }

    /// Accepted writes in commit order
    #[must_use]
    pub fn writes(&self) -> Vec<(Capability, CapabilityValue)> {
        locked(&self.writes).clone()
    }

    /// Current state of every capability
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Capability, Option<CapabilityValue>)> {
        let mut state: Vec<_> = self
            .capabilities
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        state.sort_by_key(|(capability, _)| *capability);
        state
    }
}

#[async_trait]
impl CapabilityHost for MemoryHost {
    fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains_key(&capability)
    }

    async fn add_capability(&self, capability: Capability) -> Result<(), HostError> {
        if let Some(error) = self.add_failures.get(&capability) {
            return Err(error.clone());
        }
        locked(&self.added).push(capability);
        self.capabilities.entry(capability).or_insert(None);
        Ok(())
    }

    fn capability_value(&self, capability: Capability) -> Option<CapabilityValue> {
        self.capabilities.get(&capability).and_then(|entry| *entry.value())
    }

    async fn set_capability_value(
        &self,
        capability: Capability,
        value: CapabilityValue,
    ) -> Result<(), HostError> {
        if let Some(error) = self.set_failures.get(&capability) {
            return Err(error.clone());
        }
        match self.capabilities.get_mut(&capability) {
            Some(mut entry) => {
                *entry = Some(value);
            }
            None => return Err(HostError::UnknownCapability(capability)),
        }
        locked(&self.writes).push((capability, value));
        Ok(())
    }
}
