//! Per-device reporting session

use crate::bridge::CapabilityBridge;
use crate::capability::{Capability, CapabilityValue, ValueKind};
use crate::cluster::{AttributeKey, Cluster, ClusterCommand, OnOffCommand};
use crate::config::BridgeConfig;
use crate::device::{DeviceIdentity, DeviceMetadata};
use crate::error::{CommandError, CommitError, ReadError, RegistrationError};
use crate::host::CapabilityHost;
use crate::profile::DeviceProfile;
use crate::registry::{AttributeReportRegistry, RegistrationOutcome};
use crate::reporting::RawAttributeReport;
use crate::transport::ZclTransport;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Attaching,
    SteadyState,
    TornDown,
}

/// Events emitted by sessions
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        ieee_address: [u8; 8],
        state: SessionState,
    },
    CapabilityUpdated {
        ieee_address: [u8; 8],
        capability: Capability,
        value: CapabilityValue,
    },
    RegistrationFailed {
        ieee_address: [u8; 8],
        error: RegistrationError,
    },
    CommitFailed {
        ieee_address: [u8; 8],
        attribute: AttributeKey,
        error: CommitError,
    },
}

/// Messages delivered to a running session
#[derive(Debug)]
pub enum SessionMessage {
    Report(RawAttributeReport),
    Command {
        capability: Capability,
        value: CapabilityValue,
        reply: oneshot::Sender<Result<(), CommandError>>,
    },
    SettingsChanged {
        changed_keys: Vec<String>,
    },
    Renamed(String),
    Deleted,
    RetryRegistrations,
    Teardown,
}

/// Result of the attach phase
#[derive(Debug, Clone, PartialEq)]
pub struct AttachSummary {
    pub registrations: Vec<(AttributeKey, RegistrationOutcome)>,
    /// False when teardown interrupted attach
    pub completed: bool,
}

impl AttachSummary {
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registrations
            .iter()
            .filter(|(_, outcome)| outcome.is_active())
            .count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.registrations
            .iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .count()
    }
}

/// What happened to one raw report
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Decoded and committed; one result per capability
    Committed(Vec<(Capability, Result<(), CommitError>)>),
    /// No active subscription for the attribute
    Unrouted,
    /// The session is not in steady state
    Ignored(SessionState),
}

/// Session tuning taken from [`BridgeConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub coordinator_endpoint: u8,
    pub poll_on_failure: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for SessionOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            coordinator_endpoint: config.coordinator_endpoint,
            poll_on_failure: config.poll_on_failure,
        }
    }
}

/// Drives one physical device from attach to teardown
///
/// The session owns all of its state and is mutated through `&mut self`
/// only, so a single task processes its reports strictly in order. Each
/// commit is awaited before the next report is taken, which keeps commits
/// for a capability in arrival order.
pub struct DeviceSession {
    device: DeviceIdentity,
    profile: DeviceProfile,
    options: SessionOptions,
    state: SessionState,
    registry: AttributeReportRegistry,
    bridge: CapabilityBridge,
    metadata: DeviceMetadata,
    transport: Arc<dyn ZclTransport>,
    host: Arc<dyn CapabilityHost>,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<SessionEvent>,
    next_poll: BTreeMap<AttributeKey, Instant>,
}

impl DeviceSession {
    pub fn new(
        device: DeviceIdentity,
        profile: DeviceProfile,
        transport: Arc<dyn ZclTransport>,
        host: Arc<dyn CapabilityHost>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let cancel = CancellationToken::new();
        Self {
            device,
            profile,
            options: SessionOptions::default(),
            state: SessionState::Uninitialized,
            registry: AttributeReportRegistry::new(),
            bridge: CapabilityBridge::new(cancel.clone()),
            metadata: DeviceMetadata::default(),
            transport,
            host,
            cancel,
            event_tx,
            next_poll: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Publish events on a shared channel
    #[must_use]
    pub fn with_events(mut self, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        self.event_tx = event_tx;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Token that tears the session down when cancelled
    #[must_use]
    pub fn teardown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    #[must_use]
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    #[must_use]
    pub fn metadata(&self) -> &DeviceMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn registry(&self) -> &AttributeReportRegistry {
        &self.registry
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::info!(
            device = %self.device.ieee_address_string(),
            name = %self.device.display_name(),
            from = ?self.state,
            to = ?state,
            "Session state changed"
        );
        self.state = state;
        let _ = self.event_tx.send(SessionEvent::StateChanged {
            ieee_address: self.device.ieee_address,
            state,
        });
    }

    /// Node attach: capabilities, metadata, binds, subscriptions
    ///
    /// Individual failures are logged and never stop attach. Cancelling the
    /// teardown token abandons whatever is still pending.
    pub async fn attach(&mut self) -> AttachSummary {
        if self.state != SessionState::Uninitialized {
            tracing::warn!(
                device = %self.device.ieee_address_string(),
                state = ?self.state,
                "Attach requested outside of Uninitialized, ignoring"
            );
            return AttachSummary {
                registrations: Vec::new(),
                completed: false,
            };
        }
        self.set_state(SessionState::Attaching);

        let cancel = self.cancel.clone();
        let registrations = {
            let steps = self.attach_steps();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                registrations = steps => Some(registrations),
            }
        };

        match registrations {
            Some(registrations) => {
                self.schedule_polls(Instant::now());
                self.set_state(SessionState::SteadyState);
                AttachSummary {
                    registrations,
                    completed: true,
                }
            }
            None => {
                self.teardown();
                AttachSummary {
                    registrations: self
                        .registry
                        .iter()
                        .map(|entry| (entry.spec.key, entry.outcome.clone()))
                        .collect(),
                    completed: false,
                }
            }
        }
    }

    async fn attach_steps(&mut self) -> Vec<(AttributeKey, RegistrationOutcome)> {
        for (key, capability) in self.profile.capability_sources() {
            if let Err(error) = self.bridge.ensure(self.host.as_ref(), capability).await {
                self.log_commit_failure(key, error);
            }
        }

        if !self.profile.metadata_attributes.is_empty() {
            let attributes = self.profile.metadata_attributes.clone();
            let result = self
                .transport
                .read_attributes(Cluster::Basic, &attributes)
                .await;
            match result {
                Ok(values) => {
                    for (attribute, value) in &values {
                        self.metadata.apply(*attribute, value);
                    }
                    tracing::info!(
                        device = %self.device.ieee_address_string(),
                        manufacturer = ?self.metadata.manufacturer,
                        model = ?self.metadata.model,
                        app_version = ?self.metadata.app_version,
                        "Read device metadata"
                    );
                }
                Err(source) => self.log_read_failure(&ReadError {
                    cluster: Cluster::Basic,
                    attributes,
                    source,
                }),
            }
        }

        for cluster in self.profile.binds.clone() {
            if let Err(e) = self
                .transport
                .bind_cluster(cluster, self.options.coordinator_endpoint)
                .await
            {
                tracing::warn!(
                    device = %self.device.ieee_address_string(),
                    name = %self.device.display_name(),
                    cluster = %cluster,
                    error = %e,
                    "Failed to bind cluster"
                );
            }
        }

        let specs = self.profile.reports.clone();
        let registrations = self
            .registry
            .register_all(self.transport.as_ref(), specs)
            .await;
        self.log_registrations(&registrations);

        let initial_reads: Vec<AttributeKey> = self
            .profile
            .reports
            .iter()
            .filter(|spec| spec.read_on_start)
            .map(|spec| spec.key)
            .collect();
        for key in initial_reads {
            self.read_and_dispatch(key).await;
        }

        registrations
    }

    /// Single logging site for registration results
    fn log_registrations(&self, registrations: &[(AttributeKey, RegistrationOutcome)]) {
        for (key, outcome) in registrations {
            match outcome {
                RegistrationOutcome::Active => tracing::debug!(
                    device = %self.device.ieee_address_string(),
                    attribute = %key,
                    "Attribute reporting active"
                ),
                RegistrationOutcome::Failed(error) => {
                    tracing::warn!(
                        device = %self.device.ieee_address_string(),
                        name = %self.device.display_name(),
                        attribute = %key,
                        error = %error,
                        "Failed to register attribute reporting"
                    );
                    let _ = self.event_tx.send(SessionEvent::RegistrationFailed {
                        ieee_address: self.device.ieee_address,
                        error: error.clone(),
                    });
                }
                RegistrationOutcome::Pending => {}
            }
        }
    }

    fn log_commit_failure(&self, key: AttributeKey, error: CommitError) {
        tracing::warn!(
            device = %self.device.ieee_address_string(),
            name = %self.device.display_name(),
            attribute = %key,
            error = %error,
            "Failed to commit capability value"
        );
        let _ = self.event_tx.send(SessionEvent::CommitFailed {
            ieee_address: self.device.ieee_address,
            attribute: key,
            error,
        });
    }

    fn log_read_failure(&self, error: &ReadError) {
        let attributes: Vec<String> = error.keys().map(|key| key.to_string()).collect();
        tracing::warn!(
            device = %self.device.ieee_address_string(),
            name = %self.device.display_name(),
            attribute = %attributes.join(", "),
            error = %error.source,
            "Failed to read attributes"
        );
    }

    /// Dispatch an unsolicited attribute report
    pub async fn handle_report(&mut self, report: RawAttributeReport) -> DispatchOutcome {
        if self.state != SessionState::SteadyState {
            tracing::debug!(
                device = %self.device.ieee_address_string(),
                attribute = %report.key,
                state = ?self.state,
                "Dropping report outside of steady state"
            );
            return DispatchOutcome::Ignored(self.state);
        }

        let values = match self.registry.route(&report.key) {
            Some(spec) => spec.decode(report.raw_value),
            None => {
                tracing::debug!(
                    device = %self.device.ieee_address_string(),
                    attribute = %report.key,
                    raw = report.raw_value,
                    "No active subscription for report"
                );
                return DispatchOutcome::Unrouted;
            }
        };

        tracing::debug!(
            device = %self.device.ieee_address_string(),
            attribute = %report.key,
            raw = report.raw_value,
            "Attribute report"
        );
        DispatchOutcome::Committed(self.commit(report.key, &values).await)
    }

    /// Commit values decoded from one snapshot of `key`
    async fn commit(
        &mut self,
        key: AttributeKey,
        values: &[(Capability, CapabilityValue)],
    ) -> Vec<(Capability, Result<(), CommitError>)> {
        let results = self.bridge.apply_all(self.host.as_ref(), values).await;
        for ((capability, result), (_, value)) in results.iter().zip(values) {
            match result {
                Ok(()) => {
                    let _ = self.event_tx.send(SessionEvent::CapabilityUpdated {
                        ieee_address: self.device.ieee_address,
                        capability: *capability,
                        value: *value,
                    });
                }
                Err(CommitError::TornDown(_)) => {}
                Err(error) => self.log_commit_failure(key, error.clone()),
            }
        }
        results
    }

    /// Read one attribute and push its value through the decode path
    async fn read_and_dispatch(&mut self, key: AttributeKey) -> bool {
        let result = self
            .transport
            .read_attributes(key.cluster, &[key.attribute])
            .await;
        let values = match result {
            Ok(values) => values,
            Err(source) => {
                self.log_read_failure(&ReadError {
                    cluster: key.cluster,
                    attributes: vec![key.attribute],
                    source,
                });
                return false;
            }
        };

        let raw = values
            .iter()
            .find(|(attribute, _)| *attribute == key.attribute)
            .and_then(|(_, value)| value.as_integer());
        let Some(raw) = raw else {
            tracing::debug!(
                device = %self.device.ieee_address_string(),
                attribute = %key,
                "Attribute missing from read response"
            );
            return false;
        };

        let Some(spec) = self.registry.get(&key).map(|entry| &entry.spec) else {
            return false;
        };
        let decoded = spec.decode(raw);
        self.commit(key, &decoded).await;
        true
    }

    /// Poll interval for an attribute, if it should be polled at all
    fn poll_interval(&self, key: &AttributeKey) -> Option<Duration> {
        let entry = self.registry.get(key)?;
        if let Some(interval) = entry.spec.poll_interval {
            return Some(interval);
        }
        // Failed subscriptions are polled at the rate the device would
        // otherwise have reported
        if self.options.poll_on_failure && entry.outcome.is_failed() {
            return Some(Duration::from_secs(u64::from(entry.spec.max_interval.max(1))));
        }
        None
    }

    fn schedule_polls(&mut self, now: Instant) {
        let keys: Vec<AttributeKey> = self.registry.iter().map(|entry| entry.spec.key).collect();
        self.next_poll.clear();
        for key in keys {
            if let Some(interval) = self.poll_interval(&key) {
                self.next_poll.insert(key, now + interval);
            }
        }
    }

    /// Earliest pending poll
    #[must_use]
    pub fn next_poll_deadline(&self) -> Option<Instant> {
        self.next_poll.values().min().copied()
    }

    /// Read every attribute whose poll is due at `now`
    pub async fn poll_due(&mut self, now: Instant) -> usize {
        if self.state != SessionState::SteadyState {
            return 0;
        }
        let due: Vec<AttributeKey> = self
            .next_poll
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| *key)
            .collect();

        for key in &due {
            tracing::debug!(
                device = %self.device.ieee_address_string(),
                attribute = %key,
                "Polling attribute"
            );
            self.read_and_dispatch(*key).await;
            match self.poll_interval(key) {
                Some(interval) => {
                    self.next_poll.insert(*key, now + interval);
                }
                None => {
                    self.next_poll.remove(key);
                }
            }
        }
        due.len()
    }

    /// Re-attempt failed subscriptions
    pub async fn retry_registrations(&mut self) -> Vec<(AttributeKey, RegistrationOutcome)> {
        if self.state != SessionState::SteadyState {
            return Vec::new();
        }
        let outcomes = self.registry.retry_failed(self.transport.as_ref()).await;
        self.log_registrations(&outcomes);
        self.schedule_polls(Instant::now());
        outcomes
    }

    /// Host-issued capability change
    pub async fn handle_command(
        &mut self,
        capability: Capability,
        value: CapabilityValue,
    ) -> Result<(), CommandError> {
        if self.state == SessionState::TornDown {
            return Err(CommandError::SessionClosed);
        }
        let Some(key) = self.profile.source_of(capability) else {
            return Err(CommandError::NotSupported(capability));
        };
        if !capability.is_settable() {
            return Err(CommandError::ReadOnly(capability));
        }
        let on = value.as_bool().ok_or(CommandError::InvalidValue {
            capability,
            expected: ValueKind::Boolean,
        })?;

        let command = if on { OnOffCommand::On } else { OnOffCommand::Off };
        tracing::info!(
            device = %self.device.ieee_address_string(),
            command = ?command,
            "Sending on/off command"
        );
        self.transport
            .send_command(ClusterCommand::OnOff(command))
            .await?;

        // The device confirms through an attribute report later
        self.commit(key, &[(capability, value)]).await;
        Ok(())
    }

    /// Settings hook
    pub fn on_settings_changed(&self, changed_keys: &[String]) {
        tracing::info!(
            device = %self.device.ieee_address_string(),
            name = %self.device.display_name(),
            keys = ?changed_keys,
            "Device settings were changed"
        );
    }

    /// Rename hook
    pub fn on_renamed(&mut self, name: String) {
        tracing::info!(
            device = %self.device.ieee_address_string(),
            old = %self.device.display_name(),
            new = %name,
            "Device was renamed"
        );
        self.device.friendly_name = Some(name);
    }

    /// Delete hook; the session ends
    pub fn on_deleted(&mut self) {
        tracing::info!(
            device = %self.device.ieee_address_string(),
            name = %self.device.display_name(),
            "Device has been deleted"
        );
        self.teardown();
    }

    /// Stop dispatching; pending subscriptions are abandoned
    pub fn teardown(&mut self) {
        if self.state == SessionState::TornDown {
            return;
        }
        self.cancel.cancel();
        let abandoned = self.registry.abandon_pending();
        if abandoned > 0 {
            tracing::debug!(
                device = %self.device.ieee_address_string(),
                abandoned,
                "Abandoned pending subscriptions"
            );
        }
        self.next_poll.clear();
        self.set_state(SessionState::TornDown);
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Report(report) => {
                self.handle_report(report).await;
            }
            SessionMessage::Command {
                capability,
                value,
                reply,
            } => {
                let result = self.handle_command(capability, value).await;
                let _ = reply.send(result);
            }
            SessionMessage::SettingsChanged { changed_keys } => {
                self.on_settings_changed(&changed_keys);
            }
            SessionMessage::Renamed(name) => self.on_renamed(name),
            SessionMessage::Deleted => self.on_deleted(),
            SessionMessage::RetryRegistrations => {
                self.retry_registrations().await;
            }
            SessionMessage::Teardown => self.teardown(),
        }
    }

    /// Run the session until teardown
    ///
    /// Attaches, then processes messages in arrival order and polls due
    /// attributes between messages. A closed channel tears the session down.
    pub async fn run(mut self, mut rx: mpsc::Receiver<SessionMessage>) -> Self {
        self.attach().await;
        let cancel = self.cancel.clone();

        while self.state != SessionState::TornDown {
            let deadline = self.next_poll_deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => self.teardown(),
                message = rx.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        tracing::debug!(
                            device = %self.device.ieee_address_string(),
                            "Session channel closed"
                        );
                        self.teardown();
                    }
                },
                _ = sleep_until(deadline) => {
                    self.poll_due(Instant::now()).await;
                }
            }
        }
        self
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
