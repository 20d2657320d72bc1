//! Session registry keyed by IEEE address

use crate::capability::{Capability, CapabilityValue};
use crate::config::BridgeConfig;
use crate::device::{format_ieee, DeviceIdentity};
use crate::error::HubError;
use crate::host::CapabilityHost;
use crate::profile::DeviceProfile;
use crate::reporting::RawAttributeReport;
use crate::session::{DeviceSession, SessionEvent, SessionMessage, SessionOptions};
use crate::transport::ZclTransport;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct SessionHandle {
    tx: mpsc::Sender<SessionMessage>,
    cancel: CancellationToken,
    task: JoinHandle<DeviceSession>,
}

/// Owns one running session per paired device
///
/// Each session runs on its own task and receives its reports through a
/// bounded queue, so devices never block each other.
pub struct DeviceHub {
    config: BridgeConfig,
    sessions: DashMap<[u8; 8], SessionHandle>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl DeviceHub {
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            sessions: DashMap::new(),
            event_tx,
        }
    }

    /// Subscribe to events from every session
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn contains(&self, ieee: &[u8; 8]) -> bool {
        self.sessions.contains_key(ieee)
    }

    /// Start a session for a newly attached device
    pub fn spawn_session(
        &self,
        device: DeviceIdentity,
        transport: Arc<dyn ZclTransport>,
        host: Arc<dyn CapabilityHost>,
    ) -> Result<(), HubError> {
        let ieee = device.ieee_address;
        let calibration = self.config.calibration_for(&device.model_id);
        let profile = DeviceProfile::for_model(&device.model_id, calibration)
            .ok_or_else(|| HubError::UnknownModel(device.model_id.clone()))?;

        // The shard lock is held until the handle is stored
        let slot = match self.sessions.entry(ieee) {
            Entry::Occupied(_) => return Err(HubError::AlreadyRunning(format_ieee(&ieee))),
            Entry::Vacant(slot) => slot,
        };

        tracing::info!(
            device = %device.ieee_address_string(),
            model = %device.model_id,
            profile = %profile.name,
            "Starting device session"
        );

        let session = DeviceSession::new(device, profile, transport, host)
            .with_options(SessionOptions::from(&self.config))
            .with_events(self.event_tx.clone());
        let cancel = session.teardown_token();
        let (tx, rx) = mpsc::channel(self.config.session_queue_depth.max(1));
        let task = tokio::spawn(session.run(rx));

        slot.insert(SessionHandle { tx, cancel, task });
        Ok(())
    }

    fn sender(&self, ieee: &[u8; 8]) -> Result<mpsc::Sender<SessionMessage>, HubError> {
        self.sessions
            .get(ieee)
            .map(|handle| handle.tx.clone())
            .ok_or_else(|| HubError::UnknownDevice(format_ieee(ieee)))
    }

    async fn send(&self, ieee: &[u8; 8], message: SessionMessage) -> Result<(), HubError> {
        let tx = self.sender(ieee)?;
        tx.send(message)
            .await
            .map_err(|_| HubError::SessionClosed(format_ieee(ieee)))
    }

    /// Deliver an unsolicited attribute report to the owning session
    pub async fn route_report(
        &self,
        ieee: &[u8; 8],
        report: RawAttributeReport,
    ) -> Result<(), HubError> {
        self.send(ieee, SessionMessage::Report(report)).await
    }

    /// Forward a host capability change and wait for the device command
    pub async fn send_command(
        &self,
        ieee: &[u8; 8],
        capability: Capability,
        value: CapabilityValue,
    ) -> Result<(), HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            ieee,
            SessionMessage::Command {
                capability,
                value,
                reply,
            },
        )
        .await?;
        rx.await
            .map_err(|_| HubError::SessionClosed(format_ieee(ieee)))??;
        Ok(())
    }

    pub async fn settings_changed(
        &self,
        ieee: &[u8; 8],
        changed_keys: Vec<String>,
    ) -> Result<(), HubError> {
        self.send(ieee, SessionMessage::SettingsChanged { changed_keys })
            .await
    }

    pub async fn rename(&self, ieee: &[u8; 8], name: String) -> Result<(), HubError> {
        self.send(ieee, SessionMessage::Renamed(name)).await
    }

    pub async fn retry_registrations(&self, ieee: &[u8; 8]) -> Result<(), HubError> {
        self.send(ieee, SessionMessage::RetryRegistrations).await
    }

    /// Device removed by the user; queued reports are handled first
    pub async fn delete(&self, ieee: &[u8; 8]) -> Result<DeviceSession, HubError> {
        self.send(ieee, SessionMessage::Deleted).await?;
        let (_, handle) = self
            .sessions
            .remove(ieee)
            .ok_or_else(|| HubError::UnknownDevice(format_ieee(ieee)))?;
        Ok(handle.task.await?)
    }

    /// Tear a session down immediately; queued reports are discarded
    pub async fn teardown(&self, ieee: &[u8; 8]) -> Result<DeviceSession, HubError> {
        let (_, handle) = self
            .sessions
            .remove(ieee)
            .ok_or_else(|| HubError::UnknownDevice(format_ieee(ieee)))?;
        handle.cancel.cancel();
        Ok(handle.task.await?)
    }

    /// Tear down every session
    pub async fn shutdown(&self) -> Vec<DeviceSession> {
        let keys: Vec<[u8; 8]> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let mut sessions = Vec::with_capacity(keys.len());
        for ieee in keys {
            match self.teardown(&ieee).await {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!(
                    device = %format_ieee(&ieee),
                    error = %e,
                    "Session teardown failed"
                ),
            }
        }
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ias_zone_attrs, AttributeKey, Cluster};
    use crate::error::CommandError;
    use crate::memory::{MemoryHost, MemoryTransport};
    use crate::profile::{MODEL_CENTRALITE_OUTLET, MODEL_SAMJIN_WATER};
    use crate::session::SessionState;

    fn zone_status(raw: i64) -> RawAttributeReport {
        RawAttributeReport::new(
            AttributeKey::new(Cluster::IasZone, ias_zone_attrs::ZONE_STATUS),
            raw,
        )
    }

    #[tokio::test]
    async fn test_reports_routed_by_ieee() {
        let hub = DeviceHub::new(BridgeConfig::default());
        let leak_host = Arc::new(MemoryHost::new());
        let other_host = Arc::new(MemoryHost::new());
        hub.spawn_session(
            DeviceIdentity::new([1; 8], MODEL_SAMJIN_WATER),
            Arc::new(MemoryTransport::new()),
            leak_host.clone(),
        )
        .unwrap();
        hub.spawn_session(
            DeviceIdentity::new([2; 8], MODEL_SAMJIN_WATER),
            Arc::new(MemoryTransport::new()),
            other_host.clone(),
        )
        .unwrap();
        assert_eq!(hub.session_count(), 2);

        hub.route_report(&[1; 8], zone_status(1)).await.unwrap();
        let session = hub.delete(&[1; 8]).await.unwrap();

        assert_eq!(session.state(), SessionState::TornDown);
        assert_eq!(
            leak_host.capability_value(Capability::AlarmWater),
            Some(CapabilityValue::Boolean(true))
        );
        assert_eq!(other_host.capability_value(Capability::AlarmWater), None);
        assert!(!hub.contains(&[1; 8]));
        assert_eq!(hub.shutdown().await.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_rejects_unknown_model_and_duplicates() {
        let hub = DeviceHub::new(BridgeConfig::default());
        let transport = Arc::new(MemoryTransport::new());
        let host = Arc::new(MemoryHost::new());

        let err = hub
            .spawn_session(
                DeviceIdentity::new([3; 8], "lumi.unknown"),
                transport.clone(),
                host.clone(),
            )
            .unwrap_err();
        assert!(matches!(err, HubError::UnknownModel(_)));

        hub.spawn_session(
            DeviceIdentity::new([3; 8], MODEL_SAMJIN_WATER),
            transport.clone(),
            host.clone(),
        )
        .unwrap();
        let err = hub
            .spawn_session(
                DeviceIdentity::new([3; 8], MODEL_SAMJIN_WATER),
                transport,
                host,
            )
            .unwrap_err();
        assert!(matches!(err, HubError::AlreadyRunning(_)));
        hub.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_spawns_keep_one_session() {
        let hub = Arc::new(DeviceHub::new(BridgeConfig::default()));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                hub.spawn_session(
                    DeviceIdentity::new([6; 8], MODEL_SAMJIN_WATER),
                    Arc::new(MemoryTransport::new()),
                    Arc::new(MemoryHost::new()),
                )
            }));
        }

        let mut started = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => started += 1,
                Err(e) => assert!(matches!(e, HubError::AlreadyRunning(_))),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(hub.session_count(), 1);
        assert_eq!(hub.shutdown().await.len(), 1);
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_command_reply() {
        let hub = DeviceHub::new(BridgeConfig::default());
        let transport = Arc::new(MemoryTransport::new());
        let host = Arc::new(MemoryHost::new());
        hub.spawn_session(
            DeviceIdentity::new([4; 8], MODEL_CENTRALITE_OUTLET),
            transport.clone(),
            host.clone(),
        )
        .unwrap();

        hub.send_command(&[4; 8], Capability::OnOff, CapabilityValue::Boolean(true))
            .await
            .unwrap();
        assert_eq!(transport.commands().len(), 1);

        let err = hub
            .send_command(&[4; 8], Capability::MeterPower, CapabilityValue::Number(0.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HubError::Command(CommandError::ReadOnly(Capability::MeterPower))
        ));
        hub.teardown(&[4; 8]).await.unwrap();
    }

    #[tokio::test]
    async fn test_events_are_shared() {
        let hub = DeviceHub::new(BridgeConfig::default());
        let mut events = hub.subscribe();
        hub.spawn_session(
            DeviceIdentity::new([5; 8], MODEL_SAMJIN_WATER),
            Arc::new(MemoryTransport::new()),
            Arc::new(MemoryHost::new()),
        )
        .unwrap();
        hub.route_report(&[5; 8], zone_status(1)).await.unwrap();

        loop {
            if let SessionEvent::CapabilityUpdated {
                ieee_address,
                capability,
                value,
            } = events.recv().await.unwrap()
            {
                assert_eq!(ieee_address, [5; 8]);
                assert_eq!(capability, Capability::AlarmWater);
                assert_eq!(value, CapabilityValue::Boolean(true));
                break;
            }
        }
        hub.teardown(&[5; 8]).await.unwrap();
        assert!(matches!(
            hub.route_report(&[5; 8], zone_status(0)).await,
            Err(HubError::UnknownDevice(_))
        ));
    }
}
