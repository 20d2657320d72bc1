//! Samjin Bridge - replays captured attribute reports through device sessions

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zcl_reporting::memory::{MemoryHost, MemoryTransport};
use zcl_reporting::{
    load_config, parse_ieee_address, AttributeKey, AttributeValue, Capability, CapabilityValue,
    Cluster, DeviceHub, DeviceIdentity, RawAttributeReport,
};

/// Attribute value the device answers reads with
#[derive(Deserialize)]
struct ScriptAttribute {
    cluster: Cluster,
    attribute: u16,
    value: AttributeValue,
}

#[derive(Deserialize)]
struct ScriptDevice {
    ieee: String,
    model: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    attributes: Vec<ScriptAttribute>,
}

#[derive(Deserialize)]
struct ScriptReport {
    ieee: String,
    cluster: Cluster,
    attribute: u16,
    raw: i64,
}

/// Captured devices and the reports they sent
#[derive(Deserialize)]
struct ReportScript {
    devices: Vec<ScriptDevice>,
    #[serde(default)]
    reports: Vec<ScriptReport>,
}

/// Final capability state of one device
#[derive(Serialize)]
struct DeviceState {
    ieee: String,
    name: String,
    capabilities: BTreeMap<Capability, Option<CapabilityValue>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "samjin_bridge=debug,zcl_reporting=debug,info".into()),
        )
        .init();

    tracing::info!("Starting Samjin Bridge v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
    let config_path = std::env::var("BRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("bridge.json"));
    let script_path = std::env::var("REPORT_SCRIPT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("reports.json"));

    let config = load_config(&config_path).await?;
    let contents = tokio::fs::read_to_string(&script_path)
        .await
        .with_context(|| format!("Failed to read report script {}", script_path.display()))?;
    let script: ReportScript = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid report script {}", script_path.display()))?;

    let hub = DeviceHub::new(config);
    let mut hosts = Vec::new();

    for entry in script.devices {
        let ieee = parse_ieee_address(&entry.ieee)?;
        let transport = Arc::new(MemoryTransport::new());
        for attr in &entry.attributes {
            transport.set_attribute(
                AttributeKey::new(attr.cluster, attr.attribute),
                attr.value.clone(),
            );
        }
        let host = Arc::new(MemoryHost::new());

        let mut device = DeviceIdentity::new(ieee, entry.model);
        device.friendly_name = entry.name;
        let name = device.display_name();

        if let Err(e) = hub.spawn_session(device, transport, host.clone()) {
            tracing::warn!("Skipping device {}: {}", entry.ieee, e);
            continue;
        }
        hosts.push((ieee, name, host));
    }

    tracing::info!(
        "Replaying {} reports across {} devices",
        script.reports.len(),
        hub.session_count()
    );

    for report in script.reports {
        let ieee = parse_ieee_address(&report.ieee)?;
        let raw = RawAttributeReport::new(
            AttributeKey::new(report.cluster, report.attribute),
            report.raw,
        );
        if let Err(e) = hub.route_report(&ieee, raw).await {
            tracing::warn!("Dropping report for {}: {}", report.ieee, e);
        }
    }

    let mut states = Vec::with_capacity(hosts.len());
    for (ieee, name, host) in hosts {
        // Deleting drains the session queue before it stops
        hub.delete(&ieee).await?;
        states.push(DeviceState {
            ieee: zcl_reporting::device::format_ieee(&ieee),
            name,
            capabilities: host.snapshot().into_iter().collect(),
        });
    }

    println!("{}", serde_json::to_string_pretty(&states)?);
    Ok(())
}
