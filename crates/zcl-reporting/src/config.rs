//! Bridge configuration loaded from a JSON file

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

/// Per-device calibration constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Numerator applied to metering summation reports (over 100)
    pub metering_offset: f64,
    /// Numerator applied to active power reports (over 100)
    pub measure_offset: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            metering_offset: 1.0,
            measure_offset: 1.0,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Coordinator endpoint clusters are bound to
    pub coordinator_endpoint: u8,
    /// Calibration constants keyed by model identifier
    pub calibration: HashMap<String, Calibration>,
    /// Poll attributes whose subscription failed
    pub poll_on_failure: bool,
    /// Capacity of each session's message queue
    pub session_queue_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            coordinator_endpoint: 1,
            calibration: HashMap::new(),
            poll_on_failure: true,
            session_queue_depth: 64,
        }
    }
}

impl BridgeConfig {
    /// Calibration for a model, falling back to defaults
    #[must_use]
    pub fn calibration_for(&self, model_id: &str) -> Calibration {
        self.calibration.get(model_id).copied().unwrap_or_default()
    }
}

/// Load configuration from a JSON file
///
/// A missing file yields the defaults.
pub async fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let config: BridgeConfig = serde_json::from_str(&contents)?;
            tracing::info!("Loaded bridge config from {:?}", path);
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file found at {:?}, using defaults", path);
            Ok(BridgeConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{"calibration": {"3200-Sgb": {"metering_offset": 2.5}}}"#,
        )
        .unwrap();
        assert_eq!(config.coordinator_endpoint, 1);
        assert!(config.poll_on_failure);
        let cal = config.calibration_for("3200-Sgb");
        assert_eq!(cal.metering_offset, 2.5);
        assert_eq!(cal.measure_offset, 1.0);
        assert_eq!(config.calibration_for("unknown"), Calibration::default());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let path = std::env::temp_dir().join("zcl-reporting-missing-config.json");
        let _ = tokio::fs::remove_file(&path).await;
        let config = load_config(&path).await.unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[tokio::test]
    async fn test_load_invalid_file() {
        let path = std::env::temp_dir().join(format!(
            "zcl-reporting-invalid-config-{}.json",
            std::process::id()
        ));
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let result = load_config(&path).await;
        assert!(matches!(result, Err(ConfigError::Json(_))));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
