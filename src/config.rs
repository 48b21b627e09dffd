use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    data::types::ReportKey, error::CobaltError,
    registry::types::ReleaseStage,
    upload::ENVELOPE_MAX_OBSERVATION_BYTES,
};

/// Settings for the periodic upload cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Tags every envelope.
    pub api_key: String,

    /// Stage of the running build, compared against metric and report
    /// maximum stages.
    pub release_stage: ReleaseStage,

    /// Reports to skip entirely. Their state is left as is.
    pub reports_to_ignore: Vec<ReportKey>,

    /// Whether logging is globally enabled.
    pub enabled: bool,

    pub max_envelope_bytes: u64,
    pub upload_timeout_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            release_stage: ReleaseStage::Ga,
            reports_to_ignore: Vec::new(),
            enabled: true,
            max_envelope_bytes: ENVELOPE_MAX_OBSERVATION_BYTES,
            upload_timeout_ms: 30_000,
        }
    }
}

impl CycleConfig {
    pub fn from_json(json: &str) -> Result<Self, CobaltError> {
        serde_json::from_str(json).map_err(|e| {
            CobaltError::Configuration(format!("invalid cycle config: {e}"))
        })
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn is_ignored(&self, report: &ReportKey) -> bool {
        self.reports_to_ignore.contains(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CycleConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_envelope_bytes, ENVELOPE_MAX_OBSERVATION_BYTES);
        assert_eq!(config.upload_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_json() -> Result<(), anyhow::Error> {
        let config = CycleConfig::from_json(
            r#"{
                "api_key": "12345678",
                "release_stage": "Dogfood",
                "reports_to_ignore": [
                    {"customer_id": 1, "project_id": 1, "metric_id": 1, "report_id": 1}
                ],
                "upload_timeout_ms": 10
            }"#,
        )?;
        assert_eq!(config.api_key, "12345678");
        assert_eq!(config.release_stage, ReleaseStage::Dogfood);
        assert!(config.is_ignored(&ReportKey::new(1, 1, 1, 1)));
        assert!(!config.is_ignored(&ReportKey::new(1, 1, 1, 2)));
        assert_eq!(config.upload_timeout(), Duration::from_millis(10));
        // Unspecified fields keep their defaults.
        assert!(config.enabled);
        Ok(())
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            CycleConfig::from_json("{\"enabled\": \"yes\"}"),
            Err(CobaltError::Configuration(_))
        ));
    }
}
