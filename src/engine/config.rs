use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Engine configuration.
///
/// Every field has a default, so partial JSON documents are accepted.
///
/// ```
/// use statmon::MonitorEngineConfig;
///
/// let cfg = MonitorEngineConfig::from_json_str(r#"{ "interval_unit_ms": 10 }"#).unwrap();
/// assert_eq!(cfg.interval_unit_ms, 10);
/// assert_eq!(cfg.scheduler_thread_name, "statmon-scheduler");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorEngineConfig {
    /// Wall-clock length of one schedule second.
    pub interval_unit_ms: u64,
    /// Max queued scheduler control messages.
    pub scheduler_queue_capacity: usize,
    /// Name of the scheduler thread.
    pub scheduler_thread_name: String,
    /// Buffer capacity of streams created by `MonitorEngine::with_event_stream`.
    pub event_stream_capacity: usize,
}

impl Default for MonitorEngineConfig {
    fn default() -> Self {
        Self {
            interval_unit_ms: 1000,
            scheduler_queue_capacity: 1024,
            scheduler_thread_name: "statmon-scheduler".to_string(),
            event_stream_capacity: 1024,
        }
    }
}

impl MonitorEngineConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(json: &str) -> MonitorResult<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| MonitorError::invalid_argument("config", e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check invariants the engine relies on.
    pub fn validate(&self) -> MonitorResult<()> {
        if self.interval_unit_ms == 0 {
            return Err(MonitorError::invalid_argument(
                "interval_unit_ms",
                "must be greater than zero",
            ));
        }
        if self.scheduler_thread_name.trim().is_empty() {
            return Err(MonitorError::invalid_argument(
                "scheduler_thread_name",
                "must not be blank",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn interval_unit(&self) -> Duration {
        Duration::from_millis(self.interval_unit_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = MonitorEngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.interval_unit(), Duration::from_secs(1));
    }

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = MonitorEngineConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, MonitorEngineConfig::default());
    }

    #[test]
    fn rejects_zero_interval_unit() {
        let err = MonitorEngineConfig::from_json_str(r#"{ "interval_unit_ms": 0 }"#).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = MonitorEngineConfig::from_json_str("{ interval").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn rejects_blank_thread_name() {
        let cfg = MonitorEngineConfig {
            scheduler_thread_name: "  ".to_string(),
            ..MonitorEngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
