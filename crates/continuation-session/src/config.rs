//! Continuation configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wait for the directory service to report completion.
const SCHEDULE_TIMEOUT_MS: u64 = 25_000;

/// Default wait for the peer to answer a reversal request.
const REVERSE_TIMEOUT_MS: u64 = 6_000;

/// Tunables for one ability's continuation machinery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuationConfig {
    /// How long a saved-but-unconfirmed migration may stay in progress.
    pub schedule_timeout_ms: u64,
    /// How long a reversal request may wait for the peer.
    pub reverse_timeout_ms: u64,
    /// Name of the ability's task queue, used in logs.
    pub queue_name: String,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            schedule_timeout_ms: SCHEDULE_TIMEOUT_MS,
            reverse_timeout_ms: REVERSE_TIMEOUT_MS,
            queue_name: "continuation".to_string(),
        }
    }
}

impl ContinuationConfig {
    /// Parse from JSON; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns error on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub const fn schedule_timeout(&self) -> Duration {
        Duration::from_millis(self.schedule_timeout_ms)
    }

    #[must_use]
    pub const fn reverse_timeout(&self) -> Duration {
        Duration::from_millis(self.reverse_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContinuationConfig::default();
        assert_eq!(config.schedule_timeout(), Duration::from_secs(25));
        assert_eq!(config.reverse_timeout(), Duration::from_secs(6));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ContinuationConfig::from_json(r#"{"reverse_timeout_ms": 100}"#).unwrap();
        assert_eq!(config.reverse_timeout_ms, 100);
        assert_eq!(config.schedule_timeout_ms, SCHEDULE_TIMEOUT_MS);
        assert_eq!(config.queue_name, "continuation");
    }

    #[test]
    fn test_malformed_json() {
        assert!(ContinuationConfig::from_json("{").is_err());
    }
}
