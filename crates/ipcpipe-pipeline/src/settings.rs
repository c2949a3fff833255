use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound on how long `close` waits for the receive worker.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Receive-side behaviour of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Drop frames sent before this pipeline was created.
    pub discard_past_messages: bool,
    /// How long `close` waits for the receive worker before detaching it.
    pub shutdown_timeout: Duration,
}

impl PipelineSettings {
    pub fn with_discard_past_messages(mut self, discard: bool) -> Self {
        self.discard_past_messages = discard;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            discard_past_messages: false,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_past_messages() {
        let settings = PipelineSettings::default();
        assert!(!settings.discard_past_messages);
        assert_eq!(settings.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn builders_override_fields() {
        let settings = PipelineSettings::default()
            .with_discard_past_messages(true)
            .with_shutdown_timeout(Duration::from_millis(250));
        assert!(settings.discard_past_messages);
        assert_eq!(settings.shutdown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let settings: PipelineSettings =
            serde_json::from_str(r#"{"discard_past_messages":true}"#).unwrap();
        assert!(settings.discard_past_messages);
        assert_eq!(settings.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }
}
