use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ScriptKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallTimings {
    // Settle time before the first step of a call.
    pub initial_delay_ms: u64,
    pub default_activity_delay_ms: u64,
    pub speech_ms_per_char: u64,
    pub max_simulated_speech_ms: u64,
    pub end_prompt_delay_ms: u64,
    pub response_settle_ms: u64,

    // `None` keeps waiting on the user indefinitely.
    pub idle_timeout_ms: Option<u64>,
}

impl Default for CallTimings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 800,
            default_activity_delay_ms: 300,
            speech_ms_per_char: 50,
            max_simulated_speech_ms: 3_000,
            end_prompt_delay_ms: 1_000,
            response_settle_ms: 800,
            idle_timeout_ms: None,
        }
    }
}

impl CallTimings {
    /// Stand-in duration for an utterance whose audio cue cannot be played.
    pub fn simulated_speech(&self, text: &str) -> Duration {
        let chars = text.chars().count() as u64;
        Duration::from_millis(
            chars
                .saturating_mul(self.speech_ms_per_char)
                .min(self.max_simulated_speech_ms),
        )
    }

    pub fn activity_delay(&self, step_delay_ms: Option<u64>) -> Duration {
        Duration::from_millis(step_delay_ms.unwrap_or(self.default_activity_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timings: CallTimings,

    // Directory for the knowledge/call collections. Relative to the config file when unset.
    pub storage_dir: Option<String>,
    pub cue_dir: Option<String>,
    pub default_script: ScriptKey,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timings: CallTimings::default(),
            storage_dir: None,
            cue_dir: None,
            default_script: ScriptKey::new(crate::flows::CALL1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_speech_is_capped() {
        let t = CallTimings::default();
        assert_eq!(t.simulated_speech("Hello"), Duration::from_millis(250));
        assert_eq!(t.simulated_speech(&"x".repeat(500)), Duration::from_millis(3_000));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{"timings": {"response_settle_ms": 10}}"#).unwrap();
        assert_eq!(cfg.timings.response_settle_ms, 10);
        assert_eq!(cfg.timings.initial_delay_ms, 800);
        assert_eq!(cfg.default_script.as_str(), "call1");
    }
}
