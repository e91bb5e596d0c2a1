use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{MessageId, Speaker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub id: MessageId,
    pub speaker: Speaker,
    pub text: String,
    /// Call-relative time as `mm:ss`.
    pub timestamp: String,
}

impl TranscriptMessage {
    pub fn new(speaker: Speaker, text: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            id: MessageId::new(),
            speaker,
            text: text.into(),
            timestamp: format_elapsed(elapsed),
        }
    }
}

/// Formats whole elapsed seconds as `mm:ss`. Minutes keep growing past 59.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Normalizes recognized speech for duplicate detection.
pub fn normalize_utterance(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_elapsed(Duration::from_millis(999)), "00:00");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "01:05");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "60:00");
    }

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_utterance("  Good,   thanks \n"), "Good, thanks");
    }
}
