use serde::{Deserialize, Serialize};
use std::time::Duration;

use salesmind_core::activity::ActivityEvent;
use salesmind_core::records::CallOutcome;
use salesmind_core::script::EndKind;
use salesmind_core::transcript::{TranscriptMessage, format_elapsed};
use salesmind_core::types::ScriptKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndState {
    Escalated,
    Succeeded,
    Ended,
}

impl EndState {
    pub fn from_end_kind(kind: Option<EndKind>) -> Self {
        match kind {
            Some(EndKind::Escalate) => EndState::Escalated,
            Some(EndKind::Success) => EndState::Succeeded,
            None => EndState::Ended,
        }
    }

    pub fn outcome(self) -> CallOutcome {
        match self {
            EndState::Escalated => CallOutcome::Escalated,
            EndState::Succeeded => CallOutcome::Success,
            EndState::Ended => CallOutcome::Ended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    Running,
    Speaking,
    WaitingForUser,
    Advancing,
    Ended(EndState),
}

impl CallState {
    pub fn is_live(self) -> bool {
        !matches!(self, CallState::Idle | CallState::Ended(_))
    }

    pub fn label(self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Running => "running",
            CallState::Speaking => "speaking",
            CallState::WaitingForUser => "waiting_for_user",
            CallState::Advancing => "advancing",
            CallState::Ended(EndState::Escalated) => "escalated",
            CallState::Ended(EndState::Succeeded) => "succeeded",
            CallState::Ended(EndState::Ended) => "ended",
        }
    }
}

/// Modal the presentation layer should show after a terminal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPrompt {
    KnowledgeCapture,
    SuccessCelebration,
}

/// Human-supplied answer captured after an escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeCapture {
    pub topic: String,
    pub response: String,
    #[serde(default)]
    pub question: Option<String>,
}

/// Everything the presentation layer renders for a live call.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CallSnapshot {
    pub state: CallState,
    pub script_key: Option<ScriptKey>,
    pub step_index: Option<usize>,
    pub transcript: Vec<TranscriptMessage>,
    pub activities: Vec<ActivityEvent>,
    pub waiting_for_user: bool,
    pub quick_responses: Vec<String>,
    pub is_agent_speaking: bool,
    pub is_listening: bool,
    pub interim_text: String,
    pub elapsed_ms: u64,
    pub prompt: Option<CallPrompt>,

    // Set once the CallRecord for this call has been submitted.
    pub outcome: Option<CallOutcome>,

    // Last non-fatal problem (cue fallback, capture device, persistence).
    pub warning: Option<String>,
}

impl CallSnapshot {
    pub fn elapsed_label(&self) -> String {
        format_elapsed(Duration::from_millis(self.elapsed_ms))
    }

    pub fn escalated(&self) -> bool {
        self.state == CallState::Ended(EndState::Escalated)
    }

    pub fn succeeded(&self) -> bool {
        self.state == CallState::Ended(EndState::Succeeded)
    }

    pub fn ended(&self) -> bool {
        matches!(self.state, CallState::Ended(_))
    }
}

pub fn ms(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}
