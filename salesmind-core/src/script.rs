use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::ActivityTemplate;
use crate::types::{ScriptKey, Speaker};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script has no steps")]
    Empty,
    #[error("step `{step_id}` has no way to proceed (needs wait_for_user, auto_advance_delay_ms or is_end)")]
    NoTransition { step_id: String },
    #[error("step `{step_id}` sets more than one of wait_for_user, auto_advance_delay_ms, is_end")]
    AmbiguousTransition { step_id: String },
    #[error("step `{step_id}` is spoken by the agent but has no text")]
    MissingAgentText { step_id: String },
    #[error("step `{step_id}` has an end kind but is not a terminal step")]
    EndKindWithoutEnd { step_id: String },
    #[error("duplicate step id `{step_id}`")]
    DuplicateStepId { step_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndKind {
    Escalate,
    Success,
}

/// How the engine moves past a step once its activity and speech are done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WaitForUser,
    AutoAdvance { delay_ms: u64 },
    End(Option<EndKind>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversationStep {
    pub id: String,
    #[serde(default)]
    pub speaker: Option<Speaker>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub audio_cue_id: Option<String>,
    #[serde(default)]
    pub activity: Option<ActivityTemplate>,
    /// Falls back to the configured default when unset.
    #[serde(default)]
    pub activity_delay_ms: Option<u64>,
    #[serde(default)]
    pub wait_for_user: bool,
    #[serde(default)]
    pub quick_responses: Vec<String>,
    #[serde(default)]
    pub auto_advance_delay_ms: Option<u64>,
    #[serde(default)]
    pub is_end: bool,
    #[serde(default)]
    pub end_kind: Option<EndKind>,
}

impl ConversationStep {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn agent_says(mut self, text: impl Into<String>) -> Self {
        self.speaker = Some(Speaker::Agent);
        self.text = Some(text.into());
        self
    }

    pub fn with_cue(mut self, cue_id: impl Into<String>) -> Self {
        self.audio_cue_id = Some(cue_id.into());
        self
    }

    pub fn with_activity(mut self, activity: ActivityTemplate) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_activity_delay(mut self, delay_ms: u64) -> Self {
        self.activity_delay_ms = Some(delay_ms);
        self
    }

    pub fn wait_for_user<I, S>(mut self, quick_responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wait_for_user = true;
        self.quick_responses = quick_responses.into_iter().map(Into::into).collect();
        self
    }

    pub fn auto_advance(mut self, delay_ms: u64) -> Self {
        self.auto_advance_delay_ms = Some(delay_ms);
        self
    }

    pub fn end(mut self, kind: EndKind) -> Self {
        self.is_end = true;
        self.end_kind = Some(kind);
        self
    }

    /// Text the agent utters for this step, if any.
    pub fn agent_text(&self) -> Option<&str> {
        match (self.speaker, self.text.as_deref()) {
            (Some(Speaker::Agent), Some(text)) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }

    /// Returns `None` for a step with no transition rule; such a step fails validation.
    pub fn transition(&self) -> Option<Transition> {
        if self.is_end {
            Some(Transition::End(self.end_kind))
        } else if self.wait_for_user {
            Some(Transition::WaitForUser)
        } else {
            self.auto_advance_delay_ms
                .map(|delay_ms| Transition::AutoAdvance { delay_ms })
        }
    }

    pub fn validate(&self) -> Result<(), ScriptError> {
        let rules = [
            self.wait_for_user,
            self.auto_advance_delay_ms.is_some(),
            self.is_end,
        ]
        .into_iter()
        .filter(|set| *set)
        .count();

        match rules {
            0 => {
                return Err(ScriptError::NoTransition {
                    step_id: self.id.clone(),
                });
            }
            1 => {}
            _ => {
                return Err(ScriptError::AmbiguousTransition {
                    step_id: self.id.clone(),
                });
            }
        }

        if self.speaker == Some(Speaker::Agent) && self.agent_text().is_none() {
            return Err(ScriptError::MissingAgentText {
                step_id: self.id.clone(),
            });
        }

        if self.end_kind.is_some() && !self.is_end {
            return Err(ScriptError::EndKindWithoutEnd {
                step_id: self.id.clone(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationScript {
    pub key: ScriptKey,
    #[serde(default)]
    pub title: String,
    pub steps: Vec<ConversationStep>,
}

impl ConversationScript {
    pub fn new(key: impl Into<String>, title: impl Into<String>, steps: Vec<ConversationStep>) -> Self {
        Self {
            key: ScriptKey::new(key),
            title: title.into(),
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&ConversationStep> {
        self.steps.get(index)
    }

    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.steps.is_empty() {
            return Err(ScriptError::Empty);
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(ScriptError::DuplicateStepId {
                    step_id: step.id.clone(),
                });
            }
            step.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityCategory, ActivityTemplate};

    fn wait(id: &str) -> ConversationStep {
        ConversationStep::new(id)
            .agent_says("Hello")
            .wait_for_user(["Hi"])
    }

    #[test]
    fn rejects_empty_script() {
        let script = ConversationScript::new("empty", "", vec![]);
        assert_eq!(script.validate(), Err(ScriptError::Empty));
    }

    #[test]
    fn rejects_step_without_transition() {
        let script = ConversationScript::new(
            "broken",
            "",
            vec![
                wait("greeting"),
                ConversationStep::new("dangling").with_activity(ActivityTemplate::new(
                    "i",
                    "note",
                    ActivityCategory::Info,
                )),
            ],
        );
        assert_eq!(
            script.validate(),
            Err(ScriptError::NoTransition {
                step_id: "dangling".into()
            })
        );
    }

    #[test]
    fn rejects_ambiguous_transition() {
        let step = ConversationStep::new("both")
            .wait_for_user(["ok"])
            .auto_advance(100);
        assert_eq!(
            step.validate(),
            Err(ScriptError::AmbiguousTransition {
                step_id: "both".into()
            })
        );
    }

    #[test]
    fn rejects_agent_step_without_text() {
        let mut step = ConversationStep::new("mute").auto_advance(10);
        step.speaker = Some(Speaker::Agent);
        step.text = Some("   ".into());
        assert!(matches!(
            step.validate(),
            Err(ScriptError::MissingAgentText { .. })
        ));
    }

    #[test]
    fn rejects_end_kind_on_non_terminal_step() {
        let mut step = wait("greeting");
        step.end_kind = Some(EndKind::Success);
        assert!(matches!(
            step.validate(),
            Err(ScriptError::EndKindWithoutEnd { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let script = ConversationScript::new("dup", "", vec![wait("a"), wait("a")]);
        assert_eq!(
            script.validate(),
            Err(ScriptError::DuplicateStepId {
                step_id: "a".into()
            })
        );
    }

    #[test]
    fn transition_prefers_terminal_marker() {
        let end = ConversationStep::new("bye")
            .agent_says("Bye")
            .end(EndKind::Escalate);
        assert_eq!(end.transition(), Some(Transition::End(Some(EndKind::Escalate))));
        assert_eq!(
            ConversationStep::new("x").auto_advance(5).transition(),
            Some(Transition::AutoAdvance { delay_ms: 5 })
        );
        assert_eq!(ConversationStep::new("x").transition(), None);
    }

    #[test]
    fn parses_minimal_json_step() {
        let raw = r#"{
            "key": "tiny",
            "steps": [
                {"id": "hello", "speaker": "agent", "text": "Hi!", "wait_for_user": true,
                 "quick_responses": ["Hey"]},
                {"id": "bye", "is_end": true, "end_kind": "success"}
            ]
        }"#;
        let script: ConversationScript = serde_json::from_str(raw).unwrap();
        script.validate().unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(script.steps[0].agent_text(), Some("Hi!"));
        assert_eq!(script.steps[1].end_kind, Some(EndKind::Success));
    }
}
