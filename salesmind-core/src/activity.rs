use serde::{Deserialize, Serialize};

use crate::types::ActivityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Info,
    Success,
    Warning,
    Error,
}

/// Activity declared by a script step. Becomes an [`ActivityEvent`] when emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTemplate {
    pub icon: String,
    pub text: String,
    pub category: ActivityCategory,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<u8>,
    #[serde(default)]
    pub highlight: bool,
}

impl ActivityTemplate {
    pub fn new(icon: impl Into<String>, text: impl Into<String>, category: ActivityCategory) -> Self {
        Self {
            icon: icon.into(),
            text: text.into(),
            category,
            detail: None,
            confidence_score: None,
            highlight: false,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_confidence(mut self, score: u8) -> Self {
        self.confidence_score = Some(score.min(100));
        self
    }

    pub fn highlighted(mut self) -> Self {
        self.highlight = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: ActivityId,
    pub icon: String,
    pub text: String,
    pub category: ActivityCategory,
    pub detail: Option<String>,
    pub confidence_score: Option<u8>,
    pub highlight: bool,

    // Display-only recency label, rewritten on every insertion.
    pub age_label: String,
}

impl ActivityEvent {
    pub fn from_template(template: &ActivityTemplate) -> Self {
        Self {
            id: ActivityId::new(),
            icon: template.icon.clone(),
            text: template.text.clone(),
            category: template.category,
            detail: template.detail.clone(),
            confidence_score: template.confidence_score,
            highlight: template.highlight,
            age_label: JUST_NOW.into(),
        }
    }
}

const JUST_NOW: &str = "Just now";

/// Newest-first activity list for one call session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityFeed {
    events: Vec<ActivityEvent>,
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut event: ActivityEvent) {
        event.age_label = JUST_NOW.into();
        self.events.insert(0, event);
        for (i, older) in self.events.iter_mut().enumerate().skip(1) {
            older.age_label = format!("{}s ago", i * 2);
        }
    }

    pub fn events(&self) -> &[ActivityEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest(&self) -> Option<&ActivityEvent> {
        self.events.first()
    }
}
