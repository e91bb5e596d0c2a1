use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CallId, KnowledgeId, ScriptKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Escalated,
    Ended,
}

impl CallOutcome {
    pub fn label(self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Escalated => "escalated",
            CallOutcome::Ended => "ended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KnowledgeSource {
    CallEscalation,
    Manual,
}

/// A call as submitted by the orchestrator; the store assigns id and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCallRecord {
    pub lead_name: String,
    pub lead_company: String,
    pub agent_name: String,
    pub duration_seconds: u64,
    pub outcome: CallOutcome,
    pub script_key: ScriptKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallId,
    pub lead_name: String,
    pub lead_company: String,
    pub agent_name: String,
    pub duration_seconds: u64,
    pub outcome: CallOutcome,
    pub created_at: DateTime<Utc>,
    pub script_key: ScriptKey,
}

impl CallRecord {
    pub fn assign(new: NewCallRecord) -> Self {
        Self {
            id: CallId::new(),
            lead_name: new.lead_name,
            lead_company: new.lead_company,
            agent_name: new.agent_name,
            duration_seconds: new.duration_seconds,
            outcome: new.outcome,
            created_at: Utc::now(),
            script_key: new.script_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKnowledgeEntry {
    pub topic: String,
    pub response: String,
    pub question: Option<String>,
    pub source: KnowledgeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: KnowledgeId,
    pub topic: String,
    pub response: String,
    #[serde(default)]
    pub question: Option<String>,
    pub created_at: DateTime<Utc>,
    pub source: KnowledgeSource,
}

impl KnowledgeEntry {
    pub fn assign(new: NewKnowledgeEntry) -> Self {
        Self {
            id: KnowledgeId::new(),
            topic: new.topic,
            response: new.response,
            question: new.question,
            created_at: Utc::now(),
            source: new.source,
        }
    }
}
