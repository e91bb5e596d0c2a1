use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use salesmind_core::records::{CallRecord, KnowledgeEntry, NewCallRecord, NewKnowledgeEntry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioCueError {
    #[error("audio cue unavailable: {0}")]
    CueUnavailable(String),
    #[error("audio device error: {0}")]
    Device(String),
    // A `stop()` interrupted playback. Callers treat this as cancellation.
    #[error("playback stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackProgress {
    pub elapsed_ms: u64,
    pub total_ms: u64,
}

#[async_trait]
pub trait AudioCueService: Send + Sync {
    /// Resolves once the cue has played to the end.
    async fn play(&self, cue_id: &str) -> Result<(), AudioCueError>;

    /// Halts any in-flight playback.
    async fn stop(&self);

    fn progress(&self) -> Option<PlaybackProgress> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transcription device error: {0}")]
pub struct TranscriptionDeviceError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionEvent {
    // Unstable text, replaced while the phrase is in progress.
    Interim(String),
    Final(String),
    Error(String),
}

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Idempotent: starting while already listening is a no-op.
    async fn start_listening(&self) -> Result<(), TranscriptionDeviceError>;

    /// Idempotent: stopping while stopped is a no-op.
    async fn stop_listening(&self);

    fn is_listening(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<TranscriptionEvent>;
}

#[derive(Debug, Error)]
#[error("failed to persist {collection}: {message}")]
pub struct PersistenceWriteError {
    pub collection: &'static str,
    pub message: String,
}

/// Durable knowledge and call collections. A failed write still keeps the record in memory.
pub trait KnowledgeStore: Send + Sync {
    fn add_knowledge(&self, entry: NewKnowledgeEntry)
    -> Result<KnowledgeEntry, PersistenceWriteError>;

    fn add_call(&self, call: NewCallRecord) -> Result<CallRecord, PersistenceWriteError>;

    /// Newest first.
    fn knowledge(&self) -> Vec<KnowledgeEntry>;

    /// Newest first.
    fn calls(&self) -> Vec<CallRecord>;
}
