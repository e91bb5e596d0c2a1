// Providers for machines without speakers or a microphone.

use tokio::sync::broadcast;

use salesmind_engine::traits::{
    AudioCueError, AudioCueService, TranscriptionDeviceError, TranscriptionEvent,
    TranscriptionService,
};

/// Reports every cue as unavailable, so the orchestrator falls back to simulated speech.
#[derive(Debug, Default)]
pub struct SilentAudio;

#[async_trait::async_trait]
impl AudioCueService for SilentAudio {
    async fn play(&self, cue_id: &str) -> Result<(), AudioCueError> {
        Err(AudioCueError::CueUnavailable(cue_id.to_string()))
    }

    async fn stop(&self) {}
}

/// Transcription provider for environments without speech capture.
#[derive(Debug)]
pub struct UnsupportedTranscription {
    events: broadcast::Sender<TranscriptionEvent>,
}

impl UnsupportedTranscription {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

impl Default for UnsupportedTranscription {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TranscriptionService for UnsupportedTranscription {
    fn is_supported(&self) -> bool {
        false
    }

    async fn start_listening(&self) -> Result<(), TranscriptionDeviceError> {
        Err(TranscriptionDeviceError(
            "speech capture is not supported".into(),
        ))
    }

    async fn stop_listening(&self) {}

    fn is_listening(&self) -> bool {
        false
    }

    fn subscribe(&self) -> broadcast::Receiver<TranscriptionEvent> {
        self.events.subscribe()
    }
}
