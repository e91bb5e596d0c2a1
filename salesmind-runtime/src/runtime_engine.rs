use std::path::Path;
use std::sync::Arc;

use salesmind_core::config::AppConfig;
use salesmind_engine::CallOrchestrator;
use salesmind_engine::traits::{AudioCueService, KnowledgeStore, TranscriptionService};
use salesmind_platform::SilentAudio;

use crate::cues::WavCueLibrary;

/// Build a runnable orchestrator from config + providers.
pub fn build_orchestrator(
    cfg: &AppConfig,
    audio: Arc<dyn AudioCueService>,
    transcription: Arc<dyn TranscriptionService>,
    store: Arc<dyn KnowledgeStore>,
) -> CallOrchestrator {
    CallOrchestrator::new(cfg.timings.clone(), audio, transcription, store)
}

/// WAV cues when the directory exists, otherwise silence (speech is simulated).
pub fn cue_service(cue_dir: Option<&Path>) -> Arc<dyn AudioCueService> {
    match cue_dir {
        Some(dir) if dir.is_dir() => {
            log::info!("audio cues from {}", dir.display());
            Arc::new(WavCueLibrary::at_dir(dir))
        }
        Some(dir) => {
            log::warn!("cue directory {} not found; simulating speech", dir.display());
            Arc::new(SilentAudio)
        }
        None => Arc::new(SilentAudio),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_store::LocalKnowledgeStore;
    use salesmind_core::flows;
    use salesmind_core::types::{Agent, Lead};
    use salesmind_platform::UnsupportedTranscription;

    #[tokio::test(start_paused = true)]
    async fn builds_a_working_orchestrator() {
        let mut cfg = AppConfig::default();
        cfg.timings.initial_delay_ms = 0;

        let store = Arc::new(LocalKnowledgeStore::in_memory());
        let orch = build_orchestrator(
            &cfg,
            cue_service(None),
            Arc::new(UnsupportedTranscription::new()),
            store.clone(),
        );
        assert_eq!(orch.timings().initial_delay_ms, 0);

        orch.start(flows::call2(), Lead::new("Sarah Chen", "MedTech"), Agent::new("Agent Beta"))
            .unwrap();
        let snap = orch.wait_for(|s| s.waiting_for_user).await;
        assert_eq!(snap.transcript.len(), 1);
        orch.end_call().await;
        assert_eq!(store.calls().len(), 1);
    }

    #[test]
    fn missing_cue_dir_means_silence() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("cues");
        // Both fall back without error.
        let _ = cue_service(Some(&missing));
        let _ = cue_service(Some(dir.path()));
    }
}
