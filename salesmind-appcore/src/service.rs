use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use salesmind_core::config::AppConfig;
use salesmind_core::records::{CallRecord, KnowledgeEntry, KnowledgeSource, NewKnowledgeEntry};
use salesmind_core::script::ConversationScript;
use salesmind_core::stats::CallStats;
use salesmind_core::types::{Agent, Lead, ScriptKey};
use salesmind_engine::CallOrchestrator;
use salesmind_engine::session::{CallSnapshot, KnowledgeCapture};
use salesmind_engine::traits::{AudioCueService, KnowledgeStore, TranscriptionService};

use salesmind_runtime::config_store::ConfigStore;
use salesmind_runtime::knowledge_store::LocalKnowledgeStore;
use salesmind_runtime::runtime_engine::{build_orchestrator, cue_service};
use salesmind_runtime::script_file::{builtin_script, load_script_file};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptSource {
    // `default_script` from the config.
    #[default]
    Default,
    Builtin(ScriptKey),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCallRequest {
    #[serde(default)]
    pub script: ScriptSource,
    pub lead: Lead,
    pub agent: Agent,
}

/// How [`CallService::drive_call`] answers when the call waits on the customer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Responder {
    /// Index into the step's quick responses, clamped to the last one.
    pub choice: usize,

    /// Give speech this long to answer before falling back to a quick response.
    pub speech_grace: Option<Duration>,
}

#[derive(Clone)]
pub struct CallService {
    config_store: ConfigStore,
    config: AppConfig,
    store: Arc<dyn KnowledgeStore>,
    orchestrator: CallOrchestrator,
}

impl CallService {
    /// Loads config and opens the on-disk knowledge store beside it.
    pub fn open(
        config_path: PathBuf,
        transcription: Arc<dyn TranscriptionService>,
    ) -> anyhow::Result<Self> {
        Self::open_with(config_path, transcription, |_| {})
    }

    /// Like [`CallService::open`], with `adjust` applied to the loaded config (not saved).
    pub fn open_with(
        config_path: PathBuf,
        transcription: Arc<dyn TranscriptionService>,
        adjust: impl FnOnce(&mut AppConfig),
    ) -> anyhow::Result<Self> {
        let config_store = ConfigStore::at_path(config_path);
        let mut config = config_store.load()?;
        adjust(&mut config);

        let storage_dir = config_store.storage_dir(&config);
        let store: Arc<dyn KnowledgeStore> = Arc::new(LocalKnowledgeStore::open_dir(storage_dir)?);
        let audio = cue_service(config_store.cue_dir(&config).as_deref());

        Ok(Self::with_providers(
            config_store,
            config,
            audio,
            transcription,
            store,
        ))
    }

    pub fn with_providers(
        config_store: ConfigStore,
        config: AppConfig,
        audio: Arc<dyn AudioCueService>,
        transcription: Arc<dyn TranscriptionService>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        let orchestrator = build_orchestrator(&config, audio, transcription, store.clone());
        Self {
            config_store,
            config,
            store,
            orchestrator,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn save_config(&self, cfg: &AppConfig) -> anyhow::Result<()> {
        self.config_store.save(cfg)
    }

    pub fn orchestrator(&self) -> &CallOrchestrator {
        &self.orchestrator
    }

    pub fn resolve_script(&self, source: &ScriptSource) -> anyhow::Result<ConversationScript> {
        match source {
            ScriptSource::Default => builtin_script(self.config.default_script.as_str()),
            ScriptSource::Builtin(key) => builtin_script(key.as_str()),
            ScriptSource::File(path) => load_script_file(path),
        }
    }

    pub fn start_call(&self, req: StartCallRequest) -> anyhow::Result<ScriptKey> {
        let script = self.resolve_script(&req.script)?;
        let key = script.key.clone();
        self.orchestrator
            .start(script, req.lead, req.agent)
            .with_context(|| format!("start call with script `{key}`"))?;
        Ok(key)
    }

    /// Answers every wait until the call settles, reporting each published snapshot.
    ///
    /// Settled means ended with its outcome recorded, or ended with a prompt pending.
    pub async fn drive_call(
        &self,
        responder: &Responder,
        mut on_update: impl FnMut(&CallSnapshot),
    ) -> CallSnapshot {
        let mut rx = self.orchestrator.subscribe();
        let mut answered: Option<usize> = None;
        loop {
            let snap = rx.borrow_and_update().clone();
            on_update(&snap);
            if is_settled(&snap) || (!snap.state.is_live() && !snap.ended()) {
                return snap;
            }

            if snap.waiting_for_user && snap.step_index != answered {
                answered = snap.step_index;
                self.respond(&snap, responder).await;
                continue;
            }

            if rx.changed().await.is_err() {
                return self.orchestrator.snapshot();
            }
        }
    }

    async fn respond(&self, snap: &CallSnapshot, responder: &Responder) {
        if let Some(grace) = responder.speech_grace {
            let step = snap.step_index;
            let moved = tokio::time::timeout(
                grace,
                self.orchestrator
                    .wait_for(|s| s.step_index != step || !s.waiting_for_user),
            )
            .await;
            if moved.is_ok() {
                return;
            }
            log::info!("no speech within {}ms; using a quick response", grace.as_millis());
        }

        let Some(last) = snap.quick_responses.len().checked_sub(1) else {
            log::warn!("step offers no quick responses; hanging up");
            self.orchestrator.end_call().await;
            return;
        };
        let reply = &snap.quick_responses[responder.choice.min(last)];
        if !self.orchestrator.submit_user_response(reply).await {
            log::debug!("quick response `{reply}` was not accepted");
        }
    }

    /// Saves `capture` for a pending escalation, or dismisses it when `None`.
    pub fn resolve_escalation(&self, capture: Option<KnowledgeCapture>) -> anyhow::Result<()> {
        match capture {
            Some(capture) => self
                .orchestrator
                .capture_knowledge(capture)
                .context("capture knowledge"),
            None => self
                .orchestrator
                .dismiss_knowledge()
                .context("dismiss knowledge capture"),
        }
    }

    /// Knowledge entered outside of a call.
    pub fn add_manual_knowledge(
        &self,
        topic: &str,
        response: &str,
        question: Option<&str>,
    ) -> anyhow::Result<KnowledgeEntry> {
        let (topic, response) = (topic.trim(), response.trim());
        if topic.is_empty() || response.is_empty() {
            anyhow::bail!("knowledge needs a topic and a response");
        }
        let entry = NewKnowledgeEntry {
            topic: topic.to_string(),
            response: response.to_string(),
            question: question
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string),
            source: KnowledgeSource::Manual,
        };
        Ok(self.store.add_knowledge(entry)?)
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.store.calls()
    }

    pub fn knowledge(&self) -> Vec<KnowledgeEntry> {
        self.store.knowledge()
    }

    pub fn stats(&self) -> CallStats {
        CallStats::from_records(&self.store.calls(), self.store.knowledge().len())
    }
}

fn is_settled(snap: &CallSnapshot) -> bool {
    snap.ended() && (snap.outcome.is_some() || snap.prompt.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesmind_core::records::CallOutcome;
    use salesmind_core::types::Speaker;
    use salesmind_core::flows;
    use salesmind_engine::session::CallPrompt;
    use salesmind_platform::UnsupportedTranscription;
    use salesmind_platform::test::{RecordingAudio, ScriptedTranscription};

    fn request(key: &str) -> StartCallRequest {
        StartCallRequest {
            script: ScriptSource::Builtin(ScriptKey::new(key)),
            lead: Lead::new("Sarah Chen", "MedTech Solutions").with_industry("Healthcare"),
            agent: Agent::new("Agent Alpha"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn escalated_knowledge_is_persisted_beside_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let svc = CallService::open(config_path.clone(), Arc::new(UnsupportedTranscription::new()))
            .unwrap();
        assert_eq!(svc.start_call(request("call1")).unwrap().as_str(), "call1");

        let mut updates = 0;
        let snap = svc.drive_call(&Responder::default(), |_| updates += 1).await;
        assert!(snap.escalated());
        assert_eq!(snap.prompt, Some(CallPrompt::KnowledgeCapture));
        assert!(updates > 1);

        svc.resolve_escalation(Some(KnowledgeCapture {
            topic: "HIPAA Compliance".into(),
            response: "SOC2 Type II, BAAs as standard.".into(),
            question: None,
        }))
        .unwrap();
        assert!(svc.resolve_escalation(None).is_err());

        let reopened =
            CallService::open(config_path, Arc::new(UnsupportedTranscription::new())).unwrap();
        let calls = reopened.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].outcome, CallOutcome::Escalated);
        assert_eq!(calls[0].lead_company, "MedTech Solutions");
        assert_eq!(reopened.knowledge()[0].topic, "HIPAA Compliance");
    }

    #[tokio::test(start_paused = true)]
    async fn spoken_answers_drive_the_success_flow() {
        let phrases = [
            "Yes I have a few minutes",
            "Are you HIPAA compliant",
            "Perfect please send that",
            "This sounds great",
            "Yes this looks perfect",
            "Wednesday works",
        ];
        let svc = CallService::with_providers(
            ConfigStore::at_path("unused/config.json"),
            AppConfig::default(),
            Arc::new(salesmind_platform::SilentAudio),
            Arc::new(ScriptedTranscription::new(phrases, Duration::from_millis(400))),
            Arc::new(LocalKnowledgeStore::in_memory()),
        );
        svc.start_call(request("call2")).unwrap();

        let responder = Responder {
            choice: 0,
            speech_grace: Some(Duration::from_secs(5)),
        };
        let snap = svc.drive_call(&responder, |_| {}).await;
        assert!(snap.succeeded());

        let said: Vec<&str> = snap
            .transcript
            .iter()
            .filter(|m| m.speaker == Speaker::Customer)
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(said, phrases);
        assert_eq!(svc.calls()[0].outcome, CallOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn default_script_comes_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at_path(dir.path().join("config.json"));
        let mut cfg = AppConfig::default();
        cfg.default_script = ScriptKey::new("call2");
        store.save(&cfg).unwrap();

        let svc = CallService::open(store.path().to_path_buf(), Arc::new(UnsupportedTranscription::new()))
            .unwrap();
        let req = StartCallRequest {
            script: ScriptSource::Default,
            ..request("ignored")
        };
        assert_eq!(svc.start_call(req).unwrap().as_str(), "call2");
        assert!(svc.start_call(request("call1")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn built_in_flow_plays_its_cues_in_order() {
        let audio = Arc::new(RecordingAudio::new(Duration::from_millis(200)));
        let svc = CallService::with_providers(
            ConfigStore::at_path("unused/config.json"),
            AppConfig::default(),
            audio.clone(),
            Arc::new(UnsupportedTranscription::new()),
            Arc::new(LocalKnowledgeStore::in_memory()),
        );
        svc.start_call(request("call1")).unwrap();
        let snap = svc.drive_call(&Responder::default(), |_| {}).await;
        assert!(snap.escalated());

        assert_eq!(
            audio.played(),
            [
                "call1_greeting",
                "call1_intro",
                "call1_discovery",
                "call1_feature_pitch",
                "call1_handling_hipaa_unknown",
                "call1_checking",
                "call1_escalate",
                "call1_closing_failed",
            ]
        );
        let scripted: Vec<String> = flows::call1()
            .steps
            .iter()
            .filter_map(|s| s.audio_cue_id.clone())
            .collect();
        assert_eq!(audio.played(), scripted);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_follow_the_recorded_calls() {
        let svc = CallService::with_providers(
            ConfigStore::at_path("unused/config.json"),
            AppConfig::default(),
            Arc::new(salesmind_platform::SilentAudio),
            Arc::new(UnsupportedTranscription::new()),
            Arc::new(LocalKnowledgeStore::in_memory()),
        );
        let empty = svc.stats();
        assert_eq!(empty.total_calls, 0);
        assert_eq!(empty.success_rate, 0);
        assert_eq!(empty.average_duration_label(), "0:00");

        svc.start_call(request("call1")).unwrap();
        svc.drive_call(&Responder::default(), |_| {}).await;
        svc.resolve_escalation(Some(KnowledgeCapture {
            topic: "HIPAA Compliance".into(),
            response: "SOC2 Type II, BAAs as standard.".into(),
            question: None,
        }))
        .unwrap();

        svc.start_call(request("call2")).unwrap();
        let snap = svc.drive_call(&Responder::default(), |_| {}).await;
        assert!(snap.succeeded());
        svc.add_manual_knowledge("Pricing", "Per seat, billed annually.", None)
            .unwrap();

        let stats = svc.stats();
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.escalated, 1);
        assert_eq!(stats.success_rate, 50);
        assert_eq!(stats.knowledge_entries, 2);
        assert!(stats.average_duration_seconds > 0);
    }

    #[test]
    fn manual_knowledge_is_tagged_manual() {
        let svc = CallService::with_providers(
            ConfigStore::at_path("unused/config.json"),
            AppConfig::default(),
            Arc::new(salesmind_platform::SilentAudio),
            Arc::new(UnsupportedTranscription::new()),
            Arc::new(LocalKnowledgeStore::in_memory()),
        );
        let entry = svc
            .add_manual_knowledge(" Pricing ", "Per seat, billed annually.", Some("  "))
            .unwrap();
        assert_eq!(entry.topic, "Pricing");
        assert_eq!(entry.question, None);
        assert_eq!(entry.source, KnowledgeSource::Manual);
        assert!(svc.add_manual_knowledge("", "x", None).is_err());
    }
}
