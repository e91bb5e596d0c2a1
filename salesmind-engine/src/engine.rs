use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use salesmind_core::activity::{ActivityEvent, ActivityFeed};
use salesmind_core::config::CallTimings;
use salesmind_core::records::{CallOutcome, KnowledgeSource, NewCallRecord, NewKnowledgeEntry};
use salesmind_core::script::{ConversationScript, ConversationStep, ScriptError, Transition};
use salesmind_core::transcript::{TranscriptMessage, normalize_utterance};
use salesmind_core::types::{Agent, Lead, Speaker};

use crate::session::{CallPrompt, CallSnapshot, CallState, EndState, KnowledgeCapture, ms};
use crate::traits::{
    AudioCueError, AudioCueService, KnowledgeStore, TranscriptionEvent, TranscriptionService,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid script: {0}")]
    InvalidScript(#[from] ScriptError),
    #[error("a call is already in progress")]
    CallInProgress,
    #[error("no escalation is waiting for knowledge capture")]
    NoPendingEscalation,
    #[error("knowledge capture needs a topic and a response")]
    IncompleteCapture,
}

struct Session {
    generation: u64,
    script: Arc<ConversationScript>,
    lead: Lead,
    agent: Agent,
    started_at: Instant,
    ended_at: Option<Instant>,
    cancel: CancellationToken,
    // Child of `cancel` for the transcript listener and idle timer; cancelled at any terminal state.
    background: CancellationToken,

    // At-most-once guard: highest step index whose processing has begun.
    last_started: Option<usize>,
    waiting_on: Option<usize>,
    last_final: Option<String>,

    pending_escalation: bool,
    record_submitted: bool,

    feed: ActivityFeed,
    snap: CallSnapshot,
}

impl Session {
    fn elapsed(&self) -> Duration {
        self.ended_at
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.started_at)
    }

    fn finish(&mut self, end: EndState) {
        self.snap.state = CallState::Ended(end);
        self.snap.waiting_for_user = false;
        self.snap.quick_responses.clear();
        self.snap.is_agent_speaking = false;
        self.snap.interim_text.clear();
        self.waiting_on = None;
        self.ended_at.get_or_insert_with(Instant::now);
        self.background.cancel();
    }

    // Marks the single CallRecord for this call as submitted and returns it.
    fn take_call_record(&mut self, outcome: CallOutcome) -> Option<NewCallRecord> {
        if self.record_submitted {
            return None;
        }
        self.record_submitted = true;
        self.pending_escalation = false;
        self.snap.outcome = Some(outcome);
        Some(NewCallRecord {
            lead_name: self.lead.name.clone(),
            lead_company: self.lead.company.clone(),
            agent_name: self.agent.name.clone(),
            duration_seconds: self.elapsed().as_secs(),
            outcome,
            script_key: self.script.key.clone(),
        })
    }
}

#[derive(Default)]
struct Inner {
    generation: u64,
    session: Option<Session>,
}

struct Shared {
    timings: CallTimings,
    audio: Arc<dyn AudioCueService>,
    transcription: Arc<dyn TranscriptionService>,
    store: Arc<dyn KnowledgeStore>,
    inner: Mutex<Inner>,
    snapshot: watch::Sender<CallSnapshot>,
}

/// Plays a [`ConversationScript`] as a live call.
///
/// All step processing funnels through [`CallOrchestrator::process_step`], which refuses to
/// run a step index twice or to act on a superseded call, so timers and service callbacks
/// may fire late or more than once without duplicating transcript or activity entries.
#[derive(Clone)]
pub struct CallOrchestrator {
    shared: Arc<Shared>,
}

impl CallOrchestrator {
    pub fn new(
        timings: CallTimings,
        audio: Arc<dyn AudioCueService>,
        transcription: Arc<dyn TranscriptionService>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        let (snapshot, _) = watch::channel(CallSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                timings,
                audio,
                transcription,
                store,
                inner: Mutex::new(Inner::default()),
                snapshot,
            }),
        }
    }

    pub fn timings(&self) -> &CallTimings {
        &self.shared.timings
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.shared.store
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let inner = self.lock();
        match inner.session.as_ref() {
            Some(session) => render(session),
            None => CallSnapshot::default(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Waits until the published snapshot satisfies `pred`.
    pub async fn wait_for(&self, mut pred: impl FnMut(&CallSnapshot) -> bool) -> CallSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(|snap| pred(snap)).await {
            Ok(snap) => snap.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Begins playback of `script`. Step 0 runs after the configured initial delay.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        script: ConversationScript,
        lead: Lead,
        agent: Agent,
    ) -> Result<(), EngineError> {
        script.validate()?;

        let (generation, cancel, background) = {
            let mut inner = self.lock();
            if let Some(old) = inner.session.as_ref() {
                if old.snap.state.is_live() || old.pending_escalation {
                    return Err(EngineError::CallInProgress);
                }
                old.cancel.cancel();
            }

            inner.generation += 1;
            let generation = inner.generation;
            let cancel = CancellationToken::new();
            let background = cancel.child_token();
            let key = script.key.clone();
            let mut session = Session {
                generation,
                script: Arc::new(script),
                lead,
                agent,
                started_at: Instant::now(),
                ended_at: None,
                cancel: cancel.clone(),
                background: background.clone(),
                last_started: None,
                waiting_on: None,
                last_final: None,
                pending_escalation: false,
                record_submitted: false,
                feed: ActivityFeed::new(),
                snap: CallSnapshot::default(),
            };
            session.snap.state = CallState::Running;
            session.snap.script_key = Some(key);
            log::info!(
                "call started: script={} lead={} agent={}",
                session.script.key,
                session.lead.name,
                session.agent.name
            );
            self.publish(&session);
            inner.session = Some(session);
            (generation, cancel, background)
        };

        if self.shared.transcription.is_supported() {
            self.spawn_transcript_listener(generation, background);
        }

        let delay = Duration::from_millis(self.shared.timings.initial_delay_ms);
        self.schedule_step(generation, 0, delay, cancel);
        Ok(())
    }

    /// The single entry point for running a step of the current call.
    ///
    /// Safe to call repeatedly for the same index: only the first call performs the step's
    /// effects. Auto-advancing steps continue into their successors from here.
    pub async fn process_step(&self, index: usize) {
        let generation = self.lock().generation;
        self.run_from(generation, index).await;
    }

    /// Typed or quick-response reply. Ignored unless the call is waiting on the user.
    pub async fn submit_user_response(&self, text: &str) -> bool {
        self.accept_response(None, text, false).await
    }

    /// Finalized speech from the transcription service. Repeats of the last accepted
    /// phrase are dropped before the waiting check.
    pub async fn submit_transcript(&self, text: &str) -> bool {
        self.accept_response(None, text, true).await
    }

    /// Halts the call from any state. Obsolete timers and playback resolve into nothing.
    pub async fn end_call(&self) {
        self.end_call_inner(None).await;
    }

    /// Saves the knowledge captured for a pending escalation, then records the call.
    pub fn capture_knowledge(&self, capture: KnowledgeCapture) -> Result<(), EngineError> {
        let topic = capture.topic.trim();
        let response = capture.response.trim();
        if topic.is_empty() || response.is_empty() {
            return Err(EngineError::IncompleteCapture);
        }

        let (generation, record) = self.resolve_escalation()?;

        let entry = NewKnowledgeEntry {
            topic: topic.to_string(),
            response: response.to_string(),
            question: capture
                .question
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            source: KnowledgeSource::CallEscalation,
        };
        match self.shared.store.add_knowledge(entry) {
            Ok(saved) => log::info!("knowledge captured: topic={}", saved.topic),
            Err(e) => self.warn(generation, e.to_string()),
        }

        if let Some(record) = record {
            self.persist_call(generation, record);
        }
        Ok(())
    }

    /// Closes a pending escalation without saving knowledge. The call is still recorded.
    pub fn dismiss_knowledge(&self) -> Result<(), EngineError> {
        let (generation, record) = self.resolve_escalation()?;
        if let Some(record) = record {
            self.persist_call(generation, record);
        }
        Ok(())
    }

    fn resolve_escalation(&self) -> Result<(u64, Option<NewCallRecord>), EngineError> {
        let mut inner = self.lock();
        let session = inner
            .session
            .as_mut()
            .filter(|s| s.pending_escalation && !s.record_submitted)
            .ok_or(EngineError::NoPendingEscalation)?;

        session.cancel.cancel();
        session.snap.prompt = None;
        let record = session.take_call_record(CallOutcome::Escalated);
        self.publish(session);
        Ok((session.generation, record))
    }

    async fn run_from(&self, generation: u64, index: usize) {
        let mut next = Some(index);
        while let Some(index) = next {
            next = self.run_step(generation, index).await;
        }
    }

    // Returns the index to continue with immediately, if any.
    async fn run_step(&self, generation: u64, index: usize) -> Option<usize> {
        let begin = {
            let mut inner = self.lock();
            let Some(session) = live_session(&mut inner, generation) else {
                log::debug!("discarding step {index}: call {generation} is no longer live");
                return None;
            };
            if session.last_started.is_some_and(|last| index <= last) {
                log::debug!("discarding duplicate run of step {index}");
                return None;
            }
            session.last_started = Some(index);

            match session.script.step(index).cloned() {
                Some(step) => {
                    session.snap.step_index = Some(index);
                    session.snap.state = CallState::Running;
                    log::info!("step {index}: {}", step.id);
                    self.publish(session);
                    Some((step, session.cancel.clone()))
                }
                None => {
                    log::warn!("script {} ran past its last step", session.script.key);
                    None
                }
            }
        };

        let Some((step, cancel)) = begin else {
            self.reach_terminal(generation, EndState::Ended).await;
            return None;
        };

        // 1) activity
        if let Some(template) = &step.activity {
            let delay = self.shared.timings.activity_delay(step.activity_delay_ms);
            if !sleep_or_cancel(&cancel, delay).await {
                return None;
            }
            self.update(generation, |s| s.feed.push(ActivityEvent::from_template(template)))?;
        }

        // 2) agent speech
        if let Some(text) = step.agent_text() {
            self.update(generation, |s| {
                s.snap.state = CallState::Speaking;
                s.snap.is_agent_speaking = true;
            })?;

            if !self.speak(&cancel, step.audio_cue_id.as_deref(), text).await {
                return None;
            }

            self.update(generation, |s| {
                s.snap.state = CallState::Running;
                s.snap.is_agent_speaking = false;
                let msg = TranscriptMessage::new(Speaker::Agent, text, s.elapsed());
                s.snap.transcript.push(msg);
            })?;
        }

        // 3) transition
        match step.transition() {
            Some(Transition::End(kind)) => {
                self.reach_terminal(generation, EndState::from_end_kind(kind)).await;
                None
            }
            Some(Transition::WaitForUser) => {
                self.begin_waiting(generation, index, &step).await;
                None
            }
            Some(Transition::AutoAdvance { delay_ms }) => {
                self.update(generation, |s| s.snap.state = CallState::Advancing)?;
                if !sleep_or_cancel(&cancel, Duration::from_millis(delay_ms)).await {
                    return None;
                }
                Some(index + 1)
            }
            None => {
                log::warn!("step {} has no transition rule; advancing", step.id);
                Some(index + 1)
            }
        }
    }

    // Returns false when the call was cancelled before the utterance finished.
    async fn speak(&self, cancel: &CancellationToken, cue: Option<&str>, text: &str) -> bool {
        if let Some(cue) = cue {
            let played = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                res = self.shared.audio.play(cue) => res,
            };
            match played {
                Ok(()) => return true,
                Err(AudioCueError::Stopped) => return !cancel.is_cancelled(),
                Err(e) => log::warn!("{e}; simulating speech for cue {cue}"),
            }
        }
        sleep_or_cancel(cancel, self.shared.timings.simulated_speech(text)).await
    }

    async fn reach_terminal(&self, generation: u64, end: EndState) {
        let record = self.update(generation, |s| {
            s.finish(end);
            log::info!("call reached terminal state: {}", s.snap.state.label());
            match end {
                EndState::Escalated => {
                    s.pending_escalation = true;
                    None
                }
                EndState::Succeeded | EndState::Ended => s.take_call_record(end.outcome()),
            }
        });
        let Some(record) = record else {
            return;
        };

        if self.shared.transcription.is_supported() {
            self.shared.transcription.stop_listening().await;
        }
        if let Some(record) = record {
            self.persist_call(generation, record);
        }

        let prompt = match end {
            EndState::Escalated => CallPrompt::KnowledgeCapture,
            EndState::Succeeded => CallPrompt::SuccessCelebration,
            EndState::Ended => return,
        };

        let Some(cancel) = self.update(generation, |s| s.cancel.clone()) else {
            return;
        };
        let delay = Duration::from_millis(self.shared.timings.end_prompt_delay_ms);
        if sleep_or_cancel(&cancel, delay).await {
            self.update(generation, |s| s.snap.prompt = Some(prompt));
        }
    }

    async fn begin_waiting(&self, generation: u64, index: usize, step: &ConversationStep) {
        let supported = self.shared.transcription.is_supported();
        let listen = self.update(generation, |s| {
            s.snap.state = CallState::WaitingForUser;
            s.snap.waiting_for_user = true;
            s.snap.quick_responses = step.quick_responses.clone();
            s.waiting_on = Some(index);
            (supported && !s.snap.is_agent_speaking, s.background.clone())
        });
        let Some((listen, cancel)) = listen else {
            return;
        };

        if let Some(timeout_ms) = self.shared.timings.idle_timeout_ms {
            let this = self.clone();
            tokio::spawn(async move {
                if sleep_or_cancel(&cancel, Duration::from_millis(timeout_ms)).await {
                    this.end_call_inner(Some((generation, index))).await;
                }
            });
        }

        if listen {
            self.start_listening(generation).await;
        }
    }

    async fn start_listening(&self, generation: u64) {
        match self.shared.transcription.start_listening().await {
            Ok(()) => {
                let still_waiting = self.update(generation, |s| {
                    let waiting = s.snap.state == CallState::WaitingForUser;
                    s.snap.is_listening = waiting;
                    waiting
                });
                // A quick response may have landed while the device was starting.
                if still_waiting != Some(true) {
                    self.shared.transcription.stop_listening().await;
                }
            }
            Err(e) => {
                log::warn!("{e}; falling back to quick responses");
                self.update(generation, |s| {
                    s.snap.is_listening = false;
                    s.snap.warning = Some(e.to_string());
                });
            }
        }
    }

    fn spawn_transcript_listener(&self, generation: u64, cancel: CancellationToken) {
        let mut events = self.shared.transcription.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    ev = events.recv() => ev,
                };
                match event {
                    Ok(TranscriptionEvent::Interim(text)) => {
                        this.update(generation, |s| {
                            if s.snap.state == CallState::WaitingForUser {
                                s.snap.interim_text = text;
                            }
                        });
                    }
                    Ok(TranscriptionEvent::Final(text)) => {
                        this.accept_response(Some(generation), &text, true).await;
                    }
                    Ok(TranscriptionEvent::Error(message)) => {
                        log::warn!("transcription error: {message}");
                        this.shared.transcription.stop_listening().await;
                        this.update(generation, |s| {
                            s.snap.is_listening = false;
                            s.snap.interim_text.clear();
                            s.snap.warning = Some(format!("speech capture stopped: {message}"));
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("transcript listener lagged by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn accept_response(&self, generation: Option<u64>, text: &str, from_speech: bool) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let accepted = {
            let mut inner = self.lock();
            let Some(session) = inner.session.as_mut() else {
                return false;
            };
            if generation.is_some_and(|g| g != session.generation)
                || session.cancel.is_cancelled()
            {
                return false;
            }

            if from_speech {
                let normalized = normalize_utterance(text);
                if session.last_final.as_deref() == Some(normalized.as_str()) {
                    log::debug!("dropping repeated transcript: {normalized}");
                    return false;
                }
                if session.snap.state == CallState::WaitingForUser {
                    session.last_final = Some(normalized);
                }
            }

            if session.snap.state != CallState::WaitingForUser {
                log::debug!("ignoring response while {}", session.snap.state.label());
                return false;
            }
            let Some(index) = session.waiting_on.take() else {
                return false;
            };

            let msg = TranscriptMessage::new(Speaker::Customer, text, session.elapsed());
            session.snap.transcript.push(msg);
            session.snap.state = CallState::Advancing;
            session.snap.waiting_for_user = false;
            session.snap.quick_responses.clear();
            session.snap.interim_text.clear();
            self.publish(session);
            (session.generation, index + 1, session.cancel.clone())
        };

        let (generation, next, cancel) = accepted;
        if self.shared.transcription.is_supported() {
            self.shared.transcription.stop_listening().await;
            self.update(generation, |s| s.snap.is_listening = false);
        }

        let settle = Duration::from_millis(self.shared.timings.response_settle_ms);
        self.schedule_step(generation, next, settle, cancel);
        true
    }

    // `only_if_waiting` restricts the hang-up to a call still idle at that step.
    async fn end_call_inner(&self, only_if_waiting: Option<(u64, usize)>) {
        let ended = {
            let mut inner = self.lock();
            let Some(session) = inner.session.as_mut() else {
                return;
            };
            if session.cancel.is_cancelled() {
                return;
            }
            if let Some((generation, index)) = only_if_waiting {
                if session.generation != generation || session.waiting_on != Some(index) {
                    return;
                }
                log::info!("no response for step {index}; ending call");
            }

            session.cancel.cancel();
            let outcome = if session.pending_escalation {
                CallOutcome::Escalated
            } else {
                CallOutcome::Ended
            };
            if session.snap.state.is_live() {
                session.finish(EndState::Ended);
            }
            session.snap.prompt = None;
            session.snap.is_listening = false;
            let record = session.take_call_record(outcome);
            log::info!("call ended by user after {}s", session.elapsed().as_secs());
            self.publish(session);
            (session.generation, record)
        };

        let (generation, record) = ended;
        self.shared.audio.stop().await;
        if self.shared.transcription.is_supported() {
            self.shared.transcription.stop_listening().await;
        }
        if let Some(record) = record {
            self.persist_call(generation, record);
        }
    }

    fn persist_call(&self, generation: u64, record: NewCallRecord) {
        match self.shared.store.add_call(record) {
            Ok(saved) => log::info!(
                "call recorded: outcome={} duration={}s",
                saved.outcome.label(),
                saved.duration_seconds
            ),
            Err(e) => self.warn(generation, e.to_string()),
        }
    }

    fn warn(&self, generation: u64, message: String) {
        log::warn!("{message}");
        let mut inner = self.lock();
        if let Some(session) = inner
            .session
            .as_mut()
            .filter(|s| s.generation == generation)
        {
            session.snap.warning = Some(message);
            self.publish(session);
        }
    }

    fn schedule_step(
        &self,
        generation: u64,
        index: usize,
        delay: Duration,
        cancel: CancellationToken,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            if sleep_or_cancel(&cancel, delay).await {
                this.run_from(generation, index).await;
            }
        });
    }

    // Applies `f` to the session only while `generation` is the current, uncancelled call.
    fn update<R>(&self, generation: u64, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut inner = self.lock();
        let session = live_session(&mut inner, generation)?;
        let out = f(session);
        self.publish(session);
        Some(out)
    }

    fn publish(&self, session: &Session) {
        self.shared.snapshot.send_replace(render(session));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn live_session(inner: &mut Inner, generation: u64) -> Option<&mut Session> {
    inner
        .session
        .as_mut()
        .filter(|s| s.generation == generation && !s.cancel.is_cancelled())
}

fn render(session: &Session) -> CallSnapshot {
    let mut snap = session.snap.clone();
    snap.activities = session.feed.events().to_vec();
    snap.elapsed_ms = ms(session.elapsed());
    snap
}

// Returns false if the call was cancelled first.
async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
