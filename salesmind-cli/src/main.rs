use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::Env;

use salesmind_appcore::{CallService, Responder, ScriptSource, StartCallRequest};
use salesmind_core::config::CallTimings;
use salesmind_core::flows;
use salesmind_core::types::{Agent, Lead, ScriptKey, Speaker};
use salesmind_engine::session::{CallSnapshot, KnowledgeCapture};
use salesmind_engine::traits::TranscriptionService;
use salesmind_platform::UnsupportedTranscription;
use salesmind_platform::test::ScriptedTranscription;

/// Headless driver for scripted sales-call playback.
#[derive(Parser, Debug)]
#[command(name = "salesmind", version, about, long_about = None)]
struct Cli {
    /// Config file; the knowledge store lives beside it unless `storage_dir` says otherwise.
    #[arg(long, global = true, default_value = "salesmind/config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a conversation script end to end
    Run(RunCommand),

    /// List recorded calls, newest first
    Calls,

    /// List captured knowledge, newest first
    Knowledge,

    /// Summarize recorded calls
    Stats,

    /// Add a knowledge entry by hand
    Learn {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        response: String,
        #[arg(long)]
        question: Option<String>,
    },

    /// List the built-in scripts
    Scripts,
}

#[derive(Parser, Debug)]
struct RunCommand {
    /// Built-in script key (defaults to `default_script` from the config)
    #[arg(long, conflicts_with = "script_file")]
    script: Option<String>,

    /// JSON script to play instead of a built-in one
    #[arg(long)]
    script_file: Option<PathBuf>,

    #[arg(long, default_value = "Sarah Chen")]
    lead: String,

    #[arg(long, default_value = "MedTech Solutions")]
    company: String,

    #[arg(long)]
    industry: Option<String>,

    #[arg(long, default_value = "Agent Alpha")]
    agent: String,

    /// Quick response to pick at every wait (clamped to the last one)
    #[arg(long, default_value_t = 0)]
    choice: usize,

    /// Spoken customer phrases, one per wait; quick responses cover the rest
    #[arg(long = "say")]
    say: Vec<String>,

    /// Topic to record if the agent escalates
    #[arg(long, requires = "response")]
    topic: Option<String>,

    /// Answer to record if the agent escalates
    #[arg(long, requires = "topic")]
    response: Option<String>,

    /// Skip all pacing delays
    #[arg(long)]
    fast: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(cmd) => run(cli.config, cmd).await,
        Commands::Calls => {
            let svc = CallService::open(cli.config, Arc::new(UnsupportedTranscription::new()))?;
            let calls = svc.calls();
            if calls.is_empty() {
                println!("no calls recorded");
            }
            for call in calls {
                println!(
                    "{}  {:<9}  {:>4}s  {} ({}) with {}  [{}]",
                    call.created_at.format("%Y-%m-%d %H:%M:%S"),
                    call.outcome.label(),
                    call.duration_seconds,
                    call.lead_name,
                    call.lead_company,
                    call.agent_name,
                    call.script_key
                );
            }
            Ok(())
        }
        Commands::Stats => {
            let svc = CallService::open(cli.config, Arc::new(UnsupportedTranscription::new()))?;
            let stats = svc.stats();
            println!("total calls        {}", stats.total_calls);
            println!("successful         {}", stats.successful);
            println!("escalated          {}", stats.escalated);
            println!("success rate       {}%", stats.success_rate);
            println!("average duration   {}", stats.average_duration_label());
            println!("knowledge entries  {}", stats.knowledge_entries);
            Ok(())
        }
        Commands::Knowledge => {
            let svc = CallService::open(cli.config, Arc::new(UnsupportedTranscription::new()))?;
            let entries = svc.knowledge();
            if entries.is_empty() {
                println!("no knowledge captured");
            }
            for entry in entries {
                println!("{} [{:?}]", entry.topic, entry.source);
                if let Some(q) = &entry.question {
                    println!("  Q: {q}");
                }
                println!("  A: {}", entry.response);
            }
            Ok(())
        }
        Commands::Learn {
            topic,
            response,
            question,
        } => {
            let svc = CallService::open(cli.config, Arc::new(UnsupportedTranscription::new()))?;
            let entry = svc.add_manual_knowledge(&topic, &response, question.as_deref())?;
            println!("saved {}", entry.topic);
            Ok(())
        }
        Commands::Scripts => {
            for key in flows::builtin_keys() {
                if let Some(script) = flows::builtin(key) {
                    println!("{key:<8} {} steps  {}", script.len(), script.title);
                }
            }
            Ok(())
        }
    }
}

async fn run(config: PathBuf, cmd: RunCommand) -> anyhow::Result<()> {
    let speech = !cmd.say.is_empty();
    let transcription: Arc<dyn TranscriptionService> = if speech {
        Arc::new(ScriptedTranscription::new(
            cmd.say.clone(),
            Duration::from_millis(600),
        ))
    } else {
        Arc::new(UnsupportedTranscription::new())
    };

    let fast = cmd.fast;
    let svc = CallService::open_with(config, transcription, |cfg| {
        if fast {
            cfg.timings = CallTimings {
                initial_delay_ms: 0,
                default_activity_delay_ms: 0,
                speech_ms_per_char: 0,
                max_simulated_speech_ms: 0,
                end_prompt_delay_ms: 0,
                response_settle_ms: 0,
                idle_timeout_ms: cfg.timings.idle_timeout_ms,
            };
        }
    })?;

    let script = match (cmd.script_file, cmd.script) {
        (Some(path), _) => ScriptSource::File(path),
        (None, Some(key)) => ScriptSource::Builtin(ScriptKey::new(key)),
        (None, None) => ScriptSource::Default,
    };
    let mut lead = Lead::new(cmd.lead, cmd.company);
    if let Some(industry) = cmd.industry {
        lead = lead.with_industry(industry);
    }
    let key = svc.start_call(StartCallRequest {
        script,
        lead,
        agent: Agent::new(cmd.agent),
    })?;
    println!("== {key} ==");

    let responder = Responder {
        choice: cmd.choice,
        speech_grace: speech.then(|| Duration::from_secs(5)),
    };
    let mut printer = Printer::default();
    let snap = svc.drive_call(&responder, |s| printer.print(s)).await;

    if snap.escalated() {
        let capture = match (cmd.topic, cmd.response) {
            (Some(topic), Some(response)) => Some(KnowledgeCapture {
                topic,
                response,
                question: None,
            }),
            _ => None,
        };
        let saved = capture.is_some();
        svc.resolve_escalation(capture)?;
        if saved {
            println!("knowledge saved for the next call");
        } else {
            println!("escalation dismissed without new knowledge");
        }
    }

    let done = svc.orchestrator().snapshot();
    match done.outcome {
        Some(outcome) => println!("== {} after {} ==", outcome.label(), done.elapsed_label()),
        None => println!("== {} ==", done.state.label()),
    }
    if let Some(warning) = done.warning {
        println!("warning: {warning}");
    }
    Ok(())
}

// Prints what changed between snapshots.
#[derive(Default)]
struct Printer {
    messages: usize,
    activities: usize,
    warning: Option<String>,
}

impl Printer {
    fn print(&mut self, snap: &CallSnapshot) {
        // Newest activity first.
        let fresh = snap.activities.len().saturating_sub(self.activities);
        for event in snap.activities[..fresh].iter().rev() {
            match event.confidence_score {
                Some(score) => println!("   {} {} ({score}%)", event.icon, event.text),
                None => println!("   {} {}", event.icon, event.text),
            }
        }
        self.activities = snap.activities.len();

        for msg in snap.transcript.iter().skip(self.messages) {
            let who = match msg.speaker {
                Speaker::Agent => "Agent",
                Speaker::Customer => "Customer",
            };
            println!("[{}] {who}: {}", msg.timestamp, msg.text);
        }
        self.messages = snap.transcript.len();

        if snap.warning.is_some() && snap.warning != self.warning {
            self.warning = snap.warning.clone();
            log::warn!("{}", snap.warning.as_deref().unwrap_or_default());
        }
    }
}
