//! `wren` - turn-gated reading-profile interviews
//!
//! Drives interviews from the terminal and inspects the checkpoints they
//! leave behind.

use anyhow::{bail, Context, Result};
use clap::Parser;
use console::Style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent::{OfflineAgent, OPENING_QUESTION};
use crate::cli::{Cli, Commands, SessionCommand};
use wren_core::archive::TranscriptArchive;
use wren_core::checkpoint::{
    CheckpointStore, FileBackend, KvBackend, LatestConsistency, MemoryBackend,
};
use wren_core::config::{BackendKind, WrenConfig};
use wren_core::session::{
    classify_input, ConversationalAgent, Decision, InterviewSession, SessionOrchestrator,
    SessionSnapshot, TurnOutcome, UserInput,
};

mod agent;
mod cli;
mod logging;

/// Main entry point for the interview CLI
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    logging::init_logging(&config.logging)?;

    let store = Arc::new(open_store(&config).await?);
    let orchestrator = SessionOrchestrator::from_config(Arc::clone(&store), &config);

    let result = match cli.command {
        Commands::Interview { session, archive_dir } => {
            let archive_dir = archive_dir.unwrap_or_else(|| default_archive_dir(&config));
            handle_interview(&orchestrator, &config, session, archive_dir).await
        }
        Commands::Turn { session, text } => {
            handle_turn(&orchestrator, &config, &session, &text.join(" ")).await
        }
        Commands::Session { cmd } => handle_session_command(&store, &config, cmd).await,
    };

    if let Err(e) = store.close().await {
        tracing::warn!("Failed to close checkpoint store: {}", e);
    }
    result
}

/// Load config from `--config` or the default locations, then apply
/// environment and command-line overrides
fn load_config(cli: &Cli) -> Result<WrenConfig> {
    let mut config = match &cli.config {
        Some(path) => WrenConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => WrenConfig::load().context("Failed to load configuration")?,
    };

    config.apply_env_overrides();
    if let Some(dir) = &cli.data_dir {
        config.checkpoint.dir = Some(dir.clone());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn open_store(config: &WrenConfig) -> Result<CheckpointStore> {
    let backend: Arc<dyn KvBackend> = match config.checkpoint.backend {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::File => {
            let dir = config.checkpoint.resolve_dir();
            let backend = FileBackend::open(&dir)
                .await
                .with_context(|| format!("Failed to open checkpoint directory {}", dir.display()))?;
            Arc::new(backend)
        }
    };
    Ok(CheckpointStore::from_config(backend, &config.checkpoint))
}

/// Transcripts live next to the checkpoint directory
fn default_archive_dir(config: &WrenConfig) -> PathBuf {
    config
        .checkpoint
        .resolve_dir()
        .parent()
        .map(|p| p.join("sessions"))
        .unwrap_or_else(|| PathBuf::from("./sessions"))
}

fn progress_bar(turn_count: u32, max_turns: u32) -> String {
    format!(
        "{}{} ({}/{})",
        "●".repeat(turn_count as usize),
        "○".repeat(max_turns.saturating_sub(turn_count) as usize),
        turn_count,
        max_turns
    )
}

fn print_agent_message(message: &str) {
    let cyan = Style::new().cyan();
    println!("\n{} {}\n", cyan.apply_to("Agent:"), message);
}

fn print_outcome(outcome: &TurnOutcome, max_turns: u32) {
    let dim = Style::new().dim();
    println!("Progress: {}", progress_bar(outcome.turn_count, max_turns));
    println!("{}", dim.apply_to(&outcome.recommendation));
    if let Some(e) = outcome.persistence_error() {
        let yellow = Style::new().yellow();
        println!("{} {}", yellow.apply_to("⚠"), e.user_message());
    }
}

/// Run an interview over stdin until it reaches a terminal status
async fn handle_interview(
    orchestrator: &SessionOrchestrator,
    config: &WrenConfig,
    session_id: Option<String>,
    archive_dir: PathBuf,
) -> Result<()> {
    let session_id = session_id
        .unwrap_or_else(|| format!("cli_{}", chrono::Local::now().format("%Y%m%d_%H%M%S")));
    let mut session = orchestrator
        .resume(&session_id)
        .await
        .with_context(|| format!("Failed to open session {}", session_id))?;

    let bold = Style::new().bold();
    println!("{}", bold.apply_to("WREN INTERVIEW"));
    println!("Session ID: {}", session_id);

    if session.is_terminal() {
        println!("This interview has already ended ({}).", session.status());
        return Ok(());
    }

    let agent = OfflineAgent::new();
    if session.turn_count() == 0 {
        print_agent_message(OPENING_QUESTION);
    } else {
        agent.resume_at(&session_id, session.turn_count()).await;
        println!("Resuming at {}", progress_bar(session.turn_count(), session.max_turns()));
        if let Some(last) = session.history().last() {
            print_agent_message(&last.content);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("{}", "─".repeat(60));
        println!("Your response (or 'quit' to exit):");

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(line) = line else {
            println!("\nInterview interrupted.");
            let outcome = session.interrupt().await?;
            print_outcome(&outcome, session.max_turns());
            break;
        };

        let input = classify_input(
            &line,
            &config.interview.quit_commands,
            config.interview.max_input_chars,
        );
        let text = match input {
            UserInput::Empty => {
                println!("Please provide a response.");
                continue;
            }
            UserInput::Quit => {
                println!("\nEnding interview early...");
                let outcome = session.quit().await?;
                print_outcome(&outcome, session.max_turns());
                break;
            }
            UserInput::Message { text, truncated } => {
                if truncated {
                    println!(
                        "Response truncated to {} characters",
                        config.interview.max_input_chars
                    );
                }
                text
            }
        };

        let reply = match agent.reply(&session_id, &text).await {
            Ok(reply) => reply,
            Err(e) => {
                println!("Error: {}", e);
                println!("Please try again or type 'quit' to exit.");
                continue;
            }
        };
        let message = reply.message.clone();

        let outcome = session.process_turn(&text, Some(reply)).await?;
        print_agent_message(&message);
        print_outcome(&outcome, session.max_turns());

        if outcome.decision != Decision::Continue {
            println!("\nInterview complete!");
            break;
        }
    }

    archive_transcript(&session, archive_dir).await;
    Ok(())
}

async fn archive_transcript(session: &InterviewSession, archive_dir: PathBuf) {
    let Some(request) = session.summary_request() else {
        return;
    };

    let archive = TranscriptArchive::new(archive_dir);
    match archive.save(&request.session_id, &request.history, &request.metadata).await {
        Ok(path) => println!("✓ Conversation saved to: {}", path.display()),
        Err(e) => println!("⚠ Failed to save conversation: {}", e),
    }
}

/// Process a single turn and print the outcome as JSON
///
/// A quit command ends the session early instead of being recorded as a turn.
async fn handle_turn(
    orchestrator: &SessionOrchestrator,
    config: &WrenConfig,
    session_id: &str,
    raw: &str,
) -> Result<()> {
    let mut session = orchestrator.resume(session_id).await?;

    let text = match classify_input(
        raw,
        &config.interview.quit_commands,
        config.interview.max_input_chars,
    ) {
        UserInput::Empty => bail!("turn text must not be empty"),
        UserInput::Quit => {
            let outcome = session.quit().await?;
            println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
            return Ok(());
        }
        UserInput::Message { text, .. } => text,
    };

    let agent = OfflineAgent::new();
    agent.resume_at(session_id, session.turn_count()).await;
    let reply = agent.reply(session_id, &text).await?;

    let outcome = session.process_turn(&text, Some(reply)).await?;
    let mut json = outcome.to_json();
    if let Some(last) = session.history().last() {
        json["reply"] = serde_json::Value::String(last.content.clone());
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn handle_session_command(
    store: &CheckpointStore,
    config: &WrenConfig,
    cmd: SessionCommand,
) -> Result<()> {
    let ns = config.checkpoint.checkpoint_namespace.as_str();

    match cmd {
        SessionCommand::Show { id, checkpoint } => {
            match store.get(&id, ns, checkpoint.as_deref()).await? {
                Some(stored) => {
                    let json = serde_json::json!({
                        "key": stored.address.key(),
                        "metadata": stored.metadata,
                        "checkpoint": stored.checkpoint.payload,
                    });
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
                None => println!("No checkpoint found for session {}.", id),
            }
        }
        SessionCommand::List { id, limit } => {
            let items = store.list(&id, ns, limit).await?;
            if items.is_empty() {
                println!("No checkpoints found for session {}.", id);
                return Ok(());
            }

            let blue = Style::new().blue().bold();
            let red = Style::new().red();
            println!(
                "{:<30} | {:<6} | {:<12} | {}",
                blue.apply_to("Checkpoint"),
                "Turn",
                "Status",
                "Written"
            );
            println!("{}", "-".repeat(80));
            for item in items {
                match item {
                    Ok(stored) => {
                        let snapshot: Option<SessionSnapshot> = stored.payload_as().ok();
                        println!(
                            "{:<30} | {:<6} | {:<12} | {}",
                            stored.id(),
                            snapshot.as_ref().map(|s| s.turn_count.to_string()).unwrap_or_default(),
                            snapshot
                                .as_ref()
                                .map(|s| s.completion_status.to_string())
                                .unwrap_or_default(),
                            snapshot
                                .as_ref()
                                .map(|s| s.updated_at.format("%Y-%m-%d %H:%M:%S").to_string())
                                .unwrap_or_default()
                        );
                    }
                    Err(e) => println!("{}", red.apply_to(format!("unreadable checkpoint: {}", e))),
                }
            }
        }
        SessionCommand::Delete { id } => {
            let removed = store.delete_session(&id, ns).await?;
            if removed == 0 {
                println!("No checkpoints found for session {}.", id);
            } else {
                println!("✓ Deleted {} keys for session {}.", removed, id);
            }
        }
        SessionCommand::Check { id } => match store.check_latest(&id, ns).await? {
            LatestConsistency::Empty => println!("No checkpoints stored for session {}.", id),
            LatestConsistency::Consistent { id: checkpoint_id } => {
                println!("✓ latest points at the newest checkpoint ({}).", checkpoint_id)
            }
            LatestConsistency::MissingAlias { newest } => {
                println!("⚠ latest is missing; newest checkpoint is {}.", newest)
            }
            LatestConsistency::Stale { latest, newest } => {
                println!("⚠ latest points at {} but the newest checkpoint is {}.", latest, newest)
            }
        },
    }
    Ok(())
}
