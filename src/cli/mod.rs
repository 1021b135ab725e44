//! Command-line interface for memo-insight.
//!
//! Uploads a recorded memo and follows its analysis stream, or attaches to
//! an existing session's stream from a cursor.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use crate::config;
use crate::error::StreamError;
use crate::ingest::{InsightSnapshot, StreamEngine};

pub mod render;

pub use render::{format_clock, format_recording_date, to_percentage};

/// memo-insight - Voice memo insight cards from a streaming backend
#[derive(Parser, Debug)]
#[command(name = "memo-insight")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload an audio file and stream its insight card
    Analyze {
        /// Recorded audio file (.m4a, .wav, ...)
        file: PathBuf,

        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resume the event stream of an existing session
    Attach {
        /// Session ID returned by a previous upload
        session_id: String,

        /// Continue after this event id
        #[arg(long)]
        last_event_id: Option<String>,

        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze { file, json } => analyze(&file, json).await,
            Commands::Attach {
                session_id,
                last_event_id,
                json,
            } => attach(&session_id, last_event_id.as_deref(), json).await,
            Commands::Config => show_config(),
        }
    }
}

async fn analyze(file: &Path, json: bool) -> Result<()> {
    let cfg = config::config()?;

    let metadata = std::fs::metadata(file)
        .with_context(|| format!("Audio file not found: {}", file.display()))?;
    if let Ok(modified) = metadata.modified() {
        let recorded: DateTime<Local> = modified.into();
        eprintln!("🎙️  {} ({})", file.display(), format_recording_date(&recorded));
    }

    let engine = StreamEngine::from_config(cfg);
    let started = Instant::now();
    let progress = tokio::spawn(follow_progress(engine.subscribe()));

    let result = engine
        .process_audio_file(&file.to_string_lossy())
        .await;

    progress.abort();
    finish(engine.snapshot(), result, started, json)
}

async fn attach(session_id: &str, last_event_id: Option<&str>, json: bool) -> Result<()> {
    let cfg = config::config()?;

    let engine = StreamEngine::from_config(cfg);
    let started = Instant::now();
    let progress = tokio::spawn(follow_progress(engine.subscribe()));

    let result = engine.resume_stream(session_id, last_event_id).await;

    progress.abort();
    finish(engine.snapshot(), result, started, json)
}

/// Print each new status line to stderr as the document changes
async fn follow_progress(mut changes: watch::Receiver<InsightSnapshot>) {
    let mut last = String::new();
    while changes.changed().await.is_ok() {
        let line = render::render_status(&changes.borrow_and_update().session);
        if line != last {
            eprintln!("   {}", line);
            last = line;
        }
    }
}

fn finish(
    snapshot: InsightSnapshot,
    result: Result<InsightSnapshot, StreamError>,
    started: Instant,
    json: bool,
) -> Result<()> {
    let elapsed = format_clock(started.elapsed().as_secs());

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    match result {
        Ok(done) => {
            if !json {
                println!("\n{}", render::render_card(&done.card));
            }
            eprintln!("\n✅ Insight ready ({})", elapsed);
            Ok(())
        }
        Err(e) => {
            if !json && !snapshot.card.is_empty() {
                println!("\n{}", render::render_card(&snapshot.card));
            }
            if let Some(session_id) = &snapshot.session.session_id {
                eprintln!("   Session: {}", session_id);
            }
            if let Some(cursor) = &snapshot.session.last_event_id {
                eprintln!("   Last event: {}", cursor);
            }
            Err(e).context(format!("Insight generation failed after {}", elapsed))
        }
    }
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("memo-insight configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("API:");
    println!("  Upload:          {}", cfg.api.upload_url());
    println!("  Stream:          {}", cfg.api.stream_url("{session_id}"));
    println!("  Request timeout: {}s", cfg.api.request_timeout_seconds);
    println!();
    let retry = &cfg.stream.retry_policy;
    println!("Stream reconnects:");
    println!("  Max attempts:    {}", retry.max_attempts);
    println!(
        "  Backoff:         {}ms x{} (max {}ms)",
        retry.initial_delay_ms, retry.backoff_multiplier, retry.max_delay_ms
    );
    println!();
    println!("Recording:");
    println!(
        "  Max duration:    {}",
        format_clock(cfg.recording.max_duration_seconds)
    );
    println!("  Waveform bars:   {}", cfg.recording.max_bars);
    println!("  Clock interval:  {}ms", cfg.recording.clock_interval_ms);
    println!("  Meter interval:  {}ms", cfg.recording.metering_interval_ms);

    Ok(())
}
