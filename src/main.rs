//! Binary entrypoint: loads configuration, starts the engine against the
//! iTunes Search API and drives it from stdin commands.

use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

use tile_rotator::config::Configuration;
use tile_rotator::events::EngineEvent;
use tile_rotator::provider::{ItunesProvider, normalize_query};
use tile_rotator::{Engine, EngineHandle};

#[derive(Debug, Parser)]
#[command(
    name = "tile-rotator",
    version,
    about = "Rotating artwork wall fed by a search provider"
)]
struct Args {
    /// Path to YAML config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Query loaded at startup (overrides initial-query)
    #[arg(long, value_name = "TEXT")]
    query: Option<String>,
    /// Rotation interval, e.g. "2s" or "750ms"
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    /// Deterministic RNG seed for swap selection
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Start rotating as soon as the first pool is installed
    #[arg(long)]
    autoplay: bool,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Play,
    Pause,
    Toggle,
    Stop,
    Refresh(String),
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("tile_rotator={level}").parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let mut cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(query) = args.query {
        cfg.initial_query = query;
    }
    if let Some(interval) = args.interval {
        cfg.rotation_interval = interval;
    }
    if args.seed.is_some() {
        cfg.rng_seed = args.seed;
    }
    cfg.autoplay |= args.autoplay;
    let cfg = cfg.validated().context("invalid configuration values")?;
    debug!("effective configuration:\n{:#?}", cfg);

    let provider = ItunesProvider::new(cfg.provider.clone())
        .context("failed to create search provider")?;
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let (engine, events) = Engine::spawn(&cfg, Arc::new(provider), cancel.clone());
    let handle = engine.handle();
    let sink = tokio::spawn(render_events(events, handle.clone(), cfg.autoplay));

    match normalize_query(&cfg.initial_query) {
        Some(query) => handle.refresh(query).await?,
        None => info!("initial-query is empty; waiting for a refresh command"),
    }

    if io::stdin().is_terminal() {
        info!("commands: play | pause | toggle | refresh <query> | stop");
        let lines = spawn_stdin_reader();
        let handle = handle.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = run_shell(handle, lines, cancel).await {
                warn!("command shell ended: {err:#}");
            }
        });
    } else {
        debug!("stdin is not a terminal; command shell disabled");
    }

    engine.join().await?;
    cancel.cancel();
    sink.await.context("render task failed")?;
    Ok(())
}

/// Reads stdin on a plain thread so a pending read never holds up shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run_shell(
    handle: EngineHandle,
    mut lines: mpsc::Receiver<String>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let line = select! {
            _ = cancel.cancelled() => return Ok(()),
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            info!("stdin closed; initiating shutdown");
            return handle.stop().await;
        };
        match parse_command(&line) {
            None => {}
            Some(ShellCommand::Play) => handle.play().await?,
            Some(ShellCommand::Pause) => handle.pause().await?,
            Some(ShellCommand::Toggle) => handle.toggle_play().await?,
            Some(ShellCommand::Refresh(query)) => handle.refresh(query).await?,
            Some(ShellCommand::Stop) => return handle.stop().await,
        }
    }
}

fn parse_command(line: &str) -> Option<ShellCommand> {
    let line = line.trim();
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match (head.to_ascii_lowercase().as_str(), rest.trim().is_empty()) {
        ("", _) => None,
        ("play", true) => Some(ShellCommand::Play),
        ("pause", true) => Some(ShellCommand::Pause),
        ("toggle", true) => Some(ShellCommand::Toggle),
        ("stop" | "quit" | "exit", true) => Some(ShellCommand::Stop),
        ("refresh", _) => normalize_query(rest).map(ShellCommand::Refresh),
        _ => normalize_query(line).map(ShellCommand::Refresh),
    }
}

/// Stand-in rendering surface: logs what a tile wall would redraw.
async fn render_events(
    mut events: mpsc::Receiver<EngineEvent>,
    handle: EngineHandle,
    autoplay: bool,
) {
    let mut autoplay_pending = autoplay;
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Progress { refresh, fraction } => {
                info!(
                    refresh,
                    percent = (fraction * 100.0).round() as u32,
                    "loading artwork"
                );
            }
            EngineEvent::PoolReplaced(replaced) => {
                info!(
                    generation = replaced.generation,
                    slots = replaced.slots.len(),
                    "wall redrawn"
                );
                for slot in &replaced.slots {
                    debug!(
                        slot = slot.index,
                        record = %slot.record.id(),
                        artwork = slot.record.artwork(),
                        "tile"
                    );
                }
                if autoplay_pending {
                    autoplay_pending = false;
                    if let Err(err) = handle.play().await {
                        warn!("autoplay failed: {err:#}");
                    }
                }
            }
            EngineEvent::Swap(swap) => {
                info!(
                    slot = swap.slot,
                    record = %swap.record.id(),
                    artwork = swap.record.artwork(),
                    "tile replaced"
                );
            }
            EngineEvent::PlayState(state) => info!(state = ?state, "play state"),
            EngineEvent::Error { kind, message } => warn!(kind = ?kind, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_word_commands_are_recognised() {
        assert_eq!(parse_command("play"), Some(ShellCommand::Play));
        assert_eq!(parse_command("  PAUSE "), Some(ShellCommand::Pause));
        assert_eq!(parse_command("toggle"), Some(ShellCommand::Toggle));
        assert_eq!(parse_command("quit"), Some(ShellCommand::Stop));
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn other_text_becomes_a_refresh_query() {
        assert_eq!(
            parse_command("refresh  daft   punk"),
            Some(ShellCommand::Refresh("daft punk".into()))
        );
        assert_eq!(
            parse_command("play that funky music"),
            Some(ShellCommand::Refresh("play that funky music".into()))
        );
        assert_eq!(parse_command("refresh"), None);
    }
}
