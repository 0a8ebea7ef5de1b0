use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc;

use anyhow::{Context, Result};
use tracing::{Level, info};

use crease_live::config::SyncConfig;
use crease_live::console::{HELP, parse_command, render_scorecard, render_scoreline};
use crease_live::demo_feed::{DemoSource, demo_setup};
use crease_live::error::CommandError;
use crease_live::persist;
use crease_live::processor::{CommandProcessor, ScoringHandle};
use crease_live::reconcile::{SyncCommand, SyncStatus, SyncUpdate, spawn_sync};
use crease_live::snapshot_fetch::HttpSnapshotSource;
use crease_live::state::MatchSetup;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = SyncConfig::from_env();
    if args.iter().any(|arg| arg == "--demo") {
        return run_demo(config);
    }
    let setup = match args.first() {
        Some(path) => load_setup(Path::new(path))?,
        None => demo_setup(),
    };
    run_console(setup, config)
}

fn init_logging() {
    let level = env::var("CREASE_LOG")
        .ok()
        .and_then(|val| val.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn load_setup(path: &Path) -> Result<MatchSetup> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).context("invalid match setup json")
}

fn run_console(setup: MatchSetup, config: SyncConfig) -> Result<()> {
    let match_id = setup.settings.match_id.clone();
    let handle = ScoringHandle::new(CommandProcessor::new(setup).context("invalid match setup")?);

    // With an authoritative source configured, local effects are mirrored into the reconciler.
    let sync = config.snapshot_url.clone().map(|url| {
        let (tx, rx) = mpsc::channel::<SyncUpdate>();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let source = HttpSnapshotSource::new(url, config.http_timeout);
        spawn_sync(source, match_id.clone(), config.clone(), tx, cmd_rx);
        (rx, cmd_tx)
    });

    println!("{}", render_scoreline(&handle.snapshot()));
    println!("type `help` for commands");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "quit" | "exit" => break,
            "help" => println!("{HELP}"),
            "show" => println!("{}", render_scorecard(&handle.snapshot())),
            "export" => {
                let path = persist::save_export(&handle.export())?;
                println!("ledger exported to {}", path.display());
            }
            _ => match parse_command(line) {
                Ok(command) => match handle.submit(command) {
                    Ok(effect) => {
                        if let Some(event) = &effect.last_event {
                            println!("#{} {:?}", event.id, event.kind);
                        }
                        let snapshot = handle.snapshot();
                        println!("{}", render_scoreline(&snapshot));
                        if let Some((_, cmd_tx)) = &sync {
                            let _ = cmd_tx.send(SyncCommand::Local(Box::new(snapshot)));
                        }
                    }
                    Err(CommandError::Undo(err)) => println!("undo refused: {err}"),
                    Err(err) => println!("rejected: {err}"),
                },
                Err(err) => println!("{err:#}"),
            },
        }
        if let Some((rx, _)) = &sync {
            while let Ok(update) = rx.try_recv() {
                print_sync_status(&update.status);
            }
        }
        stdout.flush().context("flushing stdout")?;
    }

    if let Some((_, cmd_tx)) = &sync {
        let _ = cmd_tx.send(SyncCommand::Stop);
    }
    let export = handle.export();
    if !export.journal.is_empty() {
        let path = persist::save_export(&export)?;
        info!(path = %path.display(), "ledger exported");
    }
    Ok(())
}

fn run_demo(config: SyncConfig) -> Result<()> {
    let setup = demo_setup();
    let match_id = setup.settings.match_id.clone();
    let source = DemoSource::new(setup, rand::random()).context("demo setup")?;
    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let worker = spawn_sync(source, match_id, config, tx, cmd_rx);

    let mut last = None;
    for update in rx {
        print_sync_status(&update.status);
        if let Some(view) = update.view {
            println!("{}\n", render_scoreline(&view));
            last = Some(view);
        }
    }
    drop(cmd_tx);
    let _ = worker.join();
    if let Some(view) = last {
        println!("{}", render_scorecard(&view));
    }
    Ok(())
}

fn print_sync_status(status: &SyncStatus) {
    match status {
        SyncStatus::Retrying {
            attempt,
            delay,
            error,
        } => println!("sync: retry {attempt} in {}ms ({error})", delay.as_millis()),
        SyncStatus::Failed(err) => println!("sync stopped: {err}"),
        SyncStatus::Finished => println!("sync: match complete"),
        SyncStatus::Waiting | SyncStatus::Synced { .. } => {}
    }
}
