//! Replays a scripted match through the sync core and reports what the
//! client would have sent.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p blokus-replay -- crates/blokus-replay/scripts/sample.ron`.

mod script;

use std::path::PathBuf;
use std::process::ExitCode;

use blokus_config::{CliArgs, Config, default_config_dir};
use clap::Parser;
use tracing::{error, info};

use crate::script::{Script, run_script, session_config};

#[derive(Parser, Debug)]
#[command(name = "blokus-replay", about = "Replay a scripted Blokus match")]
struct ReplayArgs {
    /// RON script of timed server events and local inputs.
    script: PathBuf,

    #[command(flatten)]
    common: CliArgs,
}

fn main() -> ExitCode {
    let args = ReplayArgs::parse();

    let config_dir = args
        .common
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args.common);

    let log_dir = config_dir.join("logs");
    blokus_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let script = match Script::load(&args.script) {
        Ok(script) => script,
        Err(err) => {
            error!(%err, "cannot load script");
            return ExitCode::FAILURE;
        }
    };
    info!(
        path = %args.script.display(),
        room = %script.room_id,
        steps = script.steps.len(),
        "replaying"
    );

    let summary = match run_script(
        &script,
        session_config(&config.game),
        config.game.tick_rate_hz,
    ) {
        Ok(summary) => summary,
        Err(err) => {
            error!(%err, "replay failed");
            return ExitCode::FAILURE;
        }
    };

    info!(
        steps = summary.steps,
        ticks = summary.ticks,
        placements = summary.placements,
        passes = summary.passes,
        resyncs = summary.resyncs,
        dropped = summary.dropped_events,
        refused = summary.refused_inputs,
        occupied = summary.occupied_cells,
        "replay finished"
    );
    for err in &summary.surfaced_errors {
        info!(%err, message = err.user_message().unwrap_or_default(), "surfaced");
    }

    ExitCode::SUCCESS
}
