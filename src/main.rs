//! VIGIL Edge - Autonomous Decision Engine for Fabrication Equipment
//!
//! Process harness around the per-machine decision pipeline: loads the plant
//! configuration, spawns workers, and feeds them telemetry frames.
//!
//! # Usage
//!
//! ```bash
//! # Live: pipe JSONL telemetry frames from a broker shim
//! broker-shim | ./vigil-edge --stdin
//!
//! # Replay a recorded JSONL capture
//! ./vigil-edge --replay captures/shift-2026-07-14.jsonl --speed 0
//! ```
//!
//! # Environment Variables
//!
//! - `VIGIL_CONFIG`: Path to plant_config.toml (default: ./plant_config.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_edge::bridge::{AckResult, BridgeRequest, ChannelBridge};
use vigil_edge::config::{self, PlantConfig};
use vigil_edge::pipeline::{Dispatcher, ReplaySource, StdinSource};
use vigil_edge::reporter::LogSink;
use vigil_edge::types::TelemetryFrame;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vigil-edge")]
#[command(about = "VIGIL Edge autonomous decision engine")]
#[command(version)]
struct CliArgs {
    /// Read telemetry frames from stdin (JSONL, one frame per line)
    #[arg(long)]
    stdin: bool,

    /// Replay telemetry frames from a JSONL capture file
    #[arg(long, value_name = "PATH")]
    replay: Option<String>,

    /// Inter-frame delay for replay (ms, 0 = no delay)
    #[arg(long, default_value = "0")]
    speed: u64,

    /// Override config file path (also settable via VIGIL_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil_edge=info".into()),
        )
        .init();

    let args = CliArgs::parse();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        VIGIL EDGE - Autonomous Decision Engine           ║");
    info!("║        Detection → Safety Circuit → Actuation            ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // Load configuration. Invalid threshold tables are fatal here; nothing
    // else in the process is allowed to be.
    let plant_config = match &args.config {
        Some(path) => PlantConfig::load_from_file(std::path::Path::new(path))
            .with_context(|| format!("loading config from {path}"))?,
        None => PlantConfig::load().context("loading plant configuration")?,
    };
    info!(
        site = %plant_config.plant.site_id,
        machines = plant_config.machines.len(),
        "Configuration loaded"
    );
    for binding in &plant_config.machines {
        info!(
            machine = %binding.machine_id,
            agent_type = %binding.agent_type,
            protocol = %binding.protocol(),
            "Machine binding"
        );
    }
    config::init(plant_config);

    let cancel = CancellationToken::new();

    // Bridge transport: the far side of this channel belongs to the external
    // command transport. The built-in loopback task stands in for it when the
    // engine runs against a capture or a local simulator.
    let (bridge_tx, bridge_rx) = mpsc::channel::<BridgeRequest>(64);
    let bridge = Arc::new(ChannelBridge::new(
        bridge_tx,
        std::time::Duration::from_millis(config::get().executor.submit_timeout_ms),
    ));
    tokio::spawn(run_loopback_transport(bridge_rx));

    let sink = Arc::new(LogSink);
    let dispatcher = Dispatcher::spawn(config::get(), bridge, sink, cancel.clone());

    // Ctrl+C triggers cancellation; workers get the configured grace period.
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let stats = if let Some(path) = &args.replay {
        let mut source = load_replay(path, args.speed)?;
        dispatcher.run(&mut source).await
    } else {
        if !args.stdin {
            info!("No input mode given, defaulting to stdin");
        }
        let mut source = StdinSource::new();
        dispatcher.run(&mut source).await
    };

    info!(
        frames = stats.frames_routed,
        incidents = stats.incidents_reported(),
        "VIGIL Edge stopped"
    );
    Ok(())
}

/// Load a JSONL capture into a replay source.
fn load_replay(path: &str, delay_ms: u64) -> Result<ReplaySource> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let mut frames: Vec<TelemetryFrame> = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(frame) => frames.push(frame),
            Err(e) => warn!(line = line_no + 1, error = %e, "Skipping malformed frame"),
        }
    }
    info!(frames = frames.len(), path, "Replay capture loaded");
    Ok(ReplaySource::new(frames, delay_ms))
}

/// Stand-in transport: logs each outbound command and acknowledges it.
///
/// Production deployments replace this task with the real broker round trip;
/// the engine only ever sees the [`ChannelBridge`] contract either way.
async fn run_loopback_transport(mut rx: mpsc::Receiver<BridgeRequest>) {
    while let Some(request) = rx.recv().await {
        info!(
            machine = %request.command.machine_id,
            protocol = %request.command.protocol,
            command = %request.command.command_name,
            "Loopback transport acknowledged command"
        );
        let _ = request.reply.send(AckResult::accepted());
    }
}
