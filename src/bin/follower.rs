//! follower - Dogbot target-following daemon
//!
//! This daemon:
//! 1. Connects to the actuator server (blocking until it is reachable)
//! 2. Starts the heartbeat and reply receiver threads
//! 3. Pulls per-frame detections from the configured source
//! 4. Selects one target per frame and runs the command policy
//! 5. Sends debounced commands to the actuator
//! 6. Closes the connection cleanly on end of stream or Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dogbot_follower::config::FollowerConfig;
use dogbot_follower::{
    open_source, AreaLog, CommandPolicy, ControlLoop, ControlState, LoopOptions, TransportClient,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Follow the largest detected object and drive the actuator toward it"
)]
struct Args {
    /// Detection input: stub://<name>, '-' for JSON lines on stdin, or a JSON-lines file.
    input_uri: Option<String>,

    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "FOLLOWER_CONFIG")]
    config: Option<PathBuf>,

    /// Pre-trained model the external detector loads.
    #[arg(long)]
    network: Option<String>,

    /// Detection overlay flags for the external renderer (e.g. box,labels,conf).
    #[arg(long)]
    overlay: Option<String>,

    /// Minimum detection confidence.
    #[arg(long)]
    threshold: Option<f32>,

    /// Actuator server address (host:port).
    #[arg(long)]
    server: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => FollowerConfig::load_from(path)?,
        None => FollowerConfig::load()?,
    };
    if let Some(uri) = args.input_uri {
        cfg.input.uri = uri;
    }
    if let Some(network) = args.network {
        cfg.input.network = network;
    }
    if let Some(overlay) = args.overlay {
        cfg.input.overlay = overlay;
    }
    if let Some(threshold) = args.threshold {
        cfg.input.detection_threshold = threshold;
    }
    if let Some(server) = args.server {
        cfg.transport.server_addr = server;
    }
    cfg.validate()?;

    log::info!(
        "input={} network={} overlay={} threshold={:.2} frame={}x{}",
        cfg.input.uri,
        cfg.input.network,
        cfg.input.overlay,
        cfg.input.detection_threshold,
        cfg.input.width,
        cfg.input.height
    );
    log::info!(
        "policy: error_band={}px dwell={}ms grab_area={:?} polarity={:?}",
        cfg.policy.error_band,
        cfg.policy.dwell.as_millis(),
        cfg.policy.grab_area,
        cfg.policy.turn_polarity
    );

    let source = open_source(&cfg.input)?;
    let area_log = match &cfg.area_log {
        Some(path) => {
            let area_log = AreaLog::create(path)?;
            log::info!("area log: {}", area_log.path().display());
            Some(area_log)
        }
        None => None,
    };

    log::info!("connecting to actuator at {}", cfg.transport.server_addr);
    let client = TransportClient::connect(cfg.transport.clone());
    if let Some(peer) = client.peer_addr() {
        log::info!("actuator link up ({})", peer);
    }
    client.start_heartbeat(cfg.transport.heartbeat_interval)?;
    client.start_receive_loop(|reply| log::info!("actuator: {}", reply))?;

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let policy = CommandPolicy::new(
        cfg.policy.clone(),
        ControlState::new(cfg.input.width, cfg.input.height),
    );
    let options = LoopOptions {
        report_detections: cfg.report_detections,
        area_log,
    };
    let mut control = ControlLoop::new(source, &client, policy, options);
    let result = control.run(&running);

    // Always close the link so the server sees a clean disconnect.
    client.shutdown();
    let stats = result?;
    log::info!(
        "follower stopped after {} frames ({} commands emitted, {} send failures)",
        stats.frames,
        stats.commands_emitted,
        stats.send_failures
    );
    Ok(())
}
