//! Tiara Demo Application
//!
//! Streams a synthetic camera to a pose service and logs the overlay
//! transform the renderer would draw.
//!
//! Usage: `tiara-demo [config.json]` (or set `TIARA_CONFIG`). The endpoint
//! defaults to `ws://localhost:8000/ws`; override with `TIARA_ENDPOINT`.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use tiara_capture::TestPattern;
use tiara_core::ChannelStatus;
use tiara_runtime::{init_tracing, Pipeline, PipelineConfig, PipelineHandle, ENV_CONFIG_PATH};
use tiara_transport::{ChannelManager, WsConnector};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("tiara=info,tiara_demo=info");

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(ENV_CONFIG_PATH).ok())
        .map(PathBuf::from);
    let config = PipelineConfig::load_from(path.as_deref())?;

    println!("Tiara demo - streaming to {}", config.channel.endpoint);
    println!("Commands: /model <name>, /connect, /disconnect, /stats, /quit");
    println!();

    let manager = ChannelManager::spawn(WsConnector::new(), config.channel.clone())?;
    let pipeline = Pipeline::new(config, TestPattern::new(640, 480), manager.handle())?.start()?;
    manager.connect();

    let mut status = manager.handle().subscribe_status();
    let mut transforms = pipeline.subscribe_transforms();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut report = tokio::time::interval(Duration::from_secs(5));
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                log_status(&current);
            }
            changed = transforms.changed() => {
                if changed.is_err() {
                    break;
                }
                let t = *transforms.borrow_and_update();
                if t.visible {
                    tracing::info!(
                        x = t.position.x, y = t.position.y, z = t.position.z,
                        scale = t.scale,
                        "overlay visible"
                    );
                } else {
                    tracing::info!("overlay hidden");
                }
            }
            _ = report.tick() => {
                tracing::info!(
                    fps = format!("{:.1}", pipeline.average_rate(Duration::from_secs(1))),
                    "sampling rate"
                );
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_command(line.trim(), &pipeline, &manager) {
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("stdin error: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    println!("Shutting down...");
    pipeline.stop().await;
    manager.disconnect();
    manager.shutdown().await;
    Ok(())
}

fn log_status(status: &ChannelStatus) {
    match status.error() {
        Some(error) if status.is_terminal() => {
            tracing::error!("{} - type /connect to try again", error)
        }
        Some(error) => tracing::warn!("{}", error),
        None => tracing::info!(state = %status.state, "channel"),
    }
}

/// Returns false on `/quit`
fn handle_command(line: &str, pipeline: &PipelineHandle, manager: &ChannelManager) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("/model") => match parts.next() {
            Some(model) => pipeline.set_model_type(model),
            None => println!("current model: {}", pipeline.model_type()),
        },
        Some("/connect") => manager.connect(),
        Some("/disconnect") => manager.disconnect(),
        Some("/stats") => {
            let stats = pipeline.stats();
            println!(
                "ticks {} | sampled {} | sent {} | dropped {} | encode failures {}",
                stats.ticks,
                stats.frames_sampled,
                stats.frames_sent,
                stats.frames_dropped,
                stats.encode_failures
            );
            println!(
                "applied {} | malformed {} | server errors {}",
                stats.messages_applied, stats.malformed_messages, stats.server_errors
            );
        }
        Some("/quit") => return false,
        Some(other) => println!("unknown command: {}", other),
        None => {}
    }
    true
}
