//! embedded radio model, hosted in-process
//!
//! Transmits a message once a second from one NEM and prints whatever the
//! NEM receives. Runs until SIGINT or SIGQUIT.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::error;
use tokio::signal;

use embedded_radio_core::NemId;
use embedded_radio_sim::{run_platform, MediumPreset, PlatformConfig, DEFAULT_MESSAGE};

#[derive(Parser, Debug)]
#[command(name = "embedded-radio", version, about, long_about = None)]
struct Args {
    /// NEM id of node. [1,65534]
    #[arg(value_name = "NEMID", value_parser = clap::value_parser!(u16).range(1..=65534))]
    nem_id: u16,

    /// ASCII message to transmit.
    #[arg(short = 'm', long = "message", value_name = "MESSAGE", default_value = DEFAULT_MESSAGE)]
    message: String,

    /// Control port endpoint. [default: 0.0.0.0:47000]
    #[arg(short = 'c', long = "controlport", value_name = "ENDPOINT")]
    control_port: Option<SocketAddr>,

    /// JSON platform configuration (medium model, control port).
    #[arg(short = 'p', long = "platform", value_name = "FILE")]
    platform: Option<PathBuf>,

    /// Medium conditions, replacing any medium section of the platform file.
    #[arg(long = "medium", value_enum, value_name = "PRESET")]
    medium: Option<MediumPreset>,
}

fn load_platform_config(path: Option<&PathBuf>) -> Result<PlatformConfig> {
    let Some(path) = path else {
        return Ok(PlatformConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read platform config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid platform config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let id = NemId::new(args.nem_id)?;
    let mut config = load_platform_config(args.platform.as_ref())?;
    if let Some(endpoint) = args.control_port {
        config.control_port_endpoint = endpoint;
    }
    if let Some(preset) = args.medium {
        config.medium = preset.config();
    }

    run_platform(id, args.message, config, shutdown_signal())
        .await
        .with_context(|| format!("NEM {} failed", id))?;

    println!("fin");
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("cannot listen for SIGINT: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let quit = async {
        match signal::unix::signal(signal::unix::SignalKind::quit()) {
            Ok(mut quit) => {
                quit.recv().await;
            }
            Err(err) => {
                error!("cannot listen for SIGQUIT: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let quit = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = quit => {}
    }
}
