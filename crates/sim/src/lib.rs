//! In-process host for the embedded radio model
//!
//! Provides what an emulation platform would around a MAC layer: a timer
//! facility, a simulated medium between NEMs, per-NEM dispatch, lifecycle
//! management across all NEMs, and a control port.

pub mod control;
pub mod manager;
pub mod medium;
pub mod nem;
pub mod timer;

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use embedded_radio_core::NemId;
use embedded_radio_model::{LayerError, RadioModel, RADIO_MODEL_NAME};

pub use control::ControlPort;
pub use manager::NemManager;
pub use medium::{MediumCounters, OtaFrame, SimulatedMedium};
pub use nem::{Nem, NemBuilder, NemMonitor, NemStatus};
pub use timer::TokioTimerService;

pub const DEFAULT_MESSAGE: &str = "Hello World!";
pub const DEFAULT_CONTROL_PORT: u16 = 47000;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("NEM {id}: {source}")]
    Layer {
        id: NemId,
        #[source]
        source: LayerError,
    },

    #[error("NEM {0} already on the medium")]
    DuplicateNem(NemId),

    #[error("NEM {0} is no longer running")]
    NemUnavailable(NemId),

    #[error("frame of {size} bytes exceeds medium MTU {mtu}")]
    FrameTooLarge { size: usize, mtu: usize },

    #[error("medium queue is full")]
    QueueFull,

    #[error("medium is closed")]
    MediumClosed,

    #[error("frame encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("frame decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("control port {endpoint}: {source}")]
    ControlPort {
        endpoint: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediumConfig {
    pub mtu: usize,
    pub packet_loss: f32,
    pub latency: Duration,
    pub latency_jitter: Duration,
    /// Deliver broadcasts back to their sender as well.
    pub loopback: bool,
    pub queue_depth: usize,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            mtu: 1500,
            packet_loss: 0.0,
            latency: Duration::from_millis(1),
            latency_jitter: Duration::ZERO,
            loopback: false,
            queue_depth: 10_000,
        }
    }
}

/// Named medium conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediumPreset {
    Wired,
    Wireless,
    Lossy,
    Congested,
}

impl MediumPreset {
    pub fn config(self) -> MediumConfig {
        match self {
            MediumPreset::Wired => MediumConfig::default(),
            MediumPreset::Wireless => MediumConfig {
                packet_loss: 0.01,
                latency: Duration::from_millis(5),
                latency_jitter: Duration::from_millis(2),
                ..Default::default()
            },
            MediumPreset::Lossy => MediumConfig {
                packet_loss: 0.25,
                latency: Duration::from_millis(50),
                latency_jitter: Duration::from_millis(20),
                ..Default::default()
            },
            MediumPreset::Congested => MediumConfig {
                packet_loss: 0.05,
                latency: Duration::from_millis(200),
                latency_jitter: Duration::from_millis(80),
                queue_depth: 64,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub control_port_endpoint: SocketAddr,
    pub medium: MediumConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            control_port_endpoint: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_CONTROL_PORT)),
            medium: MediumConfig::default(),
        }
    }
}

/// Build a single NEM running the radio model, run it until `shutdown`
/// resolves, then tear everything down.
pub async fn run_platform<F>(
    id: NemId,
    message: String,
    config: PlatformConfig,
    shutdown: F,
) -> Result<(), HostError>
where
    F: Future<Output = ()>,
{
    let medium = SimulatedMedium::new(config.medium.clone());
    let builder = NemBuilder::new(medium.clone());

    let nem = builder
        .build_mac_layer(
            id,
            RADIO_MODEL_NAME,
            vec![("message".to_owned(), vec![message])],
            RadioModel::new,
        )
        .await?;

    let mut manager = NemManager::new(config, medium, vec![nem]);
    if let Err(err) = start_all(&mut manager).await {
        manager.destroy().await;
        return Err(err);
    }

    shutdown.await;
    info!("shutdown requested");

    let stopped = manager.stop().await;
    manager.destroy().await;
    stopped
}

async fn start_all(manager: &mut NemManager) -> Result<(), HostError> {
    manager.start().await?;
    manager.post_start().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let wired = MediumPreset::Wired.config();
        assert_eq!(wired.packet_loss, 0.0);
        assert!(!wired.loopback);

        let lossy = MediumPreset::Lossy.config();
        assert_eq!(lossy.mtu, 1500);
        assert!(lossy.packet_loss > MediumPreset::Wireless.config().packet_loss);
        assert!(MediumPreset::Congested.config().queue_depth < wired.queue_depth);
    }

    #[test]
    fn test_platform_default() {
        let config = PlatformConfig::default();
        assert_eq!(config.control_port_endpoint.to_string(), "0.0.0.0:47000");
    }
}
