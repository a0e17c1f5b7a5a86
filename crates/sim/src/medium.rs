//! Simulated over-the-air medium shared by every NEM in the process

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace, warn};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

use embedded_radio_core::{CommonMacHeader, Destination, DownstreamPacket, NemId, PacketInfo};

use crate::{HostError, MediumConfig};

/// What actually crosses the medium for one downstream packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtaFrame {
    pub header: CommonMacHeader,
    pub info: PacketInfo,
    pub payload: Bytes,
}

impl OtaFrame {
    pub fn new(header: CommonMacHeader, packet: DownstreamPacket) -> Self {
        let (info, payload) = packet.into_parts();
        Self {
            header,
            info,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, HostError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, HostError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(frame)
    }
}

/// An encoded frame handed to one receiving NEM.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub bytes: Vec<u8>,
    pub sent_at: Instant,
}

struct QueuedFrame {
    from: NemId,
    destination: Destination,
    bytes: Vec<u8>,
    sent_at: Instant,
}

#[derive(Debug, Default)]
struct MediumStats {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    frames_delivered: AtomicU64,
    bytes_sent: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediumCounters {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_delivered: u64,
    pub bytes_sent: u64,
}

pub struct SimulatedMedium {
    nodes: Arc<RwLock<HashMap<NemId, mpsc::Sender<Delivery>>>>,
    config: MediumConfig,
    stats: Arc<MediumStats>,
    queue: mpsc::Sender<QueuedFrame>,
}

impl SimulatedMedium {
    /// Must be called from within a tokio runtime; delivery runs on a
    /// background task that ends once the medium is dropped.
    pub fn new(config: MediumConfig) -> Arc<Self> {
        let nodes = Arc::new(RwLock::new(HashMap::new()));
        let stats = Arc::new(MediumStats::default());
        let (queue, queue_rx) = mpsc::channel(config.queue_depth.max(1));

        debug!("SimulatedMedium initialized with config: {:?}", config);
        tokio::spawn(deliver(queue_rx, nodes.clone(), stats.clone(), config.clone()));

        Arc::new(Self {
            nodes,
            config,
            stats,
            queue,
        })
    }

    pub fn config(&self) -> &MediumConfig {
        &self.config
    }

    /// Attach a NEM; frames addressed to it arrive on the returned receiver.
    pub async fn join(&self, id: NemId) -> Result<mpsc::Receiver<Delivery>, HostError> {
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&id) {
            return Err(HostError::DuplicateNem(id));
        }
        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        nodes.insert(id, tx);
        Ok(rx)
    }

    pub async fn leave(&self, id: NemId) {
        self.nodes.write().await.remove(&id);
    }

    /// Queue a frame without waiting. Used from inside layer callbacks.
    pub fn transmit(
        &self,
        from: NemId,
        destination: Destination,
        bytes: Vec<u8>,
    ) -> Result<(), HostError> {
        if bytes.len() > self.config.mtu {
            return Err(HostError::FrameTooLarge {
                size: bytes.len(),
                mtu: self.config.mtu,
            });
        }

        let size = bytes.len() as u64;
        let frame = QueuedFrame {
            from,
            destination,
            bytes,
            sent_at: Instant::now(),
        };
        match self.queue.try_send(frame) {
            Ok(()) => {
                trace!("queued {} byte frame from {} to {}", size, from, destination);
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_sent.fetch_add(size, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(HostError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(HostError::MediumClosed),
        }
    }

    pub fn counters(&self) -> MediumCounters {
        MediumCounters {
            frames_sent: self.stats.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
            frames_delivered: self.stats.frames_delivered.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

fn jitter(config: &MediumConfig) -> Duration {
    let sigma = config.latency_jitter.as_secs_f64();
    if sigma <= 0.0 {
        return Duration::ZERO;
    }
    match Normal::new(0.0, sigma) {
        Ok(normal) => Duration::from_secs_f64(normal.sample(&mut rand::rng()).abs()),
        Err(_) => Duration::ZERO,
    }
}

async fn deliver(
    mut queue: mpsc::Receiver<QueuedFrame>,
    nodes: Arc<RwLock<HashMap<NemId, mpsc::Sender<Delivery>>>>,
    stats: Arc<MediumStats>,
    config: MediumConfig,
) {
    while let Some(frame) = queue.recv().await {
        tokio::time::sleep_until(frame.sent_at + config.latency + jitter(&config)).await;

        if config.packet_loss > 0.0 && rand::rng().random::<f32>() < config.packet_loss {
            stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("frame from {} lost on the medium", frame.from);
            continue;
        }

        let nodes = nodes.read().await;
        let receivers: Vec<_> = match frame.destination {
            Destination::Broadcast => nodes
                .iter()
                .filter(|(id, _)| config.loopback || **id != frame.from)
                .collect(),
            Destination::Nem(raw) => match NemId::new(raw)
                .ok()
                .and_then(|id| nodes.get_key_value(&id))
            {
                Some(entry) => vec![entry],
                None => {
                    warn!("NEM {} not on the medium, dropping frame from {}", raw, frame.from);
                    stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            },
        };

        for (id, tx) in receivers {
            let delivery = Delivery {
                bytes: frame.bytes.clone(),
                sent_at: frame.sent_at,
            };
            match tx.try_send(delivery) {
                Ok(()) => {
                    stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    warn!("failed to deliver frame to NEM {}: {}", id, err);
                    stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
    debug!("SimulatedMedium delivery task finished");
}
