//! Drives every NEM of the process through its lifecycle together

use std::net::SocketAddr;
use std::sync::Arc;

use log::{info, warn};

use crate::control::ControlPort;
use crate::medium::SimulatedMedium;
use crate::nem::{Nem, NemStatus};
use crate::{HostError, PlatformConfig};

pub struct NemManager {
    config: PlatformConfig,
    medium: Arc<SimulatedMedium>,
    nems: Vec<Nem>,
    control: Option<ControlPort>,
}

impl NemManager {
    pub fn new(config: PlatformConfig, medium: Arc<SimulatedMedium>, nems: Vec<Nem>) -> Self {
        Self {
            config,
            medium,
            nems,
            control: None,
        }
    }

    /// Open the control port and start every NEM. No NEM begins transmitting
    /// until [`post_start`](Self::post_start).
    pub async fn start(&mut self) -> Result<(), HostError> {
        let monitors = self.nems.iter().map(Nem::monitor).collect();
        let control = ControlPort::bind(
            self.config.control_port_endpoint,
            monitors,
            self.medium.clone(),
        )
        .await?;
        info!("control port listening on {}", control.local_addr());
        self.control = Some(control);

        for nem in &self.nems {
            nem.start().await?;
        }
        Ok(())
    }

    pub async fn post_start(&self) -> Result<(), HostError> {
        for nem in &self.nems {
            nem.post_start().await?;
        }
        info!("{} NEM(s) running", self.nems.len());
        Ok(())
    }

    /// Stop every NEM, reporting the first failure after trying them all.
    pub async fn stop(&self) -> Result<(), HostError> {
        let mut first = None;
        for nem in &self.nems {
            if let Err(err) = nem.stop().await {
                warn!("NEM {} stop failed: {}", nem.id(), err);
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    pub async fn destroy(mut self) {
        for nem in self.nems.iter_mut() {
            nem.destroy().await;
        }
        if let Some(control) = self.control.take() {
            control.shutdown().await;
        }
        info!("medium totals: {:?}", self.medium.counters());
    }

    pub fn status(&self) -> Vec<NemStatus> {
        self.nems.iter().map(Nem::status).collect()
    }

    pub fn control_port(&self) -> Option<SocketAddr> {
        self.control.as_ref().map(ControlPort::local_addr)
    }
}
