//! NEM hosting: one dispatch task per layer
//!
//! Each NEM owns its layer inside a single task. Lifecycle commands, timer
//! ticks and frames from the medium all arrive through that task, so the
//! layer only ever sees one call at a time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use embedded_radio_core::{
    CommonMacHeader, ConfigurationRegistrar, ControlMessage, DownstreamPacket, NemId,
    RawConfiguration, UpstreamPacket,
};
use embedded_radio_model::{
    DownstreamTransport, LayerError, LayerServices, LayerState, MacLayer, MessageSink,
    StdoutSink, TimerEventId,
};

use crate::medium::{Delivery, OtaFrame, SimulatedMedium};
use crate::timer::TokioTimerService;
use crate::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    PostStart,
    Stop,
    Destroy,
}

pub(crate) enum NemEvent {
    Command(Command, oneshot::Sender<Result<(), LayerError>>),
    Timer(TimerEventId),
}

#[derive(Debug, Default)]
struct NemCounters {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    send_failures: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NemStatus {
    pub id: NemId,
    pub layer: String,
    pub state: LayerState,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub send_failures: u64,
}

/// Read-only view of a running NEM, cheap to clone into other tasks.
#[derive(Debug, Clone)]
pub struct NemMonitor {
    id: NemId,
    layer: String,
    state: watch::Receiver<LayerState>,
    counters: Arc<NemCounters>,
}

impl NemMonitor {
    pub fn id(&self) -> NemId {
        self.id
    }

    pub fn state(&self) -> LayerState {
        *self.state.borrow()
    }

    pub fn status(&self) -> NemStatus {
        NemStatus {
            id: self.id,
            layer: self.layer.clone(),
            state: self.state(),
            packets_sent: self.counters.packets_sent.load(Ordering::Relaxed),
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            send_failures: self.counters.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Downstream transport that encodes packets onto the simulated medium.
struct MediumTransport {
    id: NemId,
    medium: Arc<SimulatedMedium>,
    counters: Arc<NemCounters>,
}

impl DownstreamTransport for MediumTransport {
    fn send_downstream_packet(&mut self, header: CommonMacHeader, packet: DownstreamPacket) {
        let destination = packet.info().destination;
        let result = OtaFrame::new(header, packet)
            .encode()
            .and_then(|bytes| self.medium.transmit(self.id, destination, bytes));

        match result {
            Ok(()) => {
                self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                warn!("NEM {} downstream packet not sent: {}", self.id, err);
            }
        }
    }
}

/// Builds NEMs attached to one medium.
pub struct NemBuilder {
    medium: Arc<SimulatedMedium>,
}

impl NemBuilder {
    pub fn new(medium: Arc<SimulatedMedium>) -> Self {
        Self { medium }
    }

    /// Construct a MAC layer, initialize it, validate `raw` against the
    /// parameters it declared and configure it. The returned NEM is ready for
    /// [`Nem::start`].
    pub async fn build_mac_layer<L, F>(
        &self,
        id: NemId,
        name: &str,
        raw: RawConfiguration,
        make: F,
    ) -> Result<Nem, HostError>
    where
        L: MacLayer + 'static,
        F: FnOnce(NemId, LayerServices) -> L,
    {
        self.build_mac_layer_with_sink(id, name, raw, Box::new(StdoutSink), make)
            .await
    }

    pub async fn build_mac_layer_with_sink<L, F>(
        &self,
        id: NemId,
        name: &str,
        raw: RawConfiguration,
        sink: Box<dyn MessageSink>,
        make: F,
    ) -> Result<Nem, HostError>
    where
        L: MacLayer + 'static,
        F: FnOnce(NemId, LayerServices) -> L,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(NemCounters::default());

        let services = LayerServices {
            timer: Box::new(TokioTimerService::new(id, events_tx.clone())),
            transport: Box::new(MediumTransport {
                id,
                medium: self.medium.clone(),
                counters: counters.clone(),
            }),
            sink,
        };
        let mut layer = make(id, services);

        let layer_error = |source| HostError::Layer { id, source };
        let mut registrar = ConfigurationRegistrar::new();
        layer.initialize(&mut registrar).map_err(layer_error)?;
        let update = registrar
            .validate(&raw)
            .map_err(|err| layer_error(LayerError::Config(err)))?;
        layer.configure(&update).map_err(layer_error)?;

        let inbound = self.medium.join(id).await?;
        let (state_tx, state_rx) = watch::channel(layer.state());

        let task = tokio::spawn(dispatch(
            Box::new(layer),
            events_rx,
            inbound,
            state_tx,
            counters.clone(),
        ));

        debug!("NEM {} built with layer {}", id, name);
        Ok(Nem {
            monitor: NemMonitor {
                id,
                layer: name.to_owned(),
                state: state_rx,
                counters,
            },
            events: events_tx,
            medium: self.medium.clone(),
            task: Some(task),
        })
    }
}

/// Host-side handle to one NEM. Owns the dispatch task, and through it the
/// layer.
pub struct Nem {
    monitor: NemMonitor,
    events: mpsc::UnboundedSender<NemEvent>,
    medium: Arc<SimulatedMedium>,
    task: Option<JoinHandle<()>>,
}

impl Nem {
    pub fn id(&self) -> NemId {
        self.monitor.id
    }

    pub fn monitor(&self) -> NemMonitor {
        self.monitor.clone()
    }

    pub fn status(&self) -> NemStatus {
        self.monitor.status()
    }

    async fn command(&self, command: Command) -> Result<(), HostError> {
        let id = self.id();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.events
            .send(NemEvent::Command(command, reply_tx))
            .map_err(|_| HostError::NemUnavailable(id))?;
        reply_rx
            .await
            .map_err(|_| HostError::NemUnavailable(id))?
            .map_err(|source| HostError::Layer { id, source })
    }

    pub async fn start(&self) -> Result<(), HostError> {
        self.command(Command::Start).await
    }

    pub async fn post_start(&self) -> Result<(), HostError> {
        self.command(Command::PostStart).await
    }

    pub async fn stop(&self) -> Result<(), HostError> {
        self.command(Command::Stop).await
    }

    /// Tear down the layer and wait for its task to finish. Never fails.
    pub async fn destroy(&mut self) {
        let id = self.id();
        if let Err(err) = self.command(Command::Destroy).await {
            warn!("NEM {} destroy: {}", id, err);
        }
        self.medium.leave(id).await;
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!("NEM {} dispatch task ended abnormally: {}", id, err);
            }
        }
    }
}

impl fmt::Debug for Nem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nem")
            .field("id", &self.id())
            .field("layer", &self.monitor.layer)
            .field("state", &self.monitor.state())
            .finish()
    }
}

impl Drop for Nem {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn run_command(layer: &mut dyn MacLayer, command: Command) -> Result<(), LayerError> {
    match command {
        Command::Start => layer.start(),
        Command::PostStart => layer.post_start(),
        Command::Stop => layer.stop(),
        Command::Destroy => {
            layer.destroy();
            Ok(())
        }
    }
}

fn process_delivery(layer: &mut dyn MacLayer, delivery: Delivery) -> Result<(), HostError> {
    let frame = OtaFrame::decode(&delivery.bytes)?;
    let controls = vec![ControlMessage::ReceiveProperties {
        sent_at: frame.info.creation_time,
        propagation_delay: delivery.sent_at.elapsed(),
    }];
    let packet = UpstreamPacket::new(frame.info, frame.payload);
    layer.process_upstream_packet(&frame.header, &packet, &controls);
    Ok(())
}

async fn dispatch(
    mut layer: Box<dyn MacLayer>,
    mut events: mpsc::UnboundedReceiver<NemEvent>,
    mut inbound: mpsc::Receiver<Delivery>,
    state: watch::Sender<LayerState>,
    counters: Arc<NemCounters>,
) {
    let id = layer.id();
    debug!("NEM {} dispatch task started", id);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(NemEvent::Command(command, reply)) => {
                    let result = run_command(layer.as_mut(), command);
                    state.send_replace(layer.state());
                    let _ = reply.send(result);
                    if command == Command::Destroy {
                        break;
                    }
                }
                Some(NemEvent::Timer(event)) => layer.process_timed_event(event),
                None => break,
            },
            Some(delivery) = inbound.recv() => {
                counters.packets_received.fetch_add(1, Ordering::Relaxed);
                if let Err(err) = process_delivery(layer.as_mut(), delivery) {
                    warn!("NEM {} dropping undecodable frame: {}", id, err);
                }
            }
        }
    }

    debug!("NEM {} dispatch task finished", id);
}
