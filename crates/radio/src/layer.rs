//! The contract between a MAC layer and the host that owns it

use embedded_radio_core::{
    CommonMacHeader, ConfigurationRegistrar, ConfigurationUpdate, ControlMessages,
    DownstreamPacket, NemId, UpstreamPacket,
};

use crate::lifecycle::LayerState;
use crate::timer::{TimerEventId, TimerService};
use crate::LayerError;

/// Hands packets to the host for transmission toward the medium.
///
/// Fire-and-forget: the layer gets no delivery confirmation.
pub trait DownstreamTransport: Send {
    fn send_downstream_packet(&mut self, header: CommonMacHeader, packet: DownstreamPacket);
}

/// Human-readable destination for received messages.
pub trait MessageSink: Send {
    fn surface(&mut self, source: NemId, message: &str);
}

/// Prints each received message on its own line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn surface(&mut self, _source: NemId, message: &str) {
        println!("{}", message);
    }
}

/// Host services a layer is built with. The layer owns them exclusively.
pub struct LayerServices {
    pub timer: Box<dyn TimerService>,
    pub transport: Box<dyn DownstreamTransport>,
    pub sink: Box<dyn MessageSink>,
}

/// A MAC layer as seen by its host.
///
/// The host calls these one at a time for a given instance: lifecycle calls,
/// timer ticks and packets are never concurrent, so implementations take
/// `&mut self` and need no locking. None of them may block.
pub trait MacLayer: Send {
    fn id(&self) -> NemId;

    fn state(&self) -> LayerState;

    /// Declare configuration parameters.
    fn initialize(&mut self, registrar: &mut ConfigurationRegistrar) -> Result<(), LayerError>;

    fn configure(&mut self, update: &ConfigurationUpdate) -> Result<(), LayerError>;

    fn start(&mut self) -> Result<(), LayerError>;

    /// Runs once every layer of the emulation has started. Traffic may only
    /// begin from here.
    fn post_start(&mut self) -> Result<(), LayerError>;

    fn stop(&mut self) -> Result<(), LayerError>;

    /// Best-effort teardown. Problems are logged, never returned.
    fn destroy(&mut self);

    fn process_upstream_packet(
        &mut self,
        header: &CommonMacHeader,
        packet: &UpstreamPacket,
        controls: &ControlMessages,
    );

    fn process_upstream_control(&mut self, controls: &ControlMessages);

    fn process_downstream_control(&mut self, controls: &ControlMessages);

    fn process_downstream_packet(&mut self, packet: DownstreamPacket, controls: &ControlMessages);

    fn process_timed_event(&mut self, event: TimerEventId);
}
