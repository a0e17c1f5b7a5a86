//! Embedded radio model
//!
//! Sends the configured message to the configured destination once per
//! [`TX_INTERVAL`] and prints whatever it receives.

use bytes::Bytes;
use log::{debug, info, warn};

use embedded_radio_core::{
    CommonMacHeader, ConfigError, ConfigValue, ConfigurationRegistrar, ConfigurationUpdate,
    ControlMessages, Destination, DownstreamPacket, NemId, PacketInfo, RegistrationId,
    Requirement, UpstreamPacket, ValueKind, DEFAULT_PRIORITY, NEM_BROADCAST_MAC_ADDRESS,
};

use crate::layer::{LayerServices, MacLayer};
use crate::lifecycle::{LayerState, LifecycleOp};
use crate::scheduler::{PeriodicSender, TX_INTERVAL};
use crate::timer::TimerEventId;
use crate::LayerError;

pub const RADIO_MODEL_NAME: &str = "embeddedradiomodel";
pub const EMBEDDED_RADIO_REGISTRATION_ID: RegistrationId = 65533;

const MESSAGE: &str = "message";
const DESTINATION: &str = "destination";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioModelConfig {
    pub message: Option<Bytes>,
    pub destination: Destination,
}

impl RadioModelConfig {
    fn apply(&mut self, update: &ConfigurationUpdate) -> Result<(), ConfigError> {
        for (name, values) in update.iter() {
            match name {
                MESSAGE => {
                    let message = first(name, values)?
                        .as_str()
                        .ok_or_else(|| mismatch(name, ValueKind::Text, values))?;
                    self.message = Some(Bytes::copy_from_slice(message.as_bytes()));
                }
                DESTINATION => {
                    let raw = first(name, values)?
                        .as_u16()
                        .ok_or_else(|| mismatch(name, ValueKind::UInt16, values))?;
                    self.destination = Destination::from_raw(raw);
                }
                _ => debug!("ignoring unknown parameter '{}'", name),
            }
        }
        Ok(())
    }

    fn check(&self) -> Result<(), ConfigError> {
        match &self.message {
            None => Err(ConfigError::MissingParameter(MESSAGE.to_owned())),
            Some(message) if message.is_empty() => Err(ConfigError::Rejected {
                name: MESSAGE.to_owned(),
                reason: "must not be empty".to_owned(),
            }),
            Some(_) => Ok(()),
        }
    }
}

fn first<'a>(name: &str, values: &'a [ConfigValue]) -> Result<&'a ConfigValue, ConfigError> {
    values.first().ok_or_else(|| ConfigError::Cardinality {
        name: name.to_owned(),
        min: 1,
        max: 1,
        got: 0,
    })
}

fn mismatch(name: &str, expected: ValueKind, values: &[ConfigValue]) -> ConfigError {
    ConfigError::TypeMismatch {
        name: name.to_owned(),
        expected,
        actual: values.first().map(ConfigValue::kind).unwrap_or(expected),
    }
}

pub struct RadioModel {
    id: NemId,
    state: LayerState,
    config: RadioModelConfig,
    sender: PeriodicSender,
    sequence: u64,
    services: LayerServices,
}

impl RadioModel {
    pub fn new(id: NemId, services: LayerServices) -> Self {
        Self {
            id,
            state: LayerState::Created,
            config: RadioModelConfig::default(),
            sender: PeriodicSender::new(TX_INTERVAL),
            sequence: 0,
            services,
        }
    }

    pub fn config(&self) -> &RadioModelConfig {
        &self.config
    }

    pub fn tx_timer(&self) -> Option<TimerEventId> {
        self.sender.handle()
    }

    pub fn packets_sent(&self) -> u64 {
        self.sequence
    }

    fn enter(&self, op: LifecycleOp) -> Result<LayerState, LayerError> {
        debug!("MACI {:03} RadioModel::{}", self.id, op);
        self.state.transition(op).map_err(|err| {
            warn!("MACI {:03} RadioModel::{} rejected: {}", self.id, op, err);
            LayerError::from(err)
        })
    }

    fn transmit(&mut self) {
        let Some(message) = self.config.message.clone() else {
            warn!("MACI {:03} RadioModel::transmit no message configured", self.id);
            return;
        };

        let info = PacketInfo {
            source: self.id,
            destination: self.config.destination,
            priority: DEFAULT_PRIORITY,
            creation_time: self.services.timer.now(),
        };
        // counts packets sent by this instance rather than a fixed value
        let header = CommonMacHeader {
            registration_id: EMBEDDED_RADIO_REGISTRATION_ID,
            sequence_number: self.sequence,
        };
        self.sequence += 1;

        self.services
            .transport
            .send_downstream_packet(header, DownstreamPacket::new(info, message));
    }
}

impl MacLayer for RadioModel {
    fn id(&self) -> NemId {
        self.id
    }

    fn state(&self) -> LayerState {
        self.state
    }

    fn initialize(&mut self, registrar: &mut ConfigurationRegistrar) -> Result<(), LayerError> {
        let next = self.enter(LifecycleOp::Initialize)?;

        registrar.register_non_numeric(
            MESSAGE,
            Requirement::Required,
            "Message to transmit to attached NEM.",
        )?;
        registrar.register_numeric_u16(
            DESTINATION,
            Requirement::Default(vec![ConfigValue::UInt16(NEM_BROADCAST_MAC_ADDRESS)]),
            "Destination NEM. Default: NEM_BROADCAST_MAC_ADDRESS",
        )?;

        self.state = next;
        Ok(())
    }

    fn configure(&mut self, update: &ConfigurationUpdate) -> Result<(), LayerError> {
        let next = self.enter(LifecycleOp::Configure)?;

        let mut staged = self.config.clone();
        staged.apply(update)?;
        staged.check()?;

        if let Some(message) = &staged.message {
            info!(
                "MACI {:03} RadioModel::configure {}: {}",
                self.id,
                MESSAGE,
                String::from_utf8_lossy(message)
            );
        }
        info!(
            "MACI {:03} RadioModel::configure {}: {}",
            self.id, DESTINATION, staged.destination
        );

        self.config = staged;
        self.state = next;
        Ok(())
    }

    fn start(&mut self) -> Result<(), LayerError> {
        self.state = self.enter(LifecycleOp::Start)?;
        Ok(())
    }

    fn post_start(&mut self) -> Result<(), LayerError> {
        let next = self.enter(LifecycleOp::PostStart)?;
        self.sender.arm(self.services.timer.as_mut())?;
        self.state = next;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), LayerError> {
        let next = self.enter(LifecycleOp::Stop)?;
        if self.sender.disarm(self.services.timer.as_mut()) {
            debug!("MACI {:03} RadioModel::stop transmit timer cancelled", self.id);
        }
        self.state = next;
        Ok(())
    }

    fn destroy(&mut self) {
        match self.enter(LifecycleOp::Destroy) {
            Ok(next) => self.state = next,
            Err(_) if self.state == LayerState::Destroyed => {}
            Err(_) => {
                self.sender.disarm(self.services.timer.as_mut());
                self.state = LayerState::Destroyed;
            }
        }
    }

    fn process_upstream_packet(
        &mut self,
        _header: &CommonMacHeader,
        packet: &UpstreamPacket,
        _controls: &ControlMessages,
    ) {
        let message = String::from_utf8_lossy(packet.payload());
        debug!(
            "MACI {:03} RadioModel::process_upstream_packet ({}) message from {}: {}",
            self.id,
            self.state,
            packet.info().source,
            message
        );
        self.services.sink.surface(packet.info().source, &message);
    }

    fn process_upstream_control(&mut self, _controls: &ControlMessages) {}

    fn process_downstream_control(&mut self, _controls: &ControlMessages) {}

    fn process_downstream_packet(
        &mut self,
        _packet: DownstreamPacket,
        _controls: &ControlMessages,
    ) {
    }

    fn process_timed_event(&mut self, event: TimerEventId) {
        if !self.state.is_running() || !self.sender.on_tick(event) {
            debug!(
                "MACI {:03} RadioModel::process_timed_event discarding timer {} while {}",
                self.id, event, self.state
            );
            return;
        }
        self.transmit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{DownstreamTransport, MessageSink};
    use crate::lifecycle::LifecycleError;
    use crate::timer::ManualTimerService;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<(CommonMacHeader, DownstreamPacket)>>>);

    impl DownstreamTransport for Captured {
        fn send_downstream_packet(&mut self, header: CommonMacHeader, packet: DownstreamPacket) {
            self.0.lock().unwrap().push((header, packet));
        }
    }

    impl Captured {
        fn take(&self) -> Vec<(CommonMacHeader, DownstreamPacket)> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    #[derive(Clone, Default)]
    struct Surfaced(Arc<Mutex<Vec<(NemId, String)>>>);

    impl MessageSink for Surfaced {
        fn surface(&mut self, source: NemId, message: &str) {
            self.0.lock().unwrap().push((source, message.to_owned()));
        }
    }

    struct Harness {
        model: RadioModel,
        timers: ManualTimerService,
        sent: Captured,
        surfaced: Surfaced,
    }

    impl Harness {
        fn new(id: u16) -> Self {
            let timers = ManualTimerService::new(SystemTime::UNIX_EPOCH);
            let sent = Captured::default();
            let surfaced = Surfaced::default();
            let model = RadioModel::new(
                NemId::new(id).unwrap(),
                LayerServices {
                    timer: Box::new(timers.clone()),
                    transport: Box::new(sent.clone()),
                    sink: Box::new(surfaced.clone()),
                },
            );
            Self {
                model,
                timers,
                sent,
                surfaced,
            }
        }

        /// Initialize, then configure through the declared contract.
        fn configured(id: u16, raw: &[(&str, &str)]) -> Self {
            let mut harness = Self::new(id);
            let mut registrar = ConfigurationRegistrar::new();
            harness.model.initialize(&mut registrar).unwrap();
            let raw: Vec<(String, Vec<String>)> = raw
                .iter()
                .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
                .collect();
            let update = registrar.validate(&raw).unwrap();
            harness.model.configure(&update).unwrap();
            harness
        }

        fn running(id: u16, raw: &[(&str, &str)]) -> Self {
            let mut harness = Self::configured(id, raw);
            harness.model.start().unwrap();
            harness.model.post_start().unwrap();
            harness
        }

        fn tick(&mut self, by: Duration) {
            for event in self.timers.advance(by) {
                self.model.process_timed_event(event);
            }
        }
    }

    fn message(text: &str) -> ConfigurationUpdate {
        ConfigurationUpdate::new().with(MESSAGE, [ConfigValue::text(text)])
    }

    fn upstream(source: u16, payload: &'static [u8]) -> UpstreamPacket {
        UpstreamPacket::new(
            PacketInfo {
                source: NemId::new(source).unwrap(),
                destination: Destination::Broadcast,
                priority: DEFAULT_PRIORITY,
                creation_time: SystemTime::UNIX_EPOCH,
            },
            payload,
        )
    }

    const HEADER: CommonMacHeader = CommonMacHeader {
        registration_id: EMBEDDED_RADIO_REGISTRATION_ID,
        sequence_number: 0,
    };

    #[test]
    fn test_running_arms_exactly_one_timer() {
        for id in [1, 10, 65534] {
            let harness = Harness::running(id, &[("message", "X")]);
            assert_eq!(harness.model.state(), LayerState::Running);
            assert_eq!(harness.timers.armed().len(), 1);
            assert_eq!(harness.model.tx_timer(), harness.timers.armed().first().copied());
        }
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut harness = Harness::running(1, &[("message", "X")]);

        harness.model.stop().unwrap();
        harness.model.stop().unwrap();

        assert_eq!(harness.model.state(), LayerState::Stopped);
        assert_eq!(harness.timers.cancellations(), 1);
        assert!(harness.timers.armed().is_empty());
    }

    #[test]
    fn test_stop_before_any_tick() {
        let mut harness = Harness::configured(1, &[("message", "X")]);
        harness.model.start().unwrap();

        harness.model.stop().unwrap();
        assert_eq!(harness.timers.cancellations(), 0);
        assert_eq!(harness.model.state(), LayerState::Stopped);
    }

    #[test]
    fn test_configure_without_message_fails() {
        let mut harness = Harness::new(1);
        harness.model.initialize(&mut ConfigurationRegistrar::new()).unwrap();

        let update = ConfigurationUpdate::new().with(DESTINATION, [ConfigValue::UInt16(2)]);
        let err = harness.model.configure(&update).unwrap_err();

        assert!(matches!(
            err,
            LayerError::Config(ConfigError::MissingParameter(ref name)) if name == MESSAGE
        ));
        assert_eq!(harness.model.state(), LayerState::Initialized);
        assert_eq!(harness.model.config(), &RadioModelConfig::default());
    }

    #[test]
    fn test_empty_message_rejected() {
        let mut harness = Harness::new(1);
        harness.model.initialize(&mut ConfigurationRegistrar::new()).unwrap();

        let err = harness.model.configure(&message("")).unwrap_err();
        assert!(matches!(err, LayerError::Config(ConfigError::Rejected { .. })));
        assert_eq!(harness.model.state(), LayerState::Initialized);
    }

    #[test]
    fn test_wrong_value_kind_rejected() {
        let mut harness = Harness::new(1);
        harness.model.initialize(&mut ConfigurationRegistrar::new()).unwrap();

        let update = message("X").with(DESTINATION, [ConfigValue::text("two")]);
        let err = harness.model.configure(&update).unwrap_err();
        assert!(matches!(err, LayerError::Config(ConfigError::TypeMismatch { .. })));
    }

    #[test]
    fn test_destination_defaults_to_broadcast() {
        let harness = Harness::configured(1, &[("message", "X")]);
        assert_eq!(harness.model.config().destination, Destination::Broadcast);
        assert_eq!(harness.model.config().destination.raw(), NEM_BROADCAST_MAC_ADDRESS);
    }

    #[test]
    fn test_configure_is_idempotent_and_ignores_unknown() {
        let mut harness = Harness::new(1);
        harness.model.initialize(&mut ConfigurationRegistrar::new()).unwrap();

        let update = message("X")
            .with(DESTINATION, [ConfigValue::UInt16(7)])
            .with("txpower", [ConfigValue::text("10")]);
        harness.model.configure(&update).unwrap();
        let once = harness.model.config().clone();
        harness.model.configure(&update).unwrap();

        assert_eq!(harness.model.config(), &once);
        assert_eq!(once.destination, Destination::Nem(7));
        assert_eq!(once.message.as_deref(), Some(&b"X"[..]));
    }

    #[test]
    fn test_each_tick_sends_one_packet() {
        let mut harness = Harness::running(4, &[("message", "beacon"), ("destination", "9")]);

        for expected in 0..3u64 {
            harness.tick(TX_INTERVAL);
            let sent = harness.sent.take();
            assert_eq!(sent.len(), 1);
            let (header, packet) = &sent[0];
            assert_eq!(header.registration_id, EMBEDDED_RADIO_REGISTRATION_ID);
            assert_eq!(header.sequence_number, expected);
            assert_eq!(packet.payload(), b"beacon");
            assert_eq!(packet.info().destination, Destination::Nem(9));
            assert_eq!(packet.info().priority, DEFAULT_PRIORITY);
        }

        harness.model.stop().unwrap();
        harness.tick(TX_INTERVAL * 5);
        assert!(harness.sent.take().is_empty());
    }

    #[test]
    fn test_tick_uses_current_configuration() {
        let mut harness = Harness::running(4, &[("message", "first")]);
        harness.tick(TX_INTERVAL);
        harness.model.stop().unwrap();

        harness
            .model
            .configure(&message("second").with(DESTINATION, [ConfigValue::UInt16(3)]))
            .unwrap();
        harness.model.start().unwrap();
        harness.model.post_start().unwrap();
        harness.tick(TX_INTERVAL);

        let sent = harness.sent.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1.payload(), b"first");
        assert_eq!(sent[1].1.payload(), b"second");
        assert_eq!(sent[1].1.info().destination, Destination::Nem(3));
    }

    #[test]
    fn test_upstream_payload_surfaced_unchanged() {
        let mut harness = Harness::running(1, &[("message", "X")]);

        harness
            .model
            .process_upstream_packet(&HEADER, &upstream(2, b"ping"), &ControlMessages::new());
        harness
            .model
            .process_upstream_packet(&HEADER, &upstream(3, b""), &ControlMessages::new());
        harness
            .model
            .process_upstream_packet(&HEADER, &upstream(4, b"\xffok"), &ControlMessages::new());

        let surfaced = harness.surfaced.0.lock().unwrap().clone();
        assert_eq!(
            surfaced,
            vec![
                (NemId::new(2).unwrap(), "ping".to_owned()),
                (NemId::new(3).unwrap(), String::new()),
                (NemId::new(4).unwrap(), "\u{FFFD}ok".to_owned()),
            ]
        );
        assert!(harness.sent.take().is_empty());
    }

    #[test]
    fn test_upstream_surfaced_outside_running() {
        let mut harness = Harness::configured(1, &[("message", "X")]);

        harness
            .model
            .process_upstream_packet(&HEADER, &upstream(2, b"ping"), &ControlMessages::new());
        harness.model.start().unwrap();
        harness.model.stop().unwrap();
        harness
            .model
            .process_upstream_packet(&HEADER, &upstream(3, b"late"), &ControlMessages::new());

        let surfaced = harness.surfaced.0.lock().unwrap().clone();
        assert_eq!(
            surfaced,
            vec![
                (NemId::new(2).unwrap(), "ping".to_owned()),
                (NemId::new(3).unwrap(), "late".to_owned()),
            ]
        );
        assert!(harness.sent.take().is_empty());
    }

    #[test]
    fn test_hello_world_broadcast() {
        let mut harness = Harness::running(10, &[("message", "Hello World!")]);
        harness.tick(TX_INTERVAL);

        let sent = harness.sent.take();
        assert_eq!(sent.len(), 1);
        let info = sent[0].1.info();
        assert_eq!(sent[0].1.payload(), b"Hello World!");
        assert_eq!(info.destination, Destination::Broadcast);
        assert_eq!(info.source, NemId::new(10).unwrap());
        assert_eq!(info.creation_time, SystemTime::UNIX_EPOCH + TX_INTERVAL);
    }

    #[test]
    fn test_start_before_configure_rejected() {
        let mut harness = Harness::new(1);
        harness.model.initialize(&mut ConfigurationRegistrar::new()).unwrap();

        let err = harness.model.start().unwrap_err();
        assert!(matches!(
            err,
            LayerError::Lifecycle(LifecycleError {
                op: LifecycleOp::Start,
                state: LayerState::Initialized
            })
        ));
        assert!(harness.model.post_start().is_err());
        assert!(harness.timers.armed().is_empty());
        assert_eq!(harness.model.state(), LayerState::Initialized);
    }

    #[test]
    fn test_configure_before_initialize_rejected() {
        let mut harness = Harness::new(1);
        let err = harness.model.configure(&message("X")).unwrap_err();
        assert!(matches!(err, LayerError::Lifecycle(_)));
        assert_eq!(harness.model.state(), LayerState::Created);
    }

    #[test]
    fn test_initialize_twice_rejected() {
        let mut harness = Harness::new(1);
        let mut registrar = ConfigurationRegistrar::new();
        harness.model.initialize(&mut registrar).unwrap();
        assert!(matches!(
            harness.model.initialize(&mut registrar),
            Err(LayerError::Lifecycle(_))
        ));
    }

    #[test]
    fn test_post_start_twice_rejected() {
        let mut harness = Harness::running(1, &[("message", "X")]);
        assert!(matches!(
            harness.model.post_start(),
            Err(LayerError::Scheduler(_))
        ));
        assert_eq!(harness.timers.armed().len(), 1);
    }

    #[test]
    fn test_destroy_never_fails() {
        let mut harness = Harness::running(1, &[("message", "X")]);

        harness.model.destroy();
        assert_eq!(harness.model.state(), LayerState::Destroyed);
        assert!(harness.timers.armed().is_empty());

        harness.model.destroy();
        assert_eq!(harness.model.state(), LayerState::Destroyed);
        assert_eq!(harness.timers.cancellations(), 1);
    }

    #[test]
    fn test_controls_and_downstream_discarded() {
        let mut harness = Harness::running(1, &[("message", "X")]);
        let controls = vec![embedded_radio_core::ControlMessage::Opaque {
            id: 1,
            data: Bytes::from_static(b"x"),
        }];

        harness.model.process_upstream_control(&controls);
        harness.model.process_downstream_control(&controls);
        let from_above = DownstreamPacket::new(upstream(2, b"y").info().clone(), "y");
        harness.model.process_downstream_packet(from_above, &controls);

        assert!(harness.sent.take().is_empty());
        assert!(harness.surfaced.0.lock().unwrap().is_empty());
        assert_eq!(harness.model.state(), LayerState::Running);
    }
}
