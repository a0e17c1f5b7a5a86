//! Embedded radio model MAC layer
//!
//! The layer itself is synchronous and owns no threads. A host drives it
//! through [`MacLayer`] and lends it a timer facility, a downstream transport
//! and a message sink through [`LayerServices`].

use thiserror::Error;

use embedded_radio_core::ConfigError;

pub mod layer;
pub mod lifecycle;
pub mod radio_model;
pub mod scheduler;
pub mod timer;

pub use layer::{DownstreamTransport, LayerServices, MacLayer, MessageSink, StdoutSink};
pub use lifecycle::{LayerState, LifecycleError, LifecycleOp};
pub use radio_model::{
    RadioModel, RadioModelConfig, EMBEDDED_RADIO_REGISTRATION_ID, RADIO_MODEL_NAME,
};
pub use scheduler::{PeriodicSender, SchedulerError, SchedulerStats, TX_INTERVAL};
pub use timer::{ManualTimerService, TimerEventId, TimerService};

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}
