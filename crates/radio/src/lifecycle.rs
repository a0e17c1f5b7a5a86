//! Lifecycle of a MAC layer instance
//!
//! ```text
//! Created     --initialize-->  Initialized
//! Initialized --configure--->  Configured
//! Configured  --configure--->  Configured
//! Configured  --start------->  Running
//! Running     --post_start-->  Running      (arms the transmit timer once)
//! Running     --stop-------->  Stopped
//! Stopped     --stop-------->  Stopped      (no-op)
//! Stopped     --configure--->  Configured
//! Stopped     --destroy----->  Destroyed
//! ```
//!
//! Every other edge is a sequencing error.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerState {
    Created,
    Initialized,
    Configured,
    Running,
    Stopped,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOp {
    Initialize,
    Configure,
    Start,
    PostStart,
    Stop,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{op} not permitted while {state}")]
pub struct LifecycleError {
    pub op: LifecycleOp,
    pub state: LayerState,
}

impl LayerState {
    /// State reached by applying `op`, or the sequencing error if the edge
    /// does not exist.
    pub fn transition(self, op: LifecycleOp) -> Result<LayerState, LifecycleError> {
        use LayerState::*;
        use LifecycleOp::*;

        match (self, op) {
            (Created, Initialize) => Ok(Initialized),
            (Initialized | Configured | Stopped, Configure) => Ok(Configured),
            (Configured, Start) => Ok(Running),
            (Running, PostStart) => Ok(Running),
            (Running | Stopped, Stop) => Ok(Stopped),
            (Stopped, Destroy) => Ok(Destroyed),
            (state, op) => Err(LifecycleError { op, state }),
        }
    }

    pub fn is_running(self) -> bool {
        self == LayerState::Running
    }
}

impl fmt::Display for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerState::Created => "created",
            LayerState::Initialized => "initialized",
            LayerState::Configured => "configured",
            LayerState::Running => "running",
            LayerState::Stopped => "stopped",
            LayerState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleOp::Initialize => "initialize",
            LifecycleOp::Configure => "configure",
            LifecycleOp::Start => "start",
            LifecycleOp::PostStart => "post_start",
            LifecycleOp::Stop => "stop",
            LifecycleOp::Destroy => "destroy",
        };
        f.write_str(name)
    }
}
