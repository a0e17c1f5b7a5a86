//! Packet shapes exchanged between a MAC layer and its host

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{Destination, NemId};

/// Identifies which radio model built a frame so peers of the same model can
/// recognise it.
pub type RegistrationId = u16;

/// Traffic class carried in [`PacketInfo`].
pub type Priority = u8;

pub const DEFAULT_PRIORITY: Priority = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonMacHeader {
    pub registration_id: RegistrationId,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketInfo {
    pub source: NemId,
    pub destination: Destination,
    pub priority: Priority,
    pub creation_time: SystemTime,
}

/// Packet travelling from a layer toward the medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamPacket {
    info: PacketInfo,
    payload: Bytes,
}

impl DownstreamPacket {
    pub fn new(info: PacketInfo, payload: impl Into<Bytes>) -> Self {
        Self {
            info,
            payload: payload.into(),
        }
    }

    pub fn info(&self) -> &PacketInfo {
        &self.info
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_parts(self) -> (PacketInfo, Bytes) {
        (self.info, self.payload)
    }
}

/// Packet received from the medium, lent to a layer while it is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamPacket {
    info: PacketInfo,
    payload: Bytes,
}

impl UpstreamPacket {
    pub fn new(info: PacketInfo, payload: impl Into<Bytes>) -> Self {
        Self {
            info,
            payload: payload.into(),
        }
    }

    pub fn info(&self) -> &PacketInfo {
        &self.info
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Out-of-band messages passed alongside packets or on their own.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Reception metadata attached by the host to upstream packets.
    ReceiveProperties {
        sent_at: SystemTime,
        propagation_delay: Duration,
    },
    Opaque {
        id: u16,
        data: Bytes,
    },
}

pub type ControlMessages = Vec<ControlMessage>;
