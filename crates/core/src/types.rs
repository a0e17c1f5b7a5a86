use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved destination meaning "every NEM on the medium".
pub const NEM_BROADCAST_MAC_ADDRESS: u16 = u16::MAX;
pub const MIN_NEM_ID: u16 = 1;
pub const MAX_NEM_ID: u16 = u16::MAX - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("NEM id {0} outside [{MIN_NEM_ID}, {MAX_NEM_ID}]")]
pub struct InvalidNemId(pub u16);

/// Identity of one emulated node. Fixed for the lifetime of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct NemId(u16);

impl NemId {
    pub fn new(raw: u16) -> Result<Self, InvalidNemId> {
        if (MIN_NEM_ID..=MAX_NEM_ID).contains(&raw) {
            Ok(Self(raw))
        } else {
            Err(InvalidNemId(raw))
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for NemId {
    type Error = InvalidNemId;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<NemId> for u16 {
    fn from(id: NemId) -> u16 {
        id.0
    }
}

impl fmt::Display for NemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Where a downstream packet is headed.
///
/// The broadcast sentinel is kept apart from node ids so that it is never
/// compared against one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Destination {
    #[default]
    Broadcast,
    Nem(u16),
}

impl Destination {
    pub fn from_raw(raw: u16) -> Self {
        if raw == NEM_BROADCAST_MAC_ADDRESS {
            Destination::Broadcast
        } else {
            Destination::Nem(raw)
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            Destination::Broadcast => NEM_BROADCAST_MAC_ADDRESS,
            Destination::Nem(raw) => raw,
        }
    }

    pub fn is_broadcast(self) -> bool {
        matches!(self, Destination::Broadcast)
    }

    /// Whether a packet with this destination should reach `id`.
    pub fn includes(self, id: NemId) -> bool {
        match self {
            Destination::Broadcast => true,
            Destination::Nem(raw) => raw == id.get(),
        }
    }
}

impl From<NemId> for Destination {
    fn from(id: NemId) -> Self {
        Destination::Nem(id.get())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Broadcast => write!(f, "broadcast"),
            Destination::Nem(raw) => write!(f, "{}", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nem_id_range() {
        assert_eq!(NemId::new(0), Err(InvalidNemId(0)));
        assert_eq!(NemId::new(u16::MAX), Err(InvalidNemId(u16::MAX)));
        assert_eq!(NemId::new(1).map(NemId::get), Ok(1));
        assert_eq!(NemId::new(65534).map(NemId::get), Ok(65534));
    }

    #[test]
    fn test_nem_id_display_honors_width() {
        let id = NemId::new(7).unwrap();
        assert_eq!(format!("{:03}", id), "007");
    }

    #[test]
    fn test_broadcast_sentinel() {
        assert_eq!(Destination::from_raw(65535), Destination::Broadcast);
        assert_eq!(Destination::from_raw(65534), Destination::Nem(65534));
        assert_eq!(Destination::default().raw(), NEM_BROADCAST_MAC_ADDRESS);

        let id = NemId::new(3).unwrap();
        assert!(Destination::Broadcast.includes(id));
        assert!(Destination::Nem(3).includes(id));
        assert!(!Destination::Nem(4).includes(id));
    }
}
