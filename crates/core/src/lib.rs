//! Identifiers, packet shapes and the configuration contract shared by the
//! layers of an emulated node (NEM) and the host that drives them.

pub mod config;
pub mod packet;
pub mod types;

pub use config::{
    ConfigError, ConfigValue, ConfigurationRegistrar, ConfigurationUpdate, ParameterSpec,
    RawConfiguration, Requirement, ValueKind,
};
pub use packet::{
    CommonMacHeader, ControlMessage, ControlMessages, DownstreamPacket, PacketInfo, Priority,
    RegistrationId, UpstreamPacket, DEFAULT_PRIORITY,
};
pub use types::{Destination, InvalidNemId, NemId, NEM_BROADCAST_MAC_ADDRESS};
