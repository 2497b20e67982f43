pub mod capability;
pub mod error;
pub mod message;
pub mod peer;

pub use capability::{Capability, CapabilityTable, SharedCapability, SupportedCapability};
pub use error::DevP2PError;
pub use message::{DisconnectReason, HelloMessage};
pub use peer::{DevP2PPeer, DevP2PState, Incoming};
