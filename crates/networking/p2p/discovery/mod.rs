//! Node discovery over UDP: signed Ping/Pong/FindNode/Neighbors packets feeding a
//! scored node store.

pub mod client;
pub mod error;
pub mod lookup;
pub mod manager;
pub mod packet;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::{DiscoveryError, PacketError};
pub use lookup::NodeDiscovery;
pub use manager::NodeManager;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Nodes probed concurrently by one lookup.
    pub alpha: usize,
    /// Lifetime given to outgoing packets.
    pub expiration_secs: u64,
    /// How long a client waits for the next datagram before giving up on a node.
    pub read_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            alpha: 3,
            expiration_secs: 20,
            read_timeout_secs: 5,
        }
    }
}

impl DiscoveryConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
