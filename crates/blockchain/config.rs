use std::{fs::File, io::BufReader, path::Path};

use ethkit_common::{config::networks::Network, types::Node};
use ethkit_p2p::{PeerConfig, discovery::DiscoveryConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings of the light client. Missing fields take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpvConfig {
    pub network: Network,
    pub client_id: String,
    pub listen_port: u16,
    /// Headers requested per batch.
    pub headers_limit: u64,
    pub ping_interval_secs: u64,
    /// Deadline for reaching a peer and getting its Hello.
    pub handshake_timeout_secs: u64,
    pub discovery: DiscoveryConfig,
    /// Replaces the network's bootnodes when set.
    pub bootnodes: Option<Vec<Node>>,
}

impl Default for SpvConfig {
    fn default() -> Self {
        let peer = PeerConfig::default();
        Self {
            network: Network::Mainnet,
            client_id: peer.client_id,
            listen_port: peer.listen_port,
            headers_limit: 50,
            ping_interval_secs: peer.ping_interval_secs,
            handshake_timeout_secs: peer.handshake_timeout_secs,
            discovery: DiscoveryConfig::default(),
            bootnodes: None,
        }
    }
}

impl SpvConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn bootnodes(&self) -> Vec<Node> {
        self.bootnodes
            .clone()
            .unwrap_or_else(|| self.network.get_bootnodes())
    }

    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            client_id: self.client_id.clone(),
            listen_port: self.listen_port,
            ping_interval_secs: self.ping_interval_secs,
            handshake_timeout_secs: self.handshake_timeout_secs,
        }
    }
}
