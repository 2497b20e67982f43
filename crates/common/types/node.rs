use std::{
    fmt::Display,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    str::FromStr,
};

use ethereum_types::H512;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// A remote peer: its public key plus where to reach it over TCP and UDP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub id: H512,
    pub host: Ipv4Addr,
    pub port: u16,
    pub discovery_port: u16,
}

impl Node {
    pub fn new(id: H512, host: Ipv4Addr, port: u16, discovery_port: u16) -> Self {
        Self {
            id,
            host,
            port,
            discovery_port,
        }
    }

    pub fn from_enode_url(enode: &str) -> Result<Self, NodeError> {
        let rest = enode
            .strip_prefix("enode://")
            .ok_or_else(|| NodeError::InvalidFormat("Missing enode:// scheme".into()))?;
        let (id, address) = rest
            .split_once('@')
            .ok_or_else(|| NodeError::InvalidFormat("Missing @ separator".into()))?;
        if id.len() != 128 {
            return Err(NodeError::ParseError("Node id must be 64 bytes".into()));
        }
        let id = H512::from_str(id)
            .map_err(|_| NodeError::ParseError("Could not parse node id".into()))?;

        let (address, query) = match address.split_once('?') {
            Some((address, query)) => (address, Some(query)),
            None => (address, None),
        };
        let socket_address: SocketAddrV4 = address
            .parse()
            .map_err(|_| NodeError::ParseError("Could not parse socket address".into()))?;
        let port = socket_address.port();

        let discovery_port = match query.and_then(|q| q.strip_prefix("discport=")) {
            Some(discport) => discport
                .parse()
                .map_err(|_| NodeError::ParseError("Could not parse discport".into()))?,
            None => port,
        };

        Ok(Self::new(id, *socket_address.ip(), port, discovery_port))
    }

    pub fn enode_url(&self) -> String {
        let id = hex::encode(self.id);
        if self.discovery_port != self.port {
            format!(
                "enode://{id}@{}:{}?discport={}",
                self.host, self.port, self.discovery_port
            )
        } else {
            format!("enode://{id}@{}:{}", self.host, self.port)
        }
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.port))
    }

    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.discovery_port))
    }
}

impl FromStr for Node {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_enode_url(s)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}({}:{})", self.id, self.host, self.port)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Node::from_str(&<String>::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Node {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.enode_url())
    }
}

/// A node as tracked by discovery, with its usage bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub node: Node,
    /// Already probed by a discovery lookup.
    pub used: bool,
    /// Whether the node may still be handed out to the peer layer.
    pub eligible: bool,
    pub score: u32,
    /// Unix timestamp, in seconds, of when the node was learned.
    pub timestamp: u64,
}

impl NodeRecord {
    pub fn new(node: Node, timestamp: u64) -> Self {
        Self {
            node,
            used: false,
            eligible: true,
            score: 0,
            timestamp,
        }
    }

    pub fn id(&self) -> H512 {
        self.node.id
    }
}
