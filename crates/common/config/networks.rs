use std::{fmt, str::FromStr};

use ethereum_types::{H256, U256};
use serde::{Deserialize, Serialize};

use crate::types::{BlockHeader, Node, NodeError};

pub const MAINNET_CHAIN_ID: u64 = 0x1;

pub const MAINNET_GENESIS_HASH: H256 = H256([
    0xd4, 0xe5, 0x67, 0x40, 0xf8, 0x76, 0xae, 0xf8, 0xc0, 0x10, 0xb8, 0x6a, 0x40, 0xd5, 0xf5, 0x67,
    0x45, 0xa1, 0x18, 0xd0, 0x90, 0x6a, 0x34, 0xe6, 0x9a, 0xec, 0x8c, 0x0d, 0xb1, 0xcb, 0x8f, 0xa3,
]);

const MAINNET_CHECKPOINT_NUMBER: u64 = 7_770_000;
const MAINNET_CHECKPOINT_HASH: H256 = H256([
    0x31, 0x5b, 0x69, 0xe5, 0xa5, 0xf8, 0x0c, 0x49, 0x5a, 0x53, 0xe0, 0x01, 0x41, 0x31, 0xab, 0xb4,
    0xdd, 0xf8, 0xca, 0x14, 0x34, 0x62, 0x1b, 0x2f, 0xaa, 0x73, 0x04, 0xc8, 0xb9, 0xb5, 0xb7, 0xee,
]);

const MAINNET_BOOTNODES: [&str; 6] = [
    "enode://a979fb575495b8d6db44f750317d0f4622bf4c2aa3365d6af7c284339968eef29b69ad0dce72a4d8db5ebb4968de0e3bec910127f134779fbcb0cb6d3331163c@52.16.188.185:30303",
    "enode://3f1d12044546b76342d59d4a05532c14b85aa669704bfe1f864fe079415aa2c02d743e03218e57a33fb94523adb54032871a6c51b2cc5514cb7c7e35b3ed0a99@13.93.211.84:30303",
    "enode://78de8a0916848093c73790ead81d1928bec737d565119932b98c6b100d944b7a95e94f847f689fc723399d2e31129d182f7ef3863f2b4c820abbf3ab2722344d@191.235.84.50:30303",
    "enode://158f8aab45f6d19c6cbf4a089c2670541a8da11978a2f90dbf6a502a4a3bab80d288afdbeb7ec0ef6d92de563767f3b1ea9e8e334ca711e9f8e2df5a0385e8e6@13.75.154.138:30303",
    "enode://1118980bf48b0a3640bdba04e0fe78b1add18e1cd99bf22d53daac1fd9972ad650df52176e7c7d89d1114cfef2bc23a2959aa54998a46afcf7d91809f0855082@52.74.57.123:30303",
    "enode://979b7fa28feeb35a4741660a16076f1943202cb72b6af70d327f053e248bab9ba81760f39d0701ef1d8f89cc1fbd2cacba0710a12cd5314d5e0c9021aa3637f9@5.1.83.226:30303",
];

/// Trusted header the light client starts syncing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub number: u64,
    pub hash: H256,
    #[serde(default)]
    pub total_difficulty: U256,
}

impl Checkpoint {
    pub fn header(&self) -> BlockHeader {
        BlockHeader::checkpoint(self.number, self.hash, self.total_difficulty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[default]
    Mainnet,
    Custom {
        chain_id: u64,
        genesis_hash: H256,
        checkpoint: Checkpoint,
        #[serde(default)]
        bootnodes: Vec<Node>,
    },
}

impl Network {
    /// Network id sent in the LES status. Equal to the chain id for the networks known here.
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => MAINNET_CHAIN_ID,
            Network::Custom { chain_id, .. } => *chain_id,
        }
    }

    pub fn genesis_hash(&self) -> H256 {
        match self {
            Network::Mainnet => MAINNET_GENESIS_HASH,
            Network::Custom { genesis_hash, .. } => *genesis_hash,
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            Network::Mainnet => Checkpoint {
                number: MAINNET_CHECKPOINT_NUMBER,
                hash: MAINNET_CHECKPOINT_HASH,
                total_difficulty: U256::zero(),
            },
            Network::Custom { checkpoint, .. } => *checkpoint,
        }
    }

    pub fn get_bootnodes(&self) -> Vec<Node> {
        match self {
            Network::Mainnet => MAINNET_BOOTNODES
                .iter()
                .filter_map(|enode| Node::from_str(enode).ok())
                .collect(),
            Network::Custom { bootnodes, .. } => bootnodes.clone(),
        }
    }
}

impl FromStr for Network {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            other => Err(NodeError::InvalidFormat(format!("Unknown network: {other}"))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Custom { chain_id, .. } => write!(f, "custom({chain_id})"),
        }
    }
}
