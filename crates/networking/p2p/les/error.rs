use ethkit_common::H256;
use ethkit_rlp::error::{RLPDecodeError, RLPEncodeError};
use ethkit_trie::ProofError;
use thiserror::Error;

/// Reasons a peer's Status is refused, checked in declaration order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid protocol version: expected {expected}, got {received}")]
    InvalidProtocolVersion { expected: u8, received: u8 },
    #[error("Wrong network: expected {expected_network}/{expected_genesis:#x}, got {network}/{genesis:#x}")]
    WrongNetwork {
        expected_network: u64,
        expected_genesis: H256,
        network: u64,
        genesis: H256,
    },
    #[error("Peer best block {remote} is behind ours at {local}")]
    ExpiredBestBlockHeight { local: u64, remote: u64 },
}

#[derive(Debug, Error)]
pub enum LesError {
    #[error("Status message without entries")]
    NoStatus,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid proof: {0}")]
    Proof(#[from] ProofError),
    #[error(transparent)]
    RLPDecodeError(#[from] RLPDecodeError),
    #[error(transparent)]
    RLPEncodeError(#[from] RLPEncodeError),
}
