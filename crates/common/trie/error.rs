use ethkit_rlp::error::RLPDecodeError;
use thiserror::Error;

/// Reasons an account proof is rejected. Every variant is fatal to the proof.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error(transparent)]
    RLPDecode(#[from] RLPDecodeError),
    #[error("Proof has no nodes")]
    NoNodes,
    #[error("Last proof node is not a leaf")]
    StateNodeNotFound,
    #[error("Leaf value is not an account state")]
    WrongState,
    #[error("Proof nodes are not linked by their hashes")]
    NodesNotInterconnected,
    #[error("Proof path does not match the address hash")]
    PathDoesNotMatchAddressHash,
    #[error("Proof root does not match the state root")]
    RootHashDoesNotMatchStateRoot,
}
