use ethkit_p2p::{PeerError, discovery::DiscoveryError};
use ethkit_storage::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Headers do not form a chain")]
    InvalidChain,
    #[error("Headers do not start at the expected block")]
    ForkDetected,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Invalid headers: {0}")]
    Validation(#[from] ValidationError),
    #[error("Peer is on a fork sharing no stored block")]
    InvalidForkedPeer,
    #[error("DB error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),
    #[error("No peer connected")]
    NoPeer,
    #[error("Light client is not running")]
    Stopped,
}

impl SyncError {
    /// Whether the error is the current peer's doing, so another peer can be tried.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            SyncError::Validation(_)
                | SyncError::InvalidForkedPeer
                | SyncError::Peer(_)
                | SyncError::NoPeer
        )
    }
}
