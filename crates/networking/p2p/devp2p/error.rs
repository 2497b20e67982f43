use ethkit_rlp::error::{RLPDecodeError, RLPEncodeError};
use thiserror::Error;

use super::message::DisconnectReason;

#[derive(Debug, Error)]
pub enum DevP2PError {
    #[error("No shared capabilities with peer")]
    NoSharedCapabilities,
    #[error("Shared capabilities don't fit in the message code space")]
    CodeSpaceExhausted,
    #[error("Disconnect received: {0}")]
    DisconnectMessageReceived(DisconnectReason),
    #[error("Peer identity doesn't match the dialed node")]
    UnexpectedIdentity,
    #[error("Pong not received in time")]
    PingTimeout,
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),
    #[error(transparent)]
    RLPDecodeError(#[from] RLPDecodeError),
    #[error(transparent)]
    RLPEncodeError(#[from] RLPEncodeError),
}

impl DevP2PError {
    /// Reason sent to the peer when this error tears down the connection.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            DevP2PError::NoSharedCapabilities | DevP2PError::CodeSpaceExhausted => {
                Some(DisconnectReason::UselessPeer)
            }
            DevP2PError::UnexpectedIdentity => Some(DisconnectReason::UnexpectedIdentity),
            DevP2PError::PingTimeout => Some(DisconnectReason::Timeout),
            DevP2PError::UnexpectedMessage(_)
            | DevP2PError::RLPDecodeError(_)
            | DevP2PError::RLPEncodeError(_) => Some(DisconnectReason::ProtocolBreach),
            // The remote already left
            DevP2PError::DisconnectMessageReceived(_) => None,
        }
    }
}
