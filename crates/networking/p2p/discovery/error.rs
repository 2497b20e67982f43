use ethkit_rlp::error::RLPDecodeError;
use ethkit_storage::error::StoreError;
use thiserror::Error;

/// Reasons a discovery datagram is rejected. Any of them drops the whole packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("Empty datagram")]
    EmptyData,
    #[error("Packet too small: {0} bytes")]
    TooSmall(usize),
    #[error("Packet hash does not match its contents")]
    WrongHash,
    #[error("Unknown packet type 0x{0:02x}")]
    WrongType(u8),
    #[error("Expected at least {expected} fields, got {received}")]
    WrongParameters { expected: usize, received: usize },
    #[error("Unsupported discovery version {0}")]
    WrongVersion(u64),
    #[error("Host is not a 4 byte IPv4 address")]
    WrongHostDecode,
    #[error("Invalid packet signature")]
    InvalidSignature,
    #[error(transparent)]
    RLPDecodeError(#[from] RLPDecodeError),
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No unused nodes left to look up")]
    AllNodesUsed,
    #[error("Discovery peer timed out")]
    Timeout,
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
