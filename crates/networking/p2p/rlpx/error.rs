use ethkit_rlp::error::{RLPDecodeError, RLPEncodeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptographyError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Invalid generated secret: {0}")]
    InvalidGeneratedSecret(String),
    #[error("Couldn't get key from secret: {0}")]
    CouldNotGetKeyFromSecret(String),
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
}

#[derive(Debug, Error)]
pub enum EciesError {
    #[error("Encrypted message too short: {0} bytes")]
    MessageTooShort(usize),
    #[error("Message too long to be encrypted")]
    MessageTooLong,
    #[error("Message checksum mismatch")]
    MacMismatch,
    #[error(transparent)]
    Cryptography(#[from] CryptographyError),
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Invalid remote public key")]
    InvalidRemotePublicKey,
    #[error("Auth message was not sent yet")]
    AuthNotSent,
    #[error("Invalid auth ack payload: {0}")]
    InvalidAuthAckPayload(String),
    #[error(transparent)]
    Ecies(#[from] EciesError),
    #[error(transparent)]
    Cryptography(#[from] CryptographyError),
}

#[derive(Debug, Error)]
pub enum RLPxError {
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("Frame MAC mismatch")]
    MacMismatch,
    #[error("Invalid message length")]
    InvalidMessageLength,
    #[error("Connection closed by peer")]
    Disconnected,
    #[error("Cryptography error: {0}")]
    CryptographyError(String),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    RLPDecodeError(#[from] RLPDecodeError),
    #[error(transparent)]
    RLPEncodeError(#[from] RLPEncodeError),
}

// Grouping all cryptographic errors in a single CryptographyError variant
// We can improve this to individual errors if required
impl From<aes::cipher::InvalidLength> for RLPxError {
    fn from(e: aes::cipher::InvalidLength) -> Self {
        RLPxError::CryptographyError(e.to_string())
    }
}
