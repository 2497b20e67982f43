use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RLPDecodeError {
    #[error("Invalid RLP length")]
    InvalidLength,
    #[error("Malformed RLP data")]
    MalformedData,
    #[error("Malformed boolean: expected 0x80 or 0x01, got 0x{0:02x}")]
    MalformedBoolean(u8),
    #[error("Expected RLP string, got list")]
    UnexpectedList,
    #[error("Expected RLP list, got string")]
    UnexpectedString,
    #[error("{0}")]
    Custom(String),
}

#[derive(Debug, Error)]
pub enum RLPEncodeError {
    #[error("{0}")]
    Custom(String),
}
