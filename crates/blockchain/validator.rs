use ethkit_common::types::BlockHeader;

use crate::error::ValidationError;

/// Checks that `headers` is a chain starting at the trusted header `from`.
///
/// Only the links are checked: the first header must be `from` itself and every other
/// header must name the previous one as its parent. Proof of work and difficulty are not
/// verified.
pub fn validate_headers(from: &BlockHeader, headers: &[BlockHeader]) -> Result<(), ValidationError> {
    let Some(first) = headers.first() else {
        return Err(ValidationError::InvalidChain);
    };
    if first.hash() != from.hash() {
        return Err(ValidationError::ForkDetected);
    }
    for pair in headers.windows(2) {
        if pair[1].parent_hash != pair[0].hash() {
            return Err(ValidationError::InvalidChain);
        }
    }
    Ok(())
}
