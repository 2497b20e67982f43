use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Custom(String),
    #[error("Failed to lock database")]
    LockError,
}
