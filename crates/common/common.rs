pub use ethereum_types::*;
pub mod config;
pub mod constants;
pub mod types;
pub use bytes::Bytes;
