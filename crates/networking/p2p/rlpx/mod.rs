pub mod connection;
pub mod ecies;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod utils;

pub use connection::RLPxConnection;
pub use frame::{Frame, RLPxCodec};
pub use handshake::{Handshake, Secrets};
