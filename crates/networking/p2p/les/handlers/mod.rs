mod account_state;
mod announce;
mod block_headers;
mod handshake;
mod send_transaction;

pub use account_state::AccountStateHandler;
pub use announce::AnnounceHandler;
pub use block_headers::BlockHeadersHandler;
pub use handshake::HandshakeHandler;
pub use send_transaction::SendTransactionHandler;
