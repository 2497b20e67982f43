//! # ethkit light client
//!
//! Header sync and account state verification on top of the LES peer stack.
//!
//! [`SpvBlockchain`] owns the pieces: a [`NodeManager`](ethkit_p2p::discovery::NodeManager)
//! picks nodes, one peer at a time is connected, [`BlockSyncer`] downloads and validates
//! headers from it and [`AccountStateSyncer`] fetches the proven state of the wallet
//! account at the synced head. The wallet hears back through [`WalletDelegate`] or polls
//! an [`SpvHandle`].

pub mod config;
pub mod delegate;
pub mod error;
pub mod spv;
pub mod sync;
pub mod transaction_sender;
pub mod validator;

pub use config::{ConfigError, SpvConfig};
pub use delegate::{NoopDelegate, WalletDelegate};
pub use error::{SyncError, ValidationError};
pub use spv::{SpvBlockchain, SpvHandle};
pub use sync::{AccountStateSyncer, BlockSyncer, SyncState, TaskPerformer};
pub use transaction_sender::TransactionSender;
pub use validator::validate_headers;
