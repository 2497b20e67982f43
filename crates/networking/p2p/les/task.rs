use ethkit_common::{
    Address, H256, U256,
    types::{AccountState, BlockHeader, SignedTransaction},
};

/// Work the orchestrator asks a peer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Exchange Status, announcing `head` as our best header.
    Handshake {
        network_id: u64,
        genesis_hash: H256,
        head: BlockHeader,
    },
    /// Up to `limit` headers starting at `block_header`, walking backwards if `reverse`.
    BlockHeaders {
        block_header: BlockHeader,
        limit: u64,
        reverse: bool,
    },
    /// Proven state of `address` at `block_header`.
    AccountState {
        address: Address,
        block_header: BlockHeader,
    },
    SendTransaction {
        send_id: u64,
        transaction: SignedTransaction,
    },
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Handshake { .. } => "Handshake",
            Task::BlockHeaders { .. } => "BlockHeaders",
            Task::AccountState { .. } => "AccountState",
            Task::SendTransaction { .. } => "SendTransaction",
        }
    }
}

/// Notifications a peer sends up to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// DevP2P Hello exchange done, LES can start.
    Connected,
    Disconnected(String),
    HandshakeCompleted {
        head_hash: H256,
        head_number: u64,
        head_td: U256,
    },
    BlockHeadersReceived {
        block_header: BlockHeader,
        headers: Vec<BlockHeader>,
        reverse: bool,
    },
    AccountStateReceived(AccountState),
    TransactionSent {
        send_id: u64,
        hash: H256,
    },
    TransactionFailed {
        send_id: u64,
        error: String,
    },
    BlockAnnounced {
        hash: H256,
        number: u64,
        total_difficulty: U256,
    },
}
