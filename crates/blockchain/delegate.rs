use ethkit_common::{H256, H512, types::AccountState};

use crate::sync::SyncState;

/// Callbacks of the wallet embedding the light client. They are called from the task
/// running [`SpvBlockchain::run`](crate::SpvBlockchain::run) and should return quickly.
pub trait WalletDelegate: Send + Sync {
    fn on_handshake_complete(&self, _peer_id: H512, _head_hash: H256, _head_number: u64) {}

    /// Headers up to `last_block_height` were stored.
    fn on_headers_received(&self, _last_block_height: u64) {}

    fn on_account_state_updated(&self, _state: &AccountState) {}

    /// Outcome of the send numbered `send_id`: the transaction hash or the peer's error.
    fn on_send_result(&self, _send_id: u64, _result: Result<H256, String>) {}

    fn on_sync_state_changed(&self, _state: &SyncState) {}
}

/// Delegate for callers that only poll.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelegate;

impl WalletDelegate for NoopDelegate {}
