use std::sync::Arc;

use ethkit_common::{
    Address,
    types::{AccountState, BlockHeader},
};
use ethkit_p2p::les::Task;
use ethkit_storage::SpvStore;
use tracing::{debug, warn};

use crate::{error::SyncError, sync::TaskPerformer};

/// Keeps the wallet account's proven state.
#[derive(Debug)]
pub struct AccountStateSyncer {
    store: Arc<dyn SpvStore>,
    address: Address,
}

impl AccountStateSyncer {
    pub fn new(store: Arc<dyn SpvStore>, address: Address) -> Self {
        Self { store, address }
    }

    /// Requests the account proof at `block_header`.
    pub fn sync(
        &self,
        performer: &dyn TaskPerformer,
        block_header: BlockHeader,
    ) -> Result<(), SyncError> {
        debug!(
            "Requesting state of {:#x} at block {}",
            self.address, block_header.number
        );
        performer.perform(Task::AccountState {
            address: self.address,
            block_header,
        })?;
        Ok(())
    }

    /// Stores a verified state. Returns false for states of other accounts, which are
    /// dropped.
    pub fn handle(&self, state: &AccountState) -> Result<bool, SyncError> {
        if state.address != self.address {
            warn!("Dropping state of unexpected account {:#x}", state.address);
            return Ok(false);
        }
        self.store.save_account_state(state)?;
        Ok(true)
    }

    /// Last stored state, or an empty account if none was synced.
    pub fn state(&self) -> Result<AccountState, SyncError> {
        Ok(self
            .store
            .account_state(self.address)?
            .unwrap_or_else(|| AccountState::empty(self.address)))
    }
}
