use std::collections::HashSet;

use ethkit_common::{H256, types::SignedTransaction};
use ethkit_p2p::les::Task;
use tracing::debug;

use crate::{error::SyncError, sync::TaskPerformer};

/// Submits wallet transactions and tracks which sends still wait for a status.
#[derive(Debug, Default)]
pub struct TransactionSender {
    pending: HashSet<u64>,
}

impl TransactionSender {
    pub fn send(
        &mut self,
        performer: &dyn TaskPerformer,
        send_id: u64,
        transaction: SignedTransaction,
    ) -> Result<(), SyncError> {
        debug!("Sending transaction {:#x} as send {send_id}", transaction.hash());
        performer.perform(Task::SendTransaction {
            send_id,
            transaction,
        })?;
        self.pending.insert(send_id);
        Ok(())
    }

    /// Result to report for a status answer, or `None` if `send_id` isn't waiting.
    pub fn resolve(
        &mut self,
        send_id: u64,
        result: Result<H256, String>,
    ) -> Option<Result<H256, String>> {
        self.pending.remove(&send_id).then_some(result)
    }

    /// Ids of the sends the lost peer never answered.
    pub fn abandon(&mut self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.drain().collect();
        ids.sort_unstable();
        ids
    }
}
