use std::sync::Arc;

use ethkit_common::{H256, U256, types::BlockHeader};
use ethkit_p2p::les::Task;
use ethkit_storage::SpvStore;
use tracing::{debug, info, warn};

use crate::{
    error::{SyncError, ValidationError},
    sync::TaskPerformer,
    validator::validate_headers,
};

/// Head a peer claims to have, from its Status or its latest Announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestBlock {
    pub hash: H256,
    pub number: u64,
    pub total_difficulty: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadersOutcome {
    /// Headers up to this height were stored and the next batch was requested.
    Progress(u64),
    /// The peer had nothing past this header.
    Synced(BlockHeader),
    /// The peer's chain diverged from ours and a request to find where was issued.
    ForkResolving,
}

/// Downloads headers in batches of `limit`, forward from the last stored header.
#[derive(Debug)]
pub struct BlockSyncer {
    store: Arc<dyn SpvStore>,
    checkpoint: BlockHeader,
    limit: u64,
    best: Option<BestBlock>,
    syncing: bool,
}

impl BlockSyncer {
    /// `limit` is raised to 2: a batch always repeats the header it starts from.
    pub fn new(store: Arc<dyn SpvStore>, checkpoint: BlockHeader, limit: u64) -> Self {
        Self {
            store,
            checkpoint,
            limit: limit.max(2),
            best: None,
            syncing: false,
        }
    }

    /// Last stored header, or the checkpoint when nothing was synced yet.
    pub fn last_header(&self) -> Result<BlockHeader, SyncError> {
        Ok(self
            .store
            .last_block_header()?
            .unwrap_or_else(|| self.checkpoint.clone()))
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    pub fn best(&self) -> Option<&BestBlock> {
        self.best.as_ref()
    }

    /// Records the peer's head. Announces of heads below the known one are ignored.
    pub fn set_best(&mut self, best: BestBlock) {
        if let Some(current) = self.best
            && current.number > best.number
        {
            debug!("Ignoring head {} below {}", best.number, current.number);
            return;
        }
        self.best = Some(best);
    }

    /// Whether the peer's head is ahead of ours, or at the same height on another branch.
    pub fn needs_sync(&self) -> Result<bool, SyncError> {
        let Some(best) = self.best else {
            return Ok(false);
        };
        let local = self.last_header()?;
        Ok(local.number < best.number || (local.number == best.number && local.hash() != best.hash))
    }

    /// Starts a sync unless one is running or there is nothing to fetch. Returns whether
    /// one was started.
    pub fn sync(&mut self, performer: &dyn TaskPerformer) -> Result<bool, SyncError> {
        if self.syncing || !self.needs_sync()? {
            return Ok(false);
        }
        let from = self.last_header()?;
        info!("Syncing headers from block {}", from.number);
        self.request(performer, from, false)?;
        self.syncing = true;
        Ok(true)
    }

    /// Forgets the peer. A sync in flight is abandoned.
    pub fn reset(&mut self) {
        self.best = None;
        self.syncing = false;
    }

    pub fn handle_headers(
        &mut self,
        performer: &dyn TaskPerformer,
        block_header: BlockHeader,
        headers: Vec<BlockHeader>,
        reverse: bool,
    ) -> Result<HeadersOutcome, SyncError> {
        let result = if reverse {
            self.resolve_fork(performer, &block_header, &headers)
        } else {
            self.extend(performer, block_header, headers)
        };
        if !matches!(
            result,
            Ok(HeadersOutcome::Progress(_) | HeadersOutcome::ForkResolving)
        ) {
            self.syncing = false;
        }
        result
    }

    fn extend(
        &mut self,
        performer: &dyn TaskPerformer,
        block_header: BlockHeader,
        headers: Vec<BlockHeader>,
    ) -> Result<HeadersOutcome, SyncError> {
        match validate_headers(&block_header, &headers) {
            Ok(()) => {}
            Err(ValidationError::ForkDetected) => {
                warn!("Fork detected at block {}", block_header.number);
                self.request(performer, block_header, true)?;
                return Ok(HeadersOutcome::ForkResolving);
            }
            Err(err) => return Err(err.into()),
        }

        self.store.save_block_headers(&headers)?;
        let count = headers.len() as u64;
        let Some(last) = headers.into_iter().last() else {
            return Err(ValidationError::InvalidChain.into());
        };
        debug!("Stored {count} headers up to block {}", last.number);

        if count < self.limit {
            info!("Headers synced up to block {}", last.number);
            return Ok(HeadersOutcome::Synced(last));
        }
        let height = last.number;
        self.request(performer, last, false)?;
        Ok(HeadersOutcome::Progress(height))
    }

    /// Finds the highest stored header the peer's reversed batch agrees with and syncs
    /// forward from it.
    fn resolve_fork(
        &mut self,
        performer: &dyn TaskPerformer,
        block_header: &BlockHeader,
        headers: &[BlockHeader],
    ) -> Result<HeadersOutcome, SyncError> {
        let stored = self
            .store
            .reversed_last_block_headers(block_header.number, self.limit as usize)?;
        let common = stored.into_iter().find(|stored| {
            headers
                .iter()
                .any(|header| header.number == stored.number && header.hash() == stored.hash())
        });
        let Some(common) = common else {
            return Err(SyncError::InvalidForkedPeer);
        };

        info!("Fork resolved at block {}", common.number);
        self.request(performer, common, false)?;
        Ok(HeadersOutcome::ForkResolving)
    }

    fn request(
        &self,
        performer: &dyn TaskPerformer,
        block_header: BlockHeader,
        reverse: bool,
    ) -> Result<(), SyncError> {
        performer.perform(Task::BlockHeaders {
            block_header,
            limit: self.limit,
            reverse,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ethkit_storage::InMemorySpvStore;

    use super::*;
    use crate::sync::tests::RecordingPerformer;

    const LIMIT: u64 = 3;

    /// Linked headers numbered `start..start + length`, the first one child of `parent`.
    fn chain(parent: &BlockHeader, length: u64, extra: u8) -> Vec<BlockHeader> {
        let mut headers = Vec::new();
        let mut parent_hash = parent.hash();
        for number in parent.number + 1..=parent.number + length {
            let header = BlockHeader {
                number,
                parent_hash,
                extra_data: vec![extra].into(),
                ..Default::default()
            };
            parent_hash = header.hash();
            headers.push(header);
        }
        headers
    }

    fn genesis() -> BlockHeader {
        BlockHeader {
            number: 0,
            gas_limit: 5000,
            ..Default::default()
        }
    }

    fn syncer() -> (BlockSyncer, Arc<dyn SpvStore>) {
        let store: Arc<dyn SpvStore> = Arc::new(InMemorySpvStore::new());
        (BlockSyncer::new(store.clone(), genesis(), LIMIT), store)
    }

    fn best(header: &BlockHeader) -> BestBlock {
        BestBlock {
            hash: header.hash(),
            number: header.number,
            total_difficulty: U256::zero(),
        }
    }

    fn batch(from: &BlockHeader, rest: &[BlockHeader]) -> Vec<BlockHeader> {
        std::iter::once(from.clone()).chain(rest.iter().cloned()).collect()
    }

    #[test]
    fn sync_only_when_behind_or_on_another_branch() {
        let (mut syncer, _) = syncer();
        let performer = RecordingPerformer::default();
        assert!(!syncer.sync(&performer).unwrap());

        syncer.set_best(best(&genesis()));
        assert!(!syncer.needs_sync().unwrap());

        let other = BlockHeader {
            gas_limit: 1,
            ..genesis()
        };
        syncer.set_best(best(&other));
        assert!(syncer.needs_sync().unwrap());

        let ahead = chain(&genesis(), 1, 0);
        syncer.set_best(best(&ahead[0]));
        assert!(syncer.sync(&performer).unwrap());
        // Already syncing
        assert!(!syncer.sync(&performer).unwrap());
        assert_eq!(
            performer.take(),
            vec![Task::BlockHeaders {
                block_header: genesis(),
                limit: LIMIT,
                reverse: false,
            }]
        );
    }

    #[test]
    fn full_batches_continue_and_short_batch_finishes() {
        let (mut syncer, store) = syncer();
        let performer = RecordingPerformer::default();
        let headers = chain(&genesis(), 4, 0);
        syncer.set_best(best(&headers[3]));
        syncer.sync(&performer).unwrap();
        performer.take();

        let outcome = syncer
            .handle_headers(&performer, genesis(), batch(&genesis(), &headers[..2]), false)
            .unwrap();
        assert_eq!(outcome, HeadersOutcome::Progress(2));
        assert_eq!(
            performer.take(),
            vec![Task::BlockHeaders {
                block_header: headers[1].clone(),
                limit: LIMIT,
                reverse: false,
            }]
        );

        let outcome = syncer
            .handle_headers(
                &performer,
                headers[1].clone(),
                batch(&headers[1], &headers[2..]),
                false,
            )
            .unwrap();
        assert_eq!(outcome, HeadersOutcome::Progress(4));
        performer.take();

        let outcome = syncer
            .handle_headers(&performer, headers[3].clone(), vec![headers[3].clone()], false)
            .unwrap();
        assert_eq!(outcome, HeadersOutcome::Synced(headers[3].clone()));
        assert!(performer.take().is_empty());
        assert!(!syncer.is_syncing());
        assert_eq!(store.last_block_header().unwrap(), Some(headers[3].clone()));
    }

    #[test]
    fn broken_chain_fails_and_stores_nothing() {
        let (mut syncer, store) = syncer();
        let performer = RecordingPerformer::default();
        let mut headers = chain(&genesis(), 2, 0);
        syncer.set_best(best(&headers[1]));
        syncer.sync(&performer).unwrap();

        headers[1].parent_hash = H256::repeat_byte(0x0b);
        let result = syncer.handle_headers(&performer, genesis(), batch(&genesis(), &headers), false);
        assert!(matches!(
            result,
            Err(SyncError::Validation(ValidationError::InvalidChain))
        ));
        assert!(!syncer.is_syncing());
        assert_eq!(store.last_block_header().unwrap(), None);
    }

    #[test]
    fn fork_resumes_from_the_common_header() {
        let (mut syncer, store) = syncer();
        let performer = RecordingPerformer::default();
        let ours = chain(&genesis(), 3, 0);
        store.save_block_headers(&batch(&genesis(), &ours)).unwrap();

        // The peer replaced blocks 2 and 3
        let theirs = batch(&ours[0], &chain(&ours[0], 3, 1));
        syncer.set_best(best(&theirs[3]));
        assert!(syncer.sync(&performer).unwrap());
        let from = ours[2].clone();
        performer.take();

        let outcome = syncer
            .handle_headers(&performer, from.clone(), theirs[2..].to_vec(), false)
            .unwrap();
        assert_eq!(outcome, HeadersOutcome::ForkResolving);
        assert_eq!(
            performer.take(),
            vec![Task::BlockHeaders {
                block_header: from.clone(),
                limit: LIMIT,
                reverse: true,
            }]
        );

        let reversed: Vec<_> = theirs[..3].iter().rev().cloned().collect();
        let outcome = syncer
            .handle_headers(&performer, from, reversed, true)
            .unwrap();
        assert_eq!(outcome, HeadersOutcome::ForkResolving);
        assert_eq!(
            performer.take(),
            vec![Task::BlockHeaders {
                block_header: ours[0].clone(),
                limit: LIMIT,
                reverse: false,
            }]
        );
        assert!(syncer.is_syncing());
    }

    #[test]
    fn fork_without_common_header_is_rejected() {
        let (mut syncer, store) = syncer();
        let performer = RecordingPerformer::default();
        let ours = chain(&genesis(), 2, 0);
        store.save_block_headers(&batch(&genesis(), &ours)).unwrap();

        let other_genesis = BlockHeader {
            gas_limit: 1,
            ..genesis()
        };
        let theirs = batch(&other_genesis, &chain(&other_genesis, 2, 1));
        let reversed: Vec<_> = theirs.iter().rev().cloned().collect();

        let result = syncer.handle_headers(&performer, ours[1].clone(), reversed, true);
        assert!(matches!(result, Err(SyncError::InvalidForkedPeer)));
        assert!(performer.take().is_empty());
    }

    #[test]
    fn lower_announce_keeps_the_best_head() {
        let (mut syncer, _) = syncer();
        let headers = chain(&genesis(), 2, 0);
        syncer.set_best(best(&headers[1]));
        syncer.set_best(best(&headers[0]));
        assert_eq!(syncer.best(), Some(&best(&headers[1])));

        syncer.reset();
        assert_eq!(syncer.best(), None);
    }
}
