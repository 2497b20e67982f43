use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use ethkit_common::{
    Address, H512,
    types::{AccountState, BlockHeader, BlockNumber, NodeRecord},
};

use crate::{
    api::{NodeStore, SpvStore},
    error::StoreError,
};

#[derive(Default, Clone, Debug)]
pub struct InMemorySpvStore(Arc<Mutex<SpvStoreInner>>);

#[derive(Default, Debug)]
struct SpvStoreInner {
    headers: BTreeMap<BlockNumber, BlockHeader>,
    account_states: HashMap<Address, AccountState>,
}

impl InMemorySpvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, SpvStoreInner>, StoreError> {
        self.0.lock().map_err(|_| StoreError::LockError)
    }
}

impl SpvStore for InMemorySpvStore {
    fn save_block_headers(&self, headers: &[BlockHeader]) -> Result<(), StoreError> {
        let mut store = self.inner()?;
        for header in headers {
            store.headers.insert(header.number, header.clone());
        }
        Ok(())
    }

    fn last_block_header(&self) -> Result<Option<BlockHeader>, StoreError> {
        Ok(self
            .inner()?
            .headers
            .last_key_value()
            .map(|(_, header)| header.clone()))
    }

    fn block_header(&self, number: BlockNumber) -> Result<Option<BlockHeader>, StoreError> {
        Ok(self.inner()?.headers.get(&number).cloned())
    }

    fn reversed_last_block_headers(
        &self,
        from: BlockNumber,
        limit: usize,
    ) -> Result<Vec<BlockHeader>, StoreError> {
        Ok(self
            .inner()?
            .headers
            .range(..=from)
            .rev()
            .take(limit)
            .map(|(_, header)| header.clone())
            .collect())
    }

    fn save_account_state(&self, state: &AccountState) -> Result<(), StoreError> {
        self.inner()?
            .account_states
            .insert(state.address, state.clone());
        Ok(())
    }

    fn account_state(&self, address: Address) -> Result<Option<AccountState>, StoreError> {
        Ok(self.inner()?.account_states.get(&address).cloned())
    }
}

#[derive(Default, Clone, Debug)]
pub struct InMemoryNodeStore(Arc<Mutex<HashMap<H512, NodeRecord>>>);

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, HashMap<H512, NodeRecord>>, StoreError> {
        self.0.lock().map_err(|_| StoreError::LockError)
    }

    fn update(&self, id: H512, f: impl FnOnce(&mut NodeRecord)) -> Result<(), StoreError> {
        if let Some(record) = self.inner()?.get_mut(&id) {
            f(record);
        }
        Ok(())
    }
}

impl NodeStore for InMemoryNodeStore {
    fn save(&self, records: &[NodeRecord]) -> Result<(), StoreError> {
        let mut nodes = self.inner()?;
        for record in records {
            nodes.insert(record.id(), record.clone());
        }
        Ok(())
    }

    fn node(&self, id: H512) -> Result<Option<NodeRecord>, StoreError> {
        Ok(self.inner()?.get(&id).cloned())
    }

    fn least_score_node(&self, exclude: &HashSet<H512>) -> Result<Option<NodeRecord>, StoreError> {
        Ok(self
            .inner()?
            .values()
            .filter(|record| record.eligible && !exclude.contains(&record.id()))
            .min_by_key(|record| (record.score, record.id()))
            .cloned())
    }

    fn non_used_nodes(&self, limit: usize) -> Result<Vec<NodeRecord>, StoreError> {
        let nodes = self.inner()?;
        let mut candidates: Vec<_> = nodes
            .values()
            .filter(|record| !record.used && record.eligible)
            .cloned()
            .collect();
        candidates.sort_by_key(|record| (record.timestamp, record.id()));
        candidates.truncate(limit);
        Ok(candidates)
    }

    fn mark_used(&self, id: H512) -> Result<(), StoreError> {
        self.update(id, |record| record.used = true)
    }

    fn increase_score(&self, id: H512) -> Result<(), StoreError> {
        self.update(id, |record| record.score = record.score.saturating_add(1))
    }

    fn mark_non_eligible(&self, id: H512) -> Result<(), StoreError> {
        self.update(id, |record| record.eligible = false)
    }

    fn remove(&self, id: H512) -> Result<(), StoreError> {
        self.inner()?.remove(&id);
        Ok(())
    }
}
