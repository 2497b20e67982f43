//! Storage seams of the light client. Engines only need to persist what they are
//! given; ordering and eligibility rules are part of the contract documented on
//! each method.

use std::{collections::HashSet, fmt::Debug};

use ethkit_common::{
    Address, H512,
    types::{AccountState, BlockHeader, BlockNumber, NodeRecord},
};

use crate::error::StoreError;

/// Synced block headers and proven account states.
pub trait SpvStore: Debug + Send + Sync {
    /// Stores headers, replacing any header already stored at the same height.
    fn save_block_headers(&self, headers: &[BlockHeader]) -> Result<(), StoreError>;

    /// Header with the highest number.
    fn last_block_header(&self) -> Result<Option<BlockHeader>, StoreError>;

    fn block_header(&self, number: BlockNumber) -> Result<Option<BlockHeader>, StoreError>;

    /// Up to `limit` headers numbered `from` or lower, highest first.
    fn reversed_last_block_headers(
        &self,
        from: BlockNumber,
        limit: usize,
    ) -> Result<Vec<BlockHeader>, StoreError>;

    /// Stores a state, replacing the one already stored for its address.
    fn save_account_state(&self, state: &AccountState) -> Result<(), StoreError>;

    fn account_state(&self, address: Address) -> Result<Option<AccountState>, StoreError>;
}

/// Nodes learned through discovery, with their usage bookkeeping.
pub trait NodeStore: Debug + Send + Sync {
    /// Stores records, replacing the ones already stored under the same id.
    fn save(&self, records: &[NodeRecord]) -> Result<(), StoreError>;

    fn node(&self, id: H512) -> Result<Option<NodeRecord>, StoreError>;

    /// Eligible node with the lowest score, ties broken by id. Nodes in `exclude` are skipped.
    fn least_score_node(&self, exclude: &HashSet<H512>) -> Result<Option<NodeRecord>, StoreError>;

    /// Up to `limit` eligible nodes not yet used by discovery, oldest first.
    fn non_used_nodes(&self, limit: usize) -> Result<Vec<NodeRecord>, StoreError>;

    fn mark_used(&self, id: H512) -> Result<(), StoreError>;

    fn increase_score(&self, id: H512) -> Result<(), StoreError>;

    fn mark_non_eligible(&self, id: H512) -> Result<(), StoreError>;

    fn remove(&self, id: H512) -> Result<(), StoreError>;
}
