use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::constants::{EMPTY_KECCACK_HASH, EMPTY_TRIE_HASH};

/// State of an account at some block, as proven against that block's state root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub address: Address,
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: H256,
    pub code_hash: H256,
}

impl AccountState {
    /// State of an account that was never touched.
    pub fn empty(address: Address) -> Self {
        Self {
            address,
            nonce: 0,
            balance: U256::zero(),
            storage_root: EMPTY_TRIE_HASH,
            code_hash: EMPTY_KECCACK_HASH,
        }
    }
}
