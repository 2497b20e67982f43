//! Merkle-Patricia trie primitives needed by a light client: decoding proof nodes
//! and verifying account proofs against a block's state root.

pub mod error;
mod nibbles;
mod node;
mod proof;

pub use self::error::ProofError;
pub use self::nibbles::Nibbles;
pub use self::node::{NodeType, TrieNode};
pub use self::proof::verify_account_proof;
