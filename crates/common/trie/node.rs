use ethereum_types::H256;
use ethkit_rlp::{
    decode::RLPDecode,
    error::RLPDecodeError,
    item::{RLPItem, RLPValue},
};
use keccak_hash::keccak;

use crate::nibbles::Nibbles;

const BRANCH_ELEMENTS: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Null,
    Branch,
    Extension,
    Leaf,
}

/// A trie node as received in a proof, kept in its raw element form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieNode {
    pub node_type: NodeType,
    /// Keccak of the node's encoding, which is how its parent references it.
    pub hash: H256,
    pub elements: Vec<RLPItem>,
    /// Path fragment held by leaf and extension nodes, empty otherwise.
    pub encoded_path: Nibbles,
}

impl TrieNode {
    pub fn decode_raw(raw: &[u8]) -> Result<Self, RLPDecodeError> {
        let hash = keccak(raw);
        let elements = match RLPItem::decode(raw)?.kind() {
            RLPValue::List(elements) => elements.clone(),
            RLPValue::Data(_) => {
                return Ok(Self {
                    node_type: NodeType::Null,
                    hash,
                    elements: vec![],
                    encoded_path: Nibbles::default(),
                });
            }
        };

        let (node_type, encoded_path) = match elements.len() {
            0 => (NodeType::Null, Nibbles::default()),
            BRANCH_ELEMENTS => (NodeType::Branch, Nibbles::default()),
            2 => {
                let (path, is_leaf) = Nibbles::decode_compact(elements[0].data_value()?)
                    .ok_or(RLPDecodeError::MalformedData)?;
                let node_type = if is_leaf {
                    NodeType::Leaf
                } else {
                    NodeType::Extension
                };
                (node_type, path)
            }
            _ => return Err(RLPDecodeError::MalformedData),
        };

        Ok(Self {
            node_type,
            hash,
            elements,
            encoded_path,
        })
    }

    /// Resolves the path fragment this node contributes on the way to a child.
    ///
    /// With no child, a leaf yields its own path. With a child hash, a branch yields the
    /// index of the slot holding it and an extension yields its path if it points to it.
    /// Returns `None` if this node doesn't reference the child.
    pub fn get_path(&self, element_hash: Option<H256>) -> Option<Nibbles> {
        let references = |item: &RLPItem, hash: &H256| {
            item.data_value().is_ok_and(|data| data == hash.as_bytes())
        };
        match (self.node_type, element_hash) {
            (NodeType::Leaf, None) => Some(self.encoded_path.clone()),
            (NodeType::Branch, Some(hash)) => self.elements[..BRANCH_ELEMENTS - 1]
                .iter()
                .position(|child| references(child, &hash))
                .map(|index| Nibbles::from_hex(vec![index as u8])),
            (NodeType::Extension, Some(hash)) => self
                .elements
                .get(1)
                .filter(|child| references(*child, &hash))
                .map(|_| self.encoded_path.clone()),
            _ => None,
        }
    }

    /// Value stored in a leaf node.
    pub fn value(&self) -> Option<&[u8]> {
        match self.node_type {
            NodeType::Leaf => self.elements.get(1)?.data_value().ok(),
            _ => None,
        }
    }
}
