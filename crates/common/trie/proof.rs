use ethereum_types::{Address, H256};
use ethkit_common::types::AccountState;
use ethkit_rlp::{decode::RLPDecode, item::RLPItem};
use keccak_hash::keccak;
use tracing::debug;

use crate::{
    error::ProofError,
    nibbles::Nibbles,
    node::{NodeType, TrieNode},
};

/// Verifies a state trie proof for `address` and returns the proven account state.
///
/// `proof` holds the encoded nodes from the root down to the account's leaf. The path
/// is rebuilt from the leaf upwards, following each parent's reference to its child,
/// and must match `keccak(address)`. The topmost node must hash to `state_root`.
pub fn verify_account_proof<T: AsRef<[u8]>>(
    address: Address,
    state_root: H256,
    proof: &[T],
) -> Result<AccountState, ProofError> {
    if proof.is_empty() {
        return Err(ProofError::NoNodes);
    }
    let nodes = proof
        .iter()
        .map(|raw| TrieNode::decode_raw(raw.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    let (leaf, parents) = nodes.split_last().ok_or(ProofError::NoNodes)?;

    if leaf.node_type != NodeType::Leaf {
        return Err(ProofError::StateNodeNotFound);
    }
    let state = decode_account(address, leaf.value().ok_or(ProofError::WrongState)?)?;

    let mut path = leaf.get_path(None).ok_or(ProofError::StateNodeNotFound)?;
    let mut child_hash = leaf.hash;
    for node in parents.iter().rev() {
        let fragment = node
            .get_path(Some(child_hash))
            .ok_or(ProofError::NodesNotInterconnected)?;
        path = fragment.concat(&path);
        child_hash = node.hash;
    }

    if path != Nibbles::from_bytes(keccak(address).as_bytes()) {
        return Err(ProofError::PathDoesNotMatchAddressHash);
    }
    if nodes[0].hash != state_root {
        debug!(
            "Proof root {:#x} does not match state root {state_root:#x}",
            nodes[0].hash
        );
        return Err(ProofError::RootHashDoesNotMatchStateRoot);
    }
    Ok(state)
}

/// Decodes a leaf value of the form `[nonce, balance, storage_root, code_hash]`.
fn decode_account(address: Address, value: &[u8]) -> Result<AccountState, ProofError> {
    let item = RLPItem::decode(value).map_err(|_| ProofError::WrongState)?;
    let [nonce, balance, storage_root, code_hash] = item.list_value().map_err(|_| ProofError::WrongState)?
    else {
        return Err(ProofError::WrongState);
    };
    Ok(AccountState {
        address,
        nonce: nonce.int_value().map_err(|_| ProofError::WrongState)?,
        balance: balance.big_int_value().map_err(|_| ProofError::WrongState)?,
        storage_root: storage_root.value().map_err(|_| ProofError::WrongState)?,
        code_hash: code_hash.value().map_err(|_| ProofError::WrongState)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::{H160, U256};
    use ethkit_common::constants::{EMPTY_KECCACK_HASH, EMPTY_TRIE_HASH};
    use ethkit_rlp::{encode::RLPEncode, structs::Encoder};
    use hex_literal::hex;

    const ADDRESS: Address = H160(hex!("a94f5374fce5edbc8e2a8697c15331677e6ebf0b"));

    fn account_value(balance: u64) -> Vec<u8> {
        (
            1u64,
            U256::from(balance),
            EMPTY_TRIE_HASH,
            EMPTY_KECCACK_HASH,
        )
            .encode_to_vec()
    }

    fn leaf(path: &Nibbles, value: &[u8]) -> Vec<u8> {
        let mut buf = vec![];
        Encoder::new(&mut buf)
            .encode_bytes(&path.encode_compact(true))
            .encode_bytes(value)
            .finish();
        buf
    }

    fn extension(path: &Nibbles, child: H256) -> Vec<u8> {
        let mut buf = vec![];
        Encoder::new(&mut buf)
            .encode_bytes(&path.encode_compact(false))
            .encode_field(&child)
            .finish();
        buf
    }

    fn branch(index: u8, child: H256) -> Vec<u8> {
        let mut buf = vec![];
        let mut encoder = Encoder::new(&mut buf);
        for slot in 0..16 {
            encoder = if slot == index {
                encoder.encode_field(&child)
            } else {
                encoder.encode_bytes(&[])
            };
        }
        encoder.encode_bytes(&[]).finish();
        buf
    }

    fn key() -> Nibbles {
        Nibbles::from_bytes(keccak(ADDRESS).as_bytes())
    }

    /// root branch -> leaf
    fn branch_proof(balance: u64) -> (H256, Vec<Vec<u8>>) {
        let key = key();
        let leaf = leaf(&key.slice(1, key.len()), &account_value(balance));
        let root = branch(key.as_slice()[0], keccak(&leaf));
        (keccak(&root), vec![root, leaf])
    }

    #[test]
    fn verifies_branch_to_leaf_proof() {
        let (state_root, proof) = branch_proof(1_000);
        let state = verify_account_proof(ADDRESS, state_root, &proof).unwrap();
        assert_eq!(state.address, ADDRESS);
        assert_eq!(state.nonce, 1);
        assert_eq!(state.balance, U256::from(1_000));
        assert_eq!(state.storage_root, EMPTY_TRIE_HASH);
        assert_eq!(state.code_hash, EMPTY_KECCACK_HASH);
    }

    #[test]
    fn verifies_extension_branch_leaf_proof() {
        let key = key();
        let leaf = leaf(&key.slice(2, key.len()), &account_value(5));
        let branch = branch(key.as_slice()[1], keccak(&leaf));
        let root = extension(&key.slice(0, 1), keccak(&branch));

        let state =
            verify_account_proof(ADDRESS, keccak(&root), &[root, branch, leaf]).unwrap();
        assert_eq!(state.balance, U256::from(5));
    }

    #[test]
    fn rejects_wrong_state_root() {
        let (_, proof) = branch_proof(1_000);
        assert_eq!(
            verify_account_proof(ADDRESS, H256::repeat_byte(0xab), &proof),
            Err(ProofError::RootHashDoesNotMatchStateRoot)
        );
    }

    #[test]
    fn rejects_empty_proof() {
        let proof: Vec<Vec<u8>> = vec![];
        assert_eq!(
            verify_account_proof(ADDRESS, H256::zero(), &proof),
            Err(ProofError::NoNodes)
        );
    }

    #[test]
    fn rejects_proof_for_another_address() {
        let (state_root, proof) = branch_proof(1_000);
        let other = Address::repeat_byte(0x11);
        assert!(matches!(
            verify_account_proof(other, state_root, &proof),
            Err(ProofError::PathDoesNotMatchAddressHash)
        ));
    }

    #[test]
    fn rejects_unlinked_nodes() {
        let (state_root, mut proof) = branch_proof(1_000);
        let (_, other) = branch_proof(2_000);
        proof[1] = other[1].clone();
        assert_eq!(
            verify_account_proof(ADDRESS, state_root, &proof),
            Err(ProofError::NodesNotInterconnected)
        );
    }

    #[test]
    fn rejects_proof_not_ending_in_a_leaf() {
        let (state_root, proof) = branch_proof(1_000);
        assert_eq!(
            verify_account_proof(ADDRESS, state_root, &proof[..1]),
            Err(ProofError::StateNodeNotFound)
        );
    }

    #[test]
    fn rejects_leaf_value_with_wrong_arity() {
        let key = key();
        let value = (1u64, U256::from(3)).encode_to_vec();
        let leaf = leaf(&key.slice(1, key.len()), &value);
        let root = branch(key.as_slice()[0], keccak(&leaf));
        assert_eq!(
            verify_account_proof(ADDRESS, keccak(&root), &[root, leaf]),
            Err(ProofError::WrongState)
        );
    }
}
