use std::sync::OnceLock;

use bytes::{BufMut, Bytes};
use ethereum_types::{Address, Bloom, H64, H256, U256};
use ethkit_rlp::{
    decode::{RLPDecode, get_item_with_prefix},
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use keccak_hash::keccak;

pub type BlockNumber = u64;
pub type BlockHash = H256;

/// Header of a block, as relayed by LES peers.
///
/// The post-London fields are optional and are only present on headers of the forks that
/// introduced them. `total_difficulty` is not part of the header encoding: it is reported by
/// peers alongside the head and kept here for bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct BlockHeader {
    #[doc(hidden)]
    pub hash: OnceLock<BlockHash>,
    pub parent_hash: H256,
    pub ommers_hash: H256,
    pub coinbase: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    pub number: BlockNumber,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    pub prev_randao: H256,
    pub nonce: u64,
    pub base_fee_per_gas: Option<u64>,
    pub withdrawals_root: Option<H256>,
    pub blob_gas_used: Option<u64>,
    pub excess_blob_gas: Option<u64>,
    pub parent_beacon_block_root: Option<H256>,
    pub requests_hash: Option<H256>,
    pub total_difficulty: U256,
}

impl BlockHeader {
    /// A header known only by its number and hash, such as a hardcoded checkpoint.
    /// Its remaining fields are left empty, so its hash can't be recomputed from them.
    pub fn checkpoint(number: BlockNumber, hash: BlockHash, total_difficulty: U256) -> Self {
        let header = Self {
            number,
            total_difficulty,
            ..Default::default()
        };
        let _ = header.hash.set(hash);
        header
    }

    pub fn hash(&self) -> BlockHash {
        *self.hash.get_or_init(|| self.compute_block_hash())
    }

    pub fn compute_block_hash(&self) -> BlockHash {
        keccak(self.encode_to_vec())
    }
}

// Two headers are the same header if they hash the same. The cached hash is not compared
// directly since it may not have been computed yet.
impl PartialEq for BlockHeader {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash() && self.total_difficulty == other.total_difficulty
    }
}

impl Eq for BlockHeader {}

impl RLPEncode for BlockHeader {
    fn encode(&self, buf: &mut dyn BufMut) {
        // Optional fields are positional, so each one is only written if
        // every field before it is present.
        let mut encoder = Encoder::new(buf)
            .encode_field(&self.parent_hash)
            .encode_field(&self.ommers_hash)
            .encode_field(&self.coinbase)
            .encode_field(&self.state_root)
            .encode_field(&self.transactions_root)
            .encode_field(&self.receipts_root)
            .encode_field(&self.logs_bloom)
            .encode_field(&self.difficulty)
            .encode_field(&self.number)
            .encode_field(&self.gas_limit)
            .encode_field(&self.gas_used)
            .encode_field(&self.timestamp)
            .encode_field(&self.extra_data)
            .encode_field(&self.prev_randao)
            .encode_field(&H64::from_low_u64_be(self.nonce));

        let optional_fields: [Option<Vec<u8>>; 6] = [
            self.base_fee_per_gas.map(|v| v.encode_to_vec()),
            self.withdrawals_root.map(|v| v.encode_to_vec()),
            self.blob_gas_used.map(|v| v.encode_to_vec()),
            self.excess_blob_gas.map(|v| v.encode_to_vec()),
            self.parent_beacon_block_root.map(|v| v.encode_to_vec()),
            self.requests_hash.map(|v| v.encode_to_vec()),
        ];
        for field in optional_fields.iter().map_while(Option::as_ref) {
            encoder = encoder.encode_raw(field);
        }
        encoder.finish();
    }
}

impl RLPDecode for BlockHeader {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (raw, _) = get_item_with_prefix(rlp)?;
        let decoder = Decoder::new(rlp)?;
        let (parent_hash, decoder) = decoder.decode_field("parent_hash")?;
        let (ommers_hash, decoder) = decoder.decode_field("ommers_hash")?;
        let (coinbase, decoder) = decoder.decode_field("coinbase")?;
        let (state_root, decoder) = decoder.decode_field("state_root")?;
        let (transactions_root, decoder) = decoder.decode_field("transactions_root")?;
        let (receipts_root, decoder) = decoder.decode_field("receipts_root")?;
        let (logs_bloom, decoder) = decoder.decode_field("logs_bloom")?;
        let (difficulty, decoder) = decoder.decode_field("difficulty")?;
        let (number, decoder) = decoder.decode_field("number")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (gas_used, decoder) = decoder.decode_field("gas_used")?;
        let (timestamp, decoder) = decoder.decode_field("timestamp")?;
        let (extra_data, decoder) = decoder.decode_field("extra_data")?;
        let (prev_randao, decoder) = decoder.decode_field("prev_randao")?;
        let (nonce, decoder): (H64, _) = decoder.decode_field("nonce")?;
        let nonce = u64::from_be_bytes(nonce.0);
        let (base_fee_per_gas, decoder) = decoder.decode_optional_field();
        let (withdrawals_root, decoder) = decoder.decode_optional_field();
        let (blob_gas_used, decoder) = decoder.decode_optional_field();
        let (excess_blob_gas, decoder) = decoder.decode_optional_field();
        let (parent_beacon_block_root, decoder) = decoder.decode_optional_field();
        let (requests_hash, decoder) = decoder.decode_optional_field();
        // Fields from forks this client doesn't know about are skipped, they are
        // still covered by the hash of the raw encoding.
        let rest = decoder.finish_unchecked();

        let header = BlockHeader {
            hash: OnceLock::new(),
            parent_hash,
            ommers_hash,
            coinbase,
            state_root,
            transactions_root,
            receipts_root,
            logs_bloom,
            difficulty,
            number,
            gas_limit,
            gas_used,
            timestamp,
            extra_data,
            prev_randao,
            nonce,
            base_fee_per_gas,
            withdrawals_root,
            blob_gas_used,
            excess_blob_gas,
            parent_beacon_block_root,
            requests_hash,
            total_difficulty: U256::zero(),
        };
        let _ = header.hash.set(keccak(raw));
        Ok((header, rest))
    }
}
