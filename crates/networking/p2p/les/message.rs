use std::fmt;

use bytes::{BufMut, Bytes};
use ethkit_common::{
    H256, U256,
    types::{BlockHeader, SignedTransaction},
};
use ethkit_rlp::{
    decode::{RLPDecode, decode_rlp_item, get_item_with_prefix},
    encode::{RLPEncode, encode_length},
    error::{RLPDecodeError, RLPEncodeError},
    item::RLPItem,
    structs::{Decoder, Encoder},
};

use super::{error::LesError, status::StatusMessage};
use crate::rlpx::message::RLPxMessage;

pub const LES_CAPABILITY: &str = "les";
pub const LES_PROTOCOL_VERSION: u8 = 2;
/// Highest LES v2 message code plus one.
pub const LES_PROTOCOL_LENGTH: u8 = 0x16;

/// LES v2 message codes, local to the capability.
pub mod codes {
    pub const STATUS: u8 = 0x00;
    pub const ANNOUNCE: u8 = 0x01;
    pub const GET_BLOCK_HEADERS: u8 = 0x02;
    pub const BLOCK_HEADERS: u8 = 0x03;
    pub const GET_BLOCK_BODIES: u8 = 0x04;
    pub const BLOCK_BODIES: u8 = 0x05;
    pub const GET_RECEIPTS: u8 = 0x06;
    pub const RECEIPTS: u8 = 0x07;
    pub const GET_CONTRACT_CODES: u8 = 0x0a;
    pub const CONTRACT_CODES: u8 = 0x0b;
    pub const GET_PROOFS: u8 = 0x0f;
    pub const PROOFS: u8 = 0x10;
    pub const GET_HELPER_TRIE_PROOFS: u8 = 0x11;
    pub const HELPER_TRIE_PROOFS: u8 = 0x12;
    pub const SEND_TX: u8 = 0x13;
    pub const GET_TX_STATUS: u8 = 0x14;
    pub const TX_STATUS: u8 = 0x15;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceMessage {
    pub block_hash: H256,
    pub block_number: u64,
    pub total_difficulty: U256,
    pub reorg_depth: u64,
}

impl RLPxMessage for AnnounceMessage {
    const CODE: u8 = codes::ANNOUNCE;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.block_hash)
            .encode_field(&self.block_number)
            .encode_field(&self.total_difficulty)
            .encode_field(&self.reorg_depth)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (block_hash, decoder) = decoder.decode_field("headHash")?;
        let (block_number, decoder) = decoder.decode_field("headNumber")?;
        let (total_difficulty, decoder) = decoder.decode_field("headTd")?;
        let (reorg_depth, decoder) = decoder.decode_field("reorgDepth")?;
        // Signed announces append a key/value list, which is not used
        let (extra, decoder) = decoder.decode_optional_field::<RLPItem>();
        if extra.is_some_and(|item| !item.is_list()) {
            return Err(RLPDecodeError::UnexpectedString);
        }
        if !decoder.finish()?.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(Self {
            block_hash,
            block_number,
            total_difficulty,
            reorg_depth,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlockHeadersMessage {
    pub request_id: u64,
    pub origin: u64,
    pub max_headers: u64,
    pub skip: u64,
    pub reverse: bool,
}

impl RLPxMessage for GetBlockHeadersMessage {
    const CODE: u8 = codes::GET_BLOCK_HEADERS;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.request_id)
            .encode_field(&(self.origin, self.max_headers, self.skip, self.reverse))
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (request_id, decoder) = decoder.decode_field("request-id")?;
        let ((origin, max_headers, skip, reverse), decoder): ((u64, u64, u64, bool), _) =
            decoder.decode_field("query")?;
        decoder.finish()?;
        Ok(Self {
            request_id,
            origin,
            max_headers,
            skip,
            reverse,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeadersMessage {
    pub request_id: u64,
    pub buffer_value: u64,
    pub headers: Vec<BlockHeader>,
}

impl RLPxMessage for BlockHeadersMessage {
    const CODE: u8 = codes::BLOCK_HEADERS;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.request_id)
            .encode_field(&self.buffer_value)
            .encode_field(&self.headers)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (request_id, decoder) = decoder.decode_field("request-id")?;
        let (buffer_value, decoder) = decoder.decode_field("bv")?;
        let (headers, decoder) = decoder.decode_field("headers")?;
        decoder.finish()?;
        Ok(Self {
            request_id,
            buffer_value,
            headers,
        })
    }
}

/// One proof query. An empty `account_key` asks for the state trie, so `key` is the
/// hashed account address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRequest {
    pub block_hash: H256,
    pub account_key: Bytes,
    pub key: H256,
    pub from_level: u64,
}

impl RLPEncode for ProofRequest {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.block_hash)
            .encode_field(&self.account_key)
            .encode_field(&self.key)
            .encode_field(&self.from_level)
            .finish();
    }
}

impl RLPDecode for ProofRequest {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (block_hash, decoder) = decoder.decode_field("blockHash")?;
        let (account_key, decoder) = decoder.decode_field("accountKey")?;
        let (key, decoder) = decoder.decode_field("key")?;
        let (from_level, decoder) = decoder.decode_field("fromLevel")?;
        let request = Self {
            block_hash,
            account_key,
            key,
            from_level,
        };
        Ok((request, decoder.finish()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetProofsMessage {
    pub request_id: u64,
    pub requests: Vec<ProofRequest>,
}

impl RLPxMessage for GetProofsMessage {
    const CODE: u8 = codes::GET_PROOFS;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.request_id)
            .encode_field(&self.requests)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (request_id, decoder) = decoder.decode_field("request-id")?;
        let (requests, decoder) = decoder.decode_field("requests")?;
        decoder.finish()?;
        Ok(Self {
            request_id,
            requests,
        })
    }
}

/// Proof nodes are kept as received, since their hashes link the proof together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofsMessage {
    pub request_id: u64,
    pub buffer_value: u64,
    pub nodes: Vec<Bytes>,
}

impl RLPxMessage for ProofsMessage {
    const CODE: u8 = codes::PROOFS;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let nodes = self.nodes.concat();
        let mut encoded_nodes: Vec<u8> = Vec::with_capacity(nodes.len() + 9);
        encode_length(nodes.len(), &mut encoded_nodes);
        encoded_nodes.extend_from_slice(&nodes);

        Encoder::new(buf)
            .encode_field(&self.request_id)
            .encode_field(&self.buffer_value)
            .encode_raw(&encoded_nodes)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (request_id, decoder) = decoder.decode_field("request-id")?;
        let (buffer_value, decoder) = decoder.decode_field("bv")?;
        let (encoded_nodes, decoder) = decoder.get_encoded_item()?;
        decoder.finish()?;
        Ok(Self {
            request_id,
            buffer_value,
            nodes: raw_list_items(&encoded_nodes)?,
        })
    }
}

/// Splits an encoded list into its encoded elements.
fn raw_list_items(list: &[u8]) -> Result<Vec<Bytes>, RLPDecodeError> {
    let (is_list, mut payload, _) = decode_rlp_item(list)?;
    if !is_list {
        return Err(RLPDecodeError::UnexpectedString);
    }
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, rest) = get_item_with_prefix(payload)?;
        items.push(Bytes::copy_from_slice(item));
        payload = rest;
    }
    Ok(items)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTxMessage {
    pub request_id: u64,
    pub transactions: Vec<SignedTransaction>,
}

impl RLPxMessage for SendTxMessage {
    const CODE: u8 = codes::SEND_TX;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.request_id)
            .encode_field(&self.transactions)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (request_id, decoder) = decoder.decode_field("request-id")?;
        let (transactions, decoder) = decoder.decode_field("transactions")?;
        decoder.finish()?;
        Ok(Self {
            request_id,
            transactions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetTxStatusMessage {
    pub request_id: u64,
    pub hashes: Vec<H256>,
}

impl RLPxMessage for GetTxStatusMessage {
    const CODE: u8 = codes::GET_TX_STATUS;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.request_id)
            .encode_field(&self.hashes)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (request_id, decoder) = decoder.decode_field("request-id")?;
        let (hashes, decoder) = decoder.decode_field("hashes")?;
        decoder.finish()?;
        Ok(Self { request_id, hashes })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    Unknown,
    Queued,
    Pending,
    Included {
        block_hash: H256,
        block_number: u64,
        index: u64,
    },
    Error(String),
}

impl TransactionStatus {
    /// Only a rejected or unknown transaction counts as a failed send.
    pub fn is_failure(&self) -> bool {
        matches!(self, TransactionStatus::Unknown | TransactionStatus::Error(_))
    }

    fn from_item(item: &RLPItem) -> Result<Self, RLPDecodeError> {
        let fields = item.list_value()?;
        let code = fields
            .first()
            .ok_or(RLPDecodeError::MalformedData)?
            .int_value()?;
        let status = match (code, fields.get(1)) {
            (1, _) => TransactionStatus::Queued,
            (2, _) => TransactionStatus::Pending,
            (3, Some(data)) => match data.list_value()? {
                [block_hash, block_number, index, ..] => TransactionStatus::Included {
                    block_hash: block_hash.value()?,
                    block_number: block_number.int_value()?,
                    index: index.int_value()?,
                },
                _ => return Err(RLPDecodeError::MalformedData),
            },
            (4, Some(data)) => TransactionStatus::Error(data.string_value()?),
            _ => TransactionStatus::Unknown,
        };
        Ok(status)
    }
}

impl RLPEncode for TransactionStatus {
    fn encode(&self, buf: &mut dyn BufMut) {
        let encoder = Encoder::new(buf);
        match self {
            TransactionStatus::Unknown => encoder.encode_field(&0u8).encode_field(""),
            TransactionStatus::Queued => encoder.encode_field(&1u8).encode_field(""),
            TransactionStatus::Pending => encoder.encode_field(&2u8).encode_field(""),
            TransactionStatus::Included {
                block_hash,
                block_number,
                index,
            } => encoder
                .encode_field(&3u8)
                .encode_field(&(*block_hash, *block_number, *index)),
            TransactionStatus::Error(message) => encoder.encode_field(&4u8).encode_field(message),
        }
        .finish();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatusMessage {
    pub request_id: u64,
    pub buffer_value: u64,
    pub statuses: Vec<TransactionStatus>,
}

impl RLPxMessage for TxStatusMessage {
    const CODE: u8 = codes::TX_STATUS;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.request_id)
            .encode_field(&self.buffer_value)
            .encode_field(&self.statuses)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let item = RLPItem::decode(msg_data)?;
        let [request_id, buffer_value, statuses, ..] = item.list_value()? else {
            return Err(RLPDecodeError::MalformedData);
        };
        Ok(Self {
            request_id: request_id.int_value()?,
            buffer_value: buffer_value.int_value()?,
            statuses: statuses
                .list_value()?
                .iter()
                .map(TransactionStatus::from_item)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Every LES v2 message. Kinds nothing handles are kept opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LesMessage {
    Status(StatusMessage),
    Announce(AnnounceMessage),
    GetBlockHeaders(GetBlockHeadersMessage),
    BlockHeaders(BlockHeadersMessage),
    GetProofs(GetProofsMessage),
    Proofs(ProofsMessage),
    SendTx(SendTxMessage),
    GetTxStatus(GetTxStatusMessage),
    TxStatus(TxStatusMessage),
    Opaque { code: u8, payload: Vec<u8> },
}

impl LesMessage {
    pub fn code(&self) -> u8 {
        match self {
            LesMessage::Status(_) => StatusMessage::CODE,
            LesMessage::Announce(_) => AnnounceMessage::CODE,
            LesMessage::GetBlockHeaders(_) => GetBlockHeadersMessage::CODE,
            LesMessage::BlockHeaders(_) => BlockHeadersMessage::CODE,
            LesMessage::GetProofs(_) => GetProofsMessage::CODE,
            LesMessage::Proofs(_) => ProofsMessage::CODE,
            LesMessage::SendTx(_) => SendTxMessage::CODE,
            LesMessage::GetTxStatus(_) => GetTxStatusMessage::CODE,
            LesMessage::TxStatus(_) => TxStatusMessage::CODE,
            LesMessage::Opaque { code, .. } => *code,
        }
    }

    pub fn decode(code: u8, data: &[u8]) -> Result<Self, LesError> {
        let message = match code {
            codes::STATUS => {
                let item = RLPItem::decode(data)?;
                let pairs = item.list_value()?;
                if pairs.is_empty() {
                    return Err(LesError::NoStatus);
                }
                LesMessage::Status(StatusMessage::from_pairs(pairs)?)
            }
            codes::ANNOUNCE => LesMessage::Announce(AnnounceMessage::decode(data)?),
            codes::GET_BLOCK_HEADERS => {
                LesMessage::GetBlockHeaders(GetBlockHeadersMessage::decode(data)?)
            }
            codes::BLOCK_HEADERS => LesMessage::BlockHeaders(BlockHeadersMessage::decode(data)?),
            codes::GET_PROOFS => LesMessage::GetProofs(GetProofsMessage::decode(data)?),
            codes::PROOFS => LesMessage::Proofs(ProofsMessage::decode(data)?),
            codes::SEND_TX => LesMessage::SendTx(SendTxMessage::decode(data)?),
            codes::GET_TX_STATUS => LesMessage::GetTxStatus(GetTxStatusMessage::decode(data)?),
            codes::TX_STATUS => LesMessage::TxStatus(TxStatusMessage::decode(data)?),
            codes::GET_BLOCK_BODIES
            | codes::BLOCK_BODIES
            | codes::GET_RECEIPTS
            | codes::RECEIPTS
            | codes::GET_CONTRACT_CODES
            | codes::CONTRACT_CODES
            | codes::GET_HELPER_TRIE_PROOFS
            | codes::HELPER_TRIE_PROOFS => LesMessage::Opaque {
                code,
                payload: data.to_vec(),
            },
            _ => {
                return Err(RLPDecodeError::Custom(format!(
                    "Unknown les message code {code:#04x}"
                ))
                .into());
            }
        };
        Ok(message)
    }

    pub fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        match self {
            LesMessage::Status(msg) => msg.encode(buf),
            LesMessage::Announce(msg) => msg.encode(buf),
            LesMessage::GetBlockHeaders(msg) => msg.encode(buf),
            LesMessage::BlockHeaders(msg) => msg.encode(buf),
            LesMessage::GetProofs(msg) => msg.encode(buf),
            LesMessage::Proofs(msg) => msg.encode(buf),
            LesMessage::SendTx(msg) => msg.encode(buf),
            LesMessage::GetTxStatus(msg) => msg.encode(buf),
            LesMessage::TxStatus(msg) => msg.encode(buf),
            LesMessage::Opaque { payload, .. } => {
                buf.put_slice(payload);
                Ok(())
            }
        }
    }

    pub fn encode_to_vec(&self) -> Result<Vec<u8>, RLPEncodeError> {
        let mut buf: Vec<u8> = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Display for LesMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LesMessage::Status(msg) => write!(
                f,
                "les:Status(network: {}, head: {} {:#x}, td: {})",
                msg.network_id, msg.head_number, msg.head_hash, msg.head_td
            ),
            LesMessage::Announce(msg) => write!(
                f,
                "les:Announce(head: {} {:#x}, reorg: {})",
                msg.block_number, msg.block_hash, msg.reorg_depth
            ),
            LesMessage::GetBlockHeaders(msg) => write!(
                f,
                "les:GetBlockHeaders(id: {}, origin: {}, max: {}, reverse: {})",
                msg.request_id, msg.origin, msg.max_headers, msg.reverse
            ),
            LesMessage::BlockHeaders(msg) => write!(
                f,
                "les:BlockHeaders(id: {}, headers: {})",
                msg.request_id,
                msg.headers.len()
            ),
            LesMessage::GetProofs(msg) => write!(
                f,
                "les:GetProofs(id: {}, requests: {})",
                msg.request_id,
                msg.requests.len()
            ),
            LesMessage::Proofs(msg) => write!(
                f,
                "les:Proofs(id: {}, nodes: {})",
                msg.request_id,
                msg.nodes.len()
            ),
            LesMessage::SendTx(msg) => write!(
                f,
                "les:SendTx(id: {}, transactions: {})",
                msg.request_id,
                msg.transactions.len()
            ),
            LesMessage::GetTxStatus(msg) => write!(
                f,
                "les:GetTxStatus(id: {}, hashes: {})",
                msg.request_id,
                msg.hashes.len()
            ),
            LesMessage::TxStatus(msg) => write!(
                f,
                "les:TxStatus(id: {}, statuses: {:?})",
                msg.request_id, msg.statuses
            ),
            LesMessage::Opaque { code, payload } => {
                write!(f, "les:Opaque({code:#04x}, {} bytes)", payload.len())
            }
        }
    }
}
