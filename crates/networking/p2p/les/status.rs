use std::collections::HashMap;

use bytes::BufMut;
use ethkit_common::{H256, U256, types::BlockHeader};
use ethkit_rlp::{
    decode::RLPDecode,
    encode::{RLPEncode, encode_length},
    error::{RLPDecodeError, RLPEncodeError},
    item::RLPItem,
    structs::Encoder,
};

use super::message::{LES_PROTOCOL_VERSION, codes};
use crate::rlpx::message::RLPxMessage;

/// Flow control parameters announced by a server. Missing keys read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowControl {
    pub buffer_limit: u64,
    pub minimum_recharge: u64,
    /// `(code, base cost, cost per request)`
    pub max_request_costs: Vec<(u64, u64, u64)>,
}

/// LES Status, sent as a list of `[key, value]` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub protocol_version: u8,
    pub network_id: u64,
    pub head_td: U256,
    pub head_hash: H256,
    pub head_number: u64,
    pub genesis_hash: H256,
    pub announce_type: Option<u64>,
    pub serve_headers: bool,
    pub serve_chain_since: Option<u64>,
    pub serve_state_since: Option<u64>,
    pub flow_control: FlowControl,
}

impl StatusMessage {
    /// Our own status: we announce `head` and ask for simple announces.
    pub fn new(network_id: u64, genesis_hash: H256, head: &BlockHeader) -> Self {
        Self {
            protocol_version: LES_PROTOCOL_VERSION,
            network_id,
            head_td: head.total_difficulty,
            head_hash: head.hash(),
            head_number: head.number,
            genesis_hash,
            announce_type: Some(1),
            serve_headers: false,
            serve_chain_since: None,
            serve_state_since: None,
            flow_control: FlowControl::default(),
        }
    }

    pub(crate) fn from_pairs(pairs: &[RLPItem]) -> Result<Self, RLPDecodeError> {
        let entries = StatusEntries::new(pairs)?;
        let protocol_version = u8::try_from(entries.required("protocolVersion")?.int_value()?)
            .map_err(|_| RLPDecodeError::InvalidLength)?;
        let flow_control = FlowControl {
            buffer_limit: entries.optional_int("flowControl/BL")?.unwrap_or_default(),
            minimum_recharge: entries.optional_int("flowControl/MRR")?.unwrap_or_default(),
            max_request_costs: entries
                .optional("flowControl/MRC")
                .map(decode_request_costs)
                .transpose()?
                .unwrap_or_default(),
        };

        Ok(Self {
            protocol_version,
            network_id: entries.required("networkId")?.int_value()?,
            head_td: entries.required("headTd")?.big_int_value()?,
            head_hash: entries.required("headHash")?.value()?,
            head_number: entries.required("headNum")?.int_value()?,
            genesis_hash: entries.required("genesisHash")?.value()?,
            announce_type: entries.optional_int("announceType")?,
            serve_headers: entries.contains("serveHeaders"),
            serve_chain_since: entries.optional_int("serveChainSince")?,
            serve_state_since: entries.optional_int("serveStateSince")?,
            flow_control,
        })
    }
}

/// Status pairs by key. Keys may come without a value, like `serveHeaders`.
struct StatusEntries<'a>(HashMap<String, Option<&'a RLPItem>>);

impl<'a> StatusEntries<'a> {
    fn new(pairs: &'a [RLPItem]) -> Result<Self, RLPDecodeError> {
        let mut entries = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let pair = pair.list_value()?;
            let key = pair
                .first()
                .ok_or(RLPDecodeError::MalformedData)?
                .string_value()?;
            entries.insert(key, pair.get(1));
        }
        Ok(Self(entries))
    }

    fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn optional(&self, key: &str) -> Option<&'a RLPItem> {
        self.0.get(key).copied().flatten()
    }

    fn optional_int(&self, key: &str) -> Result<Option<u64>, RLPDecodeError> {
        self.optional(key).map(RLPItem::int_value).transpose()
    }

    fn required(&self, key: &str) -> Result<&'a RLPItem, RLPDecodeError> {
        self.optional(key)
            .ok_or_else(|| RLPDecodeError::Custom(format!("Missing status key {key}")))
    }
}

fn decode_request_costs(item: &RLPItem) -> Result<Vec<(u64, u64, u64)>, RLPDecodeError> {
    item.list_value()?
        .iter()
        .map(|cost| match cost.list_value()? {
            [code, base, request, ..] => {
                Ok((code.int_value()?, base.int_value()?, request.int_value()?))
            }
            _ => Err(RLPDecodeError::MalformedData),
        })
        .collect()
}

fn encode_pair<T: RLPEncode + ?Sized>(buf: &mut dyn BufMut, key: &str, value: &T) {
    Encoder::new(buf)
        .encode_field(key)
        .encode_field(value)
        .finish();
}

impl RLPxMessage for StatusMessage {
    const CODE: u8 = codes::STATUS;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        let mut pairs: Vec<u8> = Vec::new();
        encode_pair(&mut pairs, "protocolVersion", &self.protocol_version);
        encode_pair(&mut pairs, "networkId", &self.network_id);
        encode_pair(&mut pairs, "headTd", &self.head_td);
        encode_pair(&mut pairs, "headHash", &self.head_hash);
        encode_pair(&mut pairs, "headNum", &self.head_number);
        encode_pair(&mut pairs, "genesisHash", &self.genesis_hash);
        if let Some(announce_type) = self.announce_type {
            encode_pair(&mut pairs, "announceType", &announce_type);
        }
        if self.serve_headers {
            Encoder::new(&mut pairs).encode_field("serveHeaders").finish();
        }
        if let Some(since) = self.serve_chain_since {
            encode_pair(&mut pairs, "serveChainSince", &since);
        }
        if let Some(since) = self.serve_state_since {
            encode_pair(&mut pairs, "serveStateSince", &since);
        }
        if self.flow_control != FlowControl::default() {
            encode_pair(&mut pairs, "flowControl/BL", &self.flow_control.buffer_limit);
            encode_pair(&mut pairs, "flowControl/MRR", &self.flow_control.minimum_recharge);
            encode_pair(
                &mut pairs,
                "flowControl/MRC",
                &self.flow_control.max_request_costs,
            );
        }

        encode_length(pairs.len(), buf);
        buf.put_slice(&pairs);
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        Self::from_pairs(RLPItem::decode(msg_data)?.list_value()?)
    }
}
