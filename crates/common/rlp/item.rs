use bytes::{BufMut, Bytes};
use ethereum_types::U256;

use super::{
    decode::{RLPDecode, decode_rlp_item, static_left_pad},
    encode::{RLPEncode, encode_length},
    error::RLPDecodeError,
};

/// A decoded RLP value whose shape is only known at runtime.
///
/// Used where a message carries heterogeneous lists, such as LES status
/// key/value pairs or Merkle-Patricia trie nodes. Every item keeps the exact
/// bytes it was decoded from, so re-encoding it never normalizes the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RLPItem {
    value: RLPValue,
    raw: Bytes,
}

/// Shape of an [`RLPItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RLPValue {
    Data(Bytes),
    List(Vec<RLPItem>),
}

impl RLPItem {
    pub fn data(data: Bytes) -> Self {
        let raw = data.encode_to_vec().into();
        Self {
            value: RLPValue::Data(data),
            raw,
        }
    }

    pub fn list(items: Vec<RLPItem>) -> Self {
        let mut payload = Vec::new();
        for item in &items {
            payload.put_slice(&item.raw);
        }
        let mut raw = Vec::with_capacity(payload.len() + 9);
        encode_length(payload.len(), &mut raw);
        raw.put_slice(&payload);
        Self {
            value: RLPValue::List(items),
            raw: raw.into(),
        }
    }

    pub fn kind(&self) -> &RLPValue {
        &self.value
    }

    /// The encoding this item was built or decoded from, prefix included.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_list(&self) -> bool {
        matches!(self.value, RLPValue::List(_))
    }

    pub fn data_value(&self) -> Result<&[u8], RLPDecodeError> {
        match &self.value {
            RLPValue::Data(data) => Ok(data),
            RLPValue::List(_) => Err(RLPDecodeError::UnexpectedList),
        }
    }

    pub fn list_value(&self) -> Result<&[RLPItem], RLPDecodeError> {
        match &self.value {
            RLPValue::List(items) => Ok(items),
            RLPValue::Data(_) => Err(RLPDecodeError::UnexpectedString),
        }
    }

    pub fn int_value(&self) -> Result<u64, RLPDecodeError> {
        Ok(u64::from_be_bytes(static_left_pad(self.data_value()?)?))
    }

    pub fn big_int_value(&self) -> Result<U256, RLPDecodeError> {
        let padded: [u8; 32] = static_left_pad(self.data_value()?)?;
        Ok(U256::from_big_endian(&padded))
    }

    pub fn string_value(&self) -> Result<String, RLPDecodeError> {
        String::from_utf8(self.data_value()?.to_vec()).map_err(|_| RLPDecodeError::MalformedData)
    }

    /// Decodes this item's raw encoding as a `T`. Handy for fixed-size hashes.
    pub fn value<T: RLPDecode>(&self) -> Result<T, RLPDecodeError> {
        T::decode(&self.raw)
    }
}

impl RLPDecode for RLPItem {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(rlp)?;
        let raw = Bytes::copy_from_slice(&rlp[..rlp.len() - rest.len()]);
        if !is_list {
            let value = RLPValue::Data(Bytes::copy_from_slice(payload));
            return Ok((Self { value, raw }, rest));
        }
        let mut items = Vec::new();
        let mut current = payload;
        while !current.is_empty() {
            let (item, remaining) = RLPItem::decode_unfinished(current)?;
            items.push(item);
            current = remaining;
        }
        let value = RLPValue::List(items);
        Ok((Self { value, raw }, rest))
    }
}

impl RLPEncode for RLPItem {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_slice(&self.raw);
    }

    fn length(&self) -> usize {
        self.raw.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn decodes_nested_lists() {
        // [["cat", 1024], "dog"]
        let encoded = hex!("ccc78363617482040083646f67");
        let item = RLPItem::decode(&encoded).unwrap();

        let outer = item.list_value().unwrap();
        assert_eq!(outer.len(), 2);
        let inner = outer[0].list_value().unwrap();
        assert_eq!(inner[0].string_value().unwrap(), "cat");
        assert_eq!(inner[1].int_value().unwrap(), 1024);
        assert_eq!(outer[1].data_value().unwrap(), b"dog");

        assert_eq!(item.encode_to_vec(), encoded.to_vec());
    }

    #[test]
    fn decoded_items_keep_their_input_bytes() {
        // ["cat", [0x05]] with 0x05 written long-form as 0x8105
        let encoded = hex!("c783636174c28105");
        let item = RLPItem::decode(&encoded).unwrap();
        assert_eq!(item.raw(), &encoded[..]);

        let outer = item.list_value().unwrap();
        assert_eq!(outer[0].raw(), &hex!("83636174")[..]);
        assert_eq!(outer[1].raw(), &hex!("c28105")[..]);
        let inner = outer[1].list_value().unwrap();
        assert_eq!(inner[0].raw(), &hex!("8105")[..]);
        assert_eq!(inner[0].data_value().unwrap(), &[0x05]);

        assert_eq!(item.encode_to_vec(), encoded.to_vec());
        assert_eq!(RLPItem::decode(&item.encode_to_vec()).unwrap(), item);
    }

    #[test]
    fn built_items_encode_canonically() {
        let item = RLPItem::list(vec![
            RLPItem::list(vec![
                RLPItem::data(Bytes::from_static(b"cat")),
                RLPItem::data(Bytes::from_static(&[0x04, 0x00])),
            ]),
            RLPItem::data(Bytes::from_static(b"dog")),
        ]);
        assert_eq!(item.raw(), &hex!("ccc78363617482040083646f67")[..]);
        assert_eq!(RLPItem::data(Bytes::from_static(&[0x05])).raw(), &[0x05]);
    }

    #[test]
    fn accessors_reject_wrong_shape() {
        let item = RLPItem::list(vec![]);
        assert_eq!(item.data_value(), Err(RLPDecodeError::UnexpectedList));
        let item = RLPItem::data(Bytes::from_static(b"x"));
        assert_eq!(
            item.list_value().map(|l| l.len()),
            Err(RLPDecodeError::UnexpectedString)
        );
    }

    #[test]
    fn empty_data_is_zero() {
        let item = RLPItem::decode(&[0x80]).unwrap();
        assert_eq!(item.int_value().unwrap(), 0);
        assert_eq!(item.big_int_value().unwrap(), U256::zero());
    }
}
