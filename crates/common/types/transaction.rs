use bytes::{BufMut, Bytes};
use ethereum_types::{Address, H256, U256};
use ethkit_rlp::{
    constants::RLP_NULL,
    decode::{RLPDecode, decode_bytes},
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use keccak_hash::keccak;

/// Destination of a transaction. Contract creations have an empty `to` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TxKind {
    Call(Address),
    #[default]
    Create,
}

impl RLPEncode for TxKind {
    fn encode(&self, buf: &mut dyn BufMut) {
        match self {
            Self::Call(address) => address.encode(buf),
            Self::Create => buf.put_u8(RLP_NULL),
        }
    }
}

impl RLPDecode for TxKind {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.is_empty() {
            return Ok((Self::Create, rest));
        }
        if bytes.len() != Address::len_bytes() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((Self::Call(Address::from_slice(bytes)), rest))
    }
}

/// A legacy transaction, already signed by the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SignedTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub data: Bytes,
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl SignedTransaction {
    pub fn hash(&self) -> H256 {
        keccak(self.encode_to_vec())
    }
}

impl RLPEncode for SignedTransaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas_limit)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.v)
            .encode_field(&self.r)
            .encode_field(&self.s)
            .finish();
    }
}

impl RLPDecode for SignedTransaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (gas_price, decoder) = decoder.decode_field("gas_price")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (v, decoder) = decoder.decode_field("v")?;
        let (r, decoder) = decoder.decode_field("r")?;
        let (s, decoder) = decoder.decode_field("s")?;
        let tx = SignedTransaction {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
            v,
            r,
            s,
        };
        Ok((tx, decoder.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn legacy_transaction_hash() {
        // EIP-155 example transaction, signed with chain id 1
        let tx = SignedTransaction {
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21_000,
            to: TxKind::Call(Address::from(hex!(
                "3535353535353535353535353535353535353535"
            ))),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Bytes::new(),
            v: 37,
            r: U256::from_big_endian(&hex!(
                "28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276"
            )),
            s: U256::from_big_endian(&hex!(
                "67cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
            )),
        };
        let encoded = tx.encode_to_vec();
        assert_eq!(
            encoded,
            hex!("f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83").to_vec()
        );
        assert_eq!(SignedTransaction::decode(&encoded).unwrap(), tx);
    }

    #[test]
    fn contract_creation_has_empty_destination() {
        let tx = SignedTransaction::default();
        let decoded = SignedTransaction::decode(&tx.encode_to_vec()).unwrap();
        assert_eq!(decoded.to, TxKind::Create);
    }

    #[test]
    fn destination_must_be_twenty_bytes() {
        let address = Address::repeat_byte(0x35);
        assert_eq!(
            TxKind::decode(&TxKind::Call(address).encode_to_vec()).unwrap(),
            TxKind::Call(address)
        );
        assert_eq!(
            TxKind::decode(&[0x82, 0x01, 0x02]),
            Err(RLPDecodeError::InvalidLength)
        );
    }
}
