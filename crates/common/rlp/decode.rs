use super::{
    constants::{RLP_EMPTY_LIST, RLP_NULL},
    error::RLPDecodeError,
};
use bytes::Bytes;
use ethereum_types::{Bloom, H64, H128, H160, H256, H512, H520, U256};
use std::net::Ipv4Addr;

/// Max payload size accepted when decoding. Nothing the light client
/// receives legitimately comes close to this.
const MAX_RLP_BYTES: usize = 1024 * 1024 * 1024;

/// Trait for decoding RLP encoded slices of data.
/// Implementors provide [`decode_unfinished`](RLPDecode::decode_unfinished), which returns the
/// decoded value together with the bytes that follow it. Consumers that expect the input to hold
/// exactly one item use [`decode`](RLPDecode::decode).
pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(decoded)
    }
}

impl RLPDecode for bool {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first = *rlp.first().ok_or(RLPDecodeError::InvalidLength)?;
        let value = match first {
            RLP_NULL => false,
            0x01 => true,
            other => return Err(RLPDecodeError::MalformedBoolean(other)),
        };
        Ok((value, &rlp[1..]))
    }
}

macro_rules! impl_decode_for_uint {
    ($($t:ty),*) => {
        $(
            impl RLPDecode for $t {
                fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                    let (bytes, rest) = decode_bytes(rlp)?;
                    let padded = static_left_pad(bytes)?;
                    Ok((<$t>::from_be_bytes(padded), rest))
                }
            }
        )*
    };
}

impl_decode_for_uint!(u8, u16, u32, u64, usize, u128);

impl RLPDecode for U256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let padded: [u8; 32] = static_left_pad(bytes)?;
        Ok((U256::from_big_endian(&padded), rest))
    }
}

// Decodes a byte string of an exact size. Lists of elements go through Vec<T>
// or the tuple implementations.
impl<const N: usize> RLPDecode for [u8; N] {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = bytes
            .try_into()
            .map_err(|_| RLPDecodeError::InvalidLength)?;
        Ok((value, rest))
    }
}

impl RLPDecode for Bytes {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((Bytes::copy_from_slice(bytes), rest))
    }
}

impl RLPDecode for String {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let value = String::from_utf8(bytes.to_vec()).map_err(|_| RLPDecodeError::MalformedData)?;
        Ok((value, rest))
    }
}

impl RLPDecode for Ipv4Addr {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (octets, rest) = <[u8; 4]>::decode_unfinished(rlp)?;
        Ok((Ipv4Addr::from(octets), rest))
    }
}

macro_rules! impl_decode_for_hash {
    ($($t:ident),*) => {
        $(
            impl RLPDecode for $t {
                fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                    let (value, rest) = RLPDecode::decode_unfinished(rlp)?;
                    Ok(($t(value), rest))
                }
            }
        )*
    };
}

impl_decode_for_hash!(H64, H128, H160, H256, H512, H520, Bloom);

// A Vec<T> is interpreted as a list of elements of the same type.
impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }

        let mut result = Vec::new();
        let mut current = payload;
        while !current.is_empty() {
            let (item, remaining) = T::decode_unfinished(current)?;
            result.push(item);
            current = remaining;
        }
        Ok((result, rest))
    }
}

macro_rules! impl_decode_for_tuple {
    ($($name:ident => $field:ident),+) => {
        impl<$($name: RLPDecode),+> RLPDecode for ($($name,)+) {
            fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (is_list, payload, rest) = decode_rlp_item(rlp)?;
                if !is_list {
                    return Err(RLPDecodeError::UnexpectedString);
                }
                let current = payload;
                $(let ($field, current) = <$name as RLPDecode>::decode_unfinished(current)?;)+
                // a tuple must consume the whole list
                if !current.is_empty() {
                    return Err(RLPDecodeError::MalformedData);
                }
                Ok((($($field,)+), rest))
            }
        }
    };
}

impl_decode_for_tuple!(A => a, B => b);
impl_decode_for_tuple!(A => a, B => b, C => c);
impl_decode_for_tuple!(A => a, B => b, C => c, D => d);

/// Reads a big-endian length of `len_of_len` bytes following the prefix byte.
fn read_long_length(data: &[u8], len_of_len: usize) -> Result<usize, RLPDecodeError> {
    let length_bytes = data
        .get(1..len_of_len + 1)
        .ok_or(RLPDecodeError::InvalidLength)?;
    let length = usize::from_be_bytes(static_left_pad(length_bytes)?);
    if length < 56 {
        // short items must use the short form
        return Err(RLPDecodeError::MalformedData);
    }
    Ok(length)
}

/// Splits the first item off `data`.
/// Returns `(is_list, offset of the payload, payload length)`.
fn item_bounds(data: &[u8]) -> Result<(bool, usize, usize), RLPDecodeError> {
    let first_byte = *data.first().ok_or(RLPDecodeError::InvalidLength)?;
    let (is_list, offset, length) = match first_byte {
        0..=0x7F => return Ok((false, 0, 1)),
        RLP_NULL..=0xB7 => (false, 1, (first_byte - RLP_NULL) as usize),
        0xB8..=0xBF => {
            let len_of_len = (first_byte - 0xB7) as usize;
            (false, 1 + len_of_len, read_long_length(data, len_of_len)?)
        }
        RLP_EMPTY_LIST..=0xF7 => (true, 1, (first_byte - RLP_EMPTY_LIST) as usize),
        0xF8..=0xFF => {
            let len_of_len = (first_byte - 0xF7) as usize;
            (true, 1 + len_of_len, read_long_length(data, len_of_len)?)
        }
    };
    if length > MAX_RLP_BYTES || data.len() < offset + length {
        return Err(RLPDecodeError::InvalidLength);
    }
    Ok((is_list, offset, length))
}

/// Decodes an RLP item from a slice of bytes.
/// It returns a 3-element tuple with the following elements:
/// - A boolean indicating if the item is a list or not.
/// - The payload of the item, without its prefix.
/// - The remaining bytes after the item.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let (is_list, offset, length) = item_bounds(data)?;
    Ok((
        is_list,
        &data[offset..offset + length],
        &data[offset + length..],
    ))
}

/// Splits an RLP item off the front of `data`, keeping its prefix.
/// Returns the full encoded item and the bytes following it.
pub fn get_item_with_prefix(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (_, offset, length) = item_bounds(data)?;
    Ok(data.split_at(offset + length))
}

/// Decodes the payload of an RLP string.
/// Returns the payload and the bytes following the item.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (is_list, payload, rest) = decode_rlp_item(data)?;
    if is_list {
        return Err(RLPDecodeError::UnexpectedList);
    }
    Ok((payload, rest))
}

/// Pads a slice of bytes with zeros on the left to make it a fixed size array.
/// Leading zeros in the input are rejected as non-canonical.
pub fn static_left_pad<const N: usize>(data: &[u8]) -> Result<[u8; N], RLPDecodeError> {
    let mut result = [0; N];

    if data.is_empty() {
        return Ok(result);
    }
    if data[0] == 0 {
        return Err(RLPDecodeError::MalformedData);
    }
    if data.len() > N {
        return Err(RLPDecodeError::InvalidLength);
    }
    result[N - data.len()..].copy_from_slice(data);
    Ok(result)
}
