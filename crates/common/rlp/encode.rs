use bytes::{BufMut, Bytes};
use ethereum_types::{Address, Bloom, H64, H128, H256, H512, H520, U256};
use std::net::Ipv4Addr;

use super::constants::{RLP_EMPTY_LIST, RLP_NULL};

/// Encodes a value into a freshly allocated buffer.
/// For encoding into an existing buffer, use [`RLPEncode::encode`].
pub fn encode<T: RLPEncode + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn length(&self) -> usize {
        self.encode_to_vec().len()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Writes `value` big-endian without leading zero bytes.
fn minimal_be_bytes(value: &[u8]) -> &[u8] {
    let start = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    &value[start..]
}

/// Writes a string or list prefix for a payload of `len` bytes.
/// `short_base` is 0x80 for strings and 0xc0 for lists.
fn encode_prefix(len: usize, short_base: u8, buf: &mut dyn BufMut) {
    if len < 56 {
        buf.put_u8(short_base + len as u8);
    } else {
        let len_bytes = len.to_be_bytes();
        let len_bytes = minimal_be_bytes(&len_bytes);
        buf.put_u8(short_base + 55 + len_bytes.len() as u8);
        buf.put_slice(len_bytes);
    }
}

/// Writes the list prefix for a payload of `total_len` bytes.
pub fn encode_length(total_len: usize, buf: &mut dyn BufMut) {
    encode_prefix(total_len, RLP_EMPTY_LIST, buf)
}

impl RLPEncode for bool {
    fn encode(&self, buf: &mut dyn BufMut) {
        if *self {
            buf.put_u8(0x01);
        } else {
            buf.put_u8(RLP_NULL);
        }
    }
}

macro_rules! impl_encode_for_uint {
    ($($t:ty),*) => {
        $(
            impl RLPEncode for $t {
                fn encode(&self, buf: &mut dyn BufMut) {
                    minimal_be_bytes(&self.to_be_bytes()).encode(buf)
                }
            }
        )*
    };
}

impl_encode_for_uint!(u8, u16, u32, u64, usize, u128);

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        let bytes = self.to_big_endian();
        minimal_be_bytes(&bytes).encode(buf)
    }
}

impl RLPEncode for [u8] {
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.len() == 1 && self[0] < RLP_NULL {
            buf.put_u8(self[0]);
        } else {
            encode_prefix(self.len(), RLP_NULL, buf);
            buf.put_slice(self);
        }
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_slice().encode(buf)
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
}

impl RLPEncode for str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for Ipv4Addr {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.octets().encode(buf)
    }
}

macro_rules! impl_encode_for_hash {
    ($($t:ty),*) => {
        $(
            impl RLPEncode for $t {
                fn encode(&self, buf: &mut dyn BufMut) {
                    self.as_bytes().encode(buf)
                }
            }
        )*
    };
}

impl_encode_for_hash!(H64, H128, Address, H256, H512, H520, Bloom);

// A Vec<T> is always a list, even for T = u8. Byte strings go through
// `[u8]`, `Bytes` or fixed-size arrays instead.
impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut payload = Vec::new();
        for item in self {
            item.encode(&mut payload);
        }
        encode_length(payload.len(), buf);
        buf.put_slice(&payload);
    }
}

impl<T: RLPEncode + ?Sized> RLPEncode for &T {
    fn encode(&self, buf: &mut dyn BufMut) {
        (*self).encode(buf)
    }
}

macro_rules! impl_encode_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: RLPEncode),+> RLPEncode for ($($name,)+) {
            #[allow(non_snake_case)]
            fn encode(&self, buf: &mut dyn BufMut) {
                let ($($name,)+) = self;
                let mut payload = Vec::new();
                $($name.encode(&mut payload);)+
                encode_length(payload.len(), buf);
                buf.put_slice(&payload);
            }
        }
    };
}

impl_encode_for_tuple!(A, B);
impl_encode_for_tuple!(A, B, C);
impl_encode_for_tuple!(A, B, C, D);
impl_encode_for_tuple!(A, B, C, D, E);
