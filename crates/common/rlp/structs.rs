use super::{
    decode::{RLPDecode, decode_rlp_item, get_item_with_prefix},
    encode::{RLPEncode, encode_length},
    error::RLPDecodeError,
};
use bytes::BufMut;

/// # Struct decoding helper
///
/// Decodes an RLP list field by field. Each call to [`Decoder::decode_field`] consumes the next
/// element and hands back an updated decoder, so field order is expressed by call order.
///
/// ```
/// # use ethkit_rlp::structs::Decoder;
/// # use ethkit_rlp::error::RLPDecodeError;
/// # use ethkit_rlp::decode::RLPDecode;
/// #[derive(Debug, PartialEq, Eq)]
/// struct Endpoint {
///     pub udp_port: u16,
///     pub tcp_port: u16,
/// }
///
/// impl RLPDecode for Endpoint {
///     fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
///         let decoder = Decoder::new(buf)?;
///         let (udp_port, decoder) = decoder.decode_field("udp_port")?;
///         let (tcp_port, decoder) = decoder.decode_field("tcp_port")?;
///         let rest = decoder.finish()?;
///         Ok((Endpoint { udp_port, tcp_port }, rest))
///     }
/// }
///
/// let decoded = Endpoint::decode(&[0xc2, 61, 75]).unwrap();
/// assert_eq!(decoded, Endpoint { udp_port: 61, tcp_port: 75 });
/// ```
#[derive(Debug)]
#[must_use = "`Decoder` must be consumed with `finish` to perform decoding checks"]
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, RLPDecodeError> {
        match decode_rlp_item(buf)? {
            (true, payload, remaining) => Ok(Self { payload, remaining }),
            (false, _, _) => Err(RLPDecodeError::UnexpectedString),
        }
    }

    pub fn decode_field<T: RLPDecode>(self, name: &str) -> Result<(T, Self), RLPDecodeError> {
        let (field, rest) = <T as RLPDecode>::decode_unfinished(self.payload)
            .map_err(|err| field_decode_error::<T>(name, err))?;
        Ok((
            field,
            Self {
                payload: rest,
                ..self
            },
        ))
    }

    /// Returns the next field without decoding it, i.e. its bytes including the prefix.
    pub fn get_encoded_item(self) -> Result<(Vec<u8>, Self), RLPDecodeError> {
        let (field, rest) = get_item_with_prefix(self.payload)?;
        Ok((
            field.to_vec(),
            Self {
                payload: rest,
                ..self
            },
        ))
    }

    /// Returns `Some(field)` if the next element decodes as `T`, otherwise `None`
    /// and the decoder is left untouched.
    pub fn decode_optional_field<T: RLPDecode>(self) -> (Option<T>, Self) {
        match <T as RLPDecode>::decode_unfinished(self.payload) {
            Ok((field, rest)) => (
                Some(field),
                Self {
                    payload: rest,
                    ..self
                },
            ),
            Err(_) => (None, self),
        }
    }

    /// Finishes decoding and returns the bytes following the list.
    /// Fails if some element of the list was left unread.
    pub const fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if self.payload.is_empty() {
            Ok(self.remaining)
        } else {
            Err(RLPDecodeError::MalformedData)
        }
    }

    pub const fn is_done(&self) -> bool {
        self.payload.is_empty()
    }

    /// Same as [`finish`](Self::finish), but discards unread elements instead of failing.
    pub const fn finish_unchecked(self) -> &'a [u8] {
        self.remaining
    }
}

fn field_decode_error<T>(field_name: &str, err: RLPDecodeError) -> RLPDecodeError {
    let typ = std::any::type_name::<T>();
    RLPDecodeError::Custom(format!(
        "Error decoding field '{field_name}' of type {typ}: {err}"
    ))
}

/// # Struct encoding helper
///
/// Encodes a struct as an RLP list whose elements are the fields in the order they were passed
/// to [`Encoder::encode_field`].
///
/// ```
/// # use ethkit_rlp::structs::Encoder;
/// let mut buf = vec![];
/// Encoder::new(&mut buf)
///     .encode_field(&61u8)
///     .encode_field(&75u16)
///     .finish();
/// assert_eq!(&buf, &[0xc2, 61, 75]);
/// ```
#[must_use = "`Encoder` must be consumed with `finish` to perform the encoding"]
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    temp_buf: Vec<u8>,
}

// BufMut doesn't implement Debug
impl core::fmt::Debug for Encoder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Encoder")
            .field("buf", &"...")
            .field("temp_buf", &self.temp_buf)
            .finish()
    }
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Self {
            buf,
            temp_buf: Vec::new(),
        }
    }

    pub fn encode_field<T: RLPEncode + ?Sized>(mut self, value: &T) -> Self {
        value.encode(&mut self.temp_buf);
        self
    }

    /// If `Some`, stores a field to be encoded, else does nothing.
    pub fn encode_optional_field<T: RLPEncode>(mut self, opt_value: &Option<T>) -> Self {
        if let Some(value) = opt_value {
            value.encode(&mut self.temp_buf);
        }
        self
    }

    /// Stores a field as a byte string. Use it for `Vec<u8>` values, which would
    /// otherwise encode as a list of integers.
    pub fn encode_bytes(mut self, value: &[u8]) -> Self {
        value.encode(&mut self.temp_buf);
        self
    }

    /// Appends an already encoded item as is.
    pub fn encode_raw(mut self, value: &[u8]) -> Self {
        self.temp_buf.put_slice(value);
        self
    }

    pub fn finish(self) {
        encode_length(self.temp_buf.len(), self.buf);
        self.buf.put_slice(&self.temp_buf);
    }
}
