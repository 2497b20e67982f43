use bytes::BufMut;
use ethkit_rlp::error::{RLPDecodeError, RLPEncodeError};

/// A message carried in an RLPx frame. `CODE` is local to the message's protocol; the
/// negotiated capability offset is added when it goes on the wire.
pub trait RLPxMessage
where
    Self: Sized,
{
    const CODE: u8;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError>;

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError>;

    fn encode_to_vec(&self) -> Result<Vec<u8>, RLPEncodeError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}
