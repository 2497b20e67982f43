use aes::{
    Aes256Enc,
    cipher::{BlockEncrypt as _, KeyInit as _, KeyIvInit as _, StreamCipher as _},
};
use bytes::{Buf, BufMut, BytesMut};
use ethkit_common::{H128, H256};
use ethkit_rlp::{decode::RLPDecode, encode::RLPEncode as _};
use sha3::{Digest as _, Keccak256};
use tokio_util::codec::{Decoder, Encoder};

use super::{error::RLPxError, handshake::Secrets};

// max RLPx Message size
// Taken from https://github.com/ethereum/go-ethereum/blob/82e963e5c981e36dc4b607dd0685c64cf4aabea8/p2p/rlpx/rlpx.go#L152
const MAX_MESSAGE_SIZE: usize = 0xFFFFFF;

const HEADER_SIZE: usize = 32;
const MAC_SIZE: usize = 16;

pub(crate) type Aes256Ctr64BE = ctr::Ctr64BE<aes::Aes256>;

/// A decrypted RLPx frame: peer-global packet type plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(code: u8, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }
}

/// Encrypts and authenticates frames with the secrets of one RLPx session.
pub struct RLPxCodec {
    mac_key: H256,
    ingress_mac: Keccak256,
    egress_mac: Keccak256,
    ingress_aes: Aes256Ctr64BE,
    egress_aes: Aes256Ctr64BE,
    /// Body size of a frame whose header was already consumed.
    pending_frame_size: Option<usize>,
}

impl RLPxCodec {
    pub fn new(secrets: Secrets) -> Result<Self, RLPxError> {
        let aes_cipher = Aes256Ctr64BE::new_from_slices(&secrets.aes.0, &[0; 16])?;
        Ok(Self {
            mac_key: secrets.mac,
            ingress_mac: secrets.ingress_mac,
            egress_mac: secrets.egress_mac,
            ingress_aes: aes_cipher.clone(),
            egress_aes: aes_cipher,
            pending_frame_size: None,
        })
    }

    /// Authenticates and decrypts a frame header, returning the frame size.
    fn decode_header(&mut self, header: &[u8; HEADER_SIZE]) -> Result<usize, RLPxError> {
        let mac_aes_cipher = Aes256Enc::new_from_slice(&self.mac_key.0)?;

        // Both are padded to the block's size (16 bytes)
        let mut header_ciphertext = [0; 16];
        header_ciphertext.copy_from_slice(&header[..16]);
        let header_mac = &header[16..];

        // header-mac-seed = aes(mac-secret, keccak256.digest(ingress-mac)[:16]) ^ header-ciphertext
        let header_mac_seed = header_mac_seed(&mac_aes_cipher, &self.ingress_mac, header_ciphertext);
        self.ingress_mac.update(header_mac_seed);
        if header_mac != mac_digest(&self.ingress_mac) {
            return Err(RLPxError::MacMismatch);
        }

        let mut header_text = header_ciphertext;
        self.ingress_aes.apply_keystream(&mut header_text);

        // header-data = [capability-id, context-id], unused by the light client
        let frame_size = u32::from_be_bytes([0, header_text[0], header_text[1], header_text[2]])
            as usize;
        // Check that the size is not too large to avoid a denial of
        // service attack where the server runs out of memory.
        if frame_size.next_multiple_of(16) > MAX_MESSAGE_SIZE {
            return Err(RLPxError::InvalidMessageLength);
        }
        Ok(frame_size)
    }
}

impl Decoder for RLPxCodec {
    type Item = Frame;

    type Error = RLPxError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame_size = match self.pending_frame_size {
            Some(frame_size) => frame_size,
            None => {
                if src.len() < HEADER_SIZE {
                    // Not enough data to read the frame header.
                    return Ok(None);
                }
                let mut header = [0; HEADER_SIZE];
                header.copy_from_slice(&src[..HEADER_SIZE]);
                let frame_size = self.decode_header(&header)?;
                // The ingress MAC and cipher already moved past this header
                src.advance(HEADER_SIZE);
                self.pending_frame_size = Some(frame_size);
                frame_size
            }
        };

        let padded_size = frame_size.next_multiple_of(16);
        if src.len() < padded_size + MAC_SIZE {
            // The full frame has not yet arrived.
            src.reserve(padded_size + MAC_SIZE - src.len());
            return Ok(None);
        }
        self.pending_frame_size = None;

        let mut frame_data = src.split_to(padded_size + MAC_SIZE);
        let (frame_ciphertext, frame_mac) = frame_data.split_at_mut(padded_size);

        let mac_aes_cipher = Aes256Enc::new_from_slice(&self.mac_key.0)?;
        self.ingress_mac.update(&*frame_ciphertext);
        let frame_mac_seed = frame_mac_seed(&mac_aes_cipher, &self.ingress_mac);
        self.ingress_mac.update(frame_mac_seed);
        if *frame_mac != mac_digest(&self.ingress_mac) {
            return Err(RLPxError::MacMismatch);
        }

        self.ingress_aes.apply_keystream(frame_ciphertext);
        let (frame_data, _padding) = frame_ciphertext.split_at(frame_size);

        let (code, payload): (u8, _) = RLPDecode::decode_unfinished(frame_data)?;
        Ok(Some(Frame::new(code, payload.to_vec())))
    }
}

impl Encoder<Frame> for RLPxCodec {
    type Error = RLPxError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mac_aes_cipher = Aes256Enc::new_from_slice(&self.mac_key.0)?;

        let mut frame_data = frame.code.encode_to_vec();
        frame_data.extend_from_slice(&frame.payload);
        if frame_data.len().next_multiple_of(16) > MAX_MESSAGE_SIZE {
            return Err(RLPxError::InvalidMessageLength);
        }

        // header = frame-size || header-data || header-padding
        let mut header = [0; 16];
        header[..3].copy_from_slice(&(frame_data.len() as u32).to_be_bytes()[1..]);
        // header-data = [capability-id, context-id]  (both always zero)
        let header_data = (0_u8, 0_u8).encode_to_vec();
        header[3..3 + header_data.len()].copy_from_slice(&header_data);
        self.egress_aes.apply_keystream(&mut header);

        let header_mac_seed = header_mac_seed(&mac_aes_cipher, &self.egress_mac, header);
        self.egress_mac.update(header_mac_seed);
        dst.reserve(HEADER_SIZE + frame_data.len().next_multiple_of(16) + MAC_SIZE);
        dst.put_slice(&header);
        dst.put_slice(&mac_digest(&self.egress_mac));

        // Pad to next multiple of 16
        frame_data.resize(frame_data.len().next_multiple_of(16), 0);
        self.egress_aes.apply_keystream(&mut frame_data);
        let frame_ciphertext = frame_data;
        dst.put_slice(&frame_ciphertext);

        // frame-mac-seed = aes(mac-secret, keccak256.digest(egress-mac)[:16]) ^ keccak256.digest(egress-mac)[:16]
        self.egress_mac.update(&frame_ciphertext);
        let frame_mac_seed = frame_mac_seed(&mac_aes_cipher, &self.egress_mac);
        self.egress_mac.update(frame_mac_seed);
        dst.put_slice(&mac_digest(&self.egress_mac));
        Ok(())
    }
}

fn mac_digest(mac: &Keccak256) -> [u8; 16] {
    let mut digest = [0; 16];
    digest.copy_from_slice(&mac.clone().finalize()[..16]);
    digest
}

fn header_mac_seed(cipher: &Aes256Enc, mac: &Keccak256, header_ciphertext: [u8; 16]) -> [u8; 16] {
    let mut seed = mac_digest(mac).into();
    cipher.encrypt_block(&mut seed);
    (H128(seed.into()) ^ H128(header_ciphertext)).0
}

fn frame_mac_seed(cipher: &Aes256Enc, mac: &Keccak256) -> [u8; 16] {
    let digest = mac_digest(mac);
    let mut seed = digest.into();
    cipher.encrypt_block(&mut seed);
    (H128(seed.into()) ^ H128(digest)).0
}
