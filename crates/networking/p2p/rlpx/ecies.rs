//! ECIES as used by the RLPx handshake.
//!
//! An encrypted packet is laid out as
//! `size (2) || ephemeral-pubkey (65) || iv (16) || ciphertext || mac (32)`, where `size` is the
//! big endian length of everything after it and doubles as the MAC's additional data.

use aes::cipher::{KeyIvInit, StreamCipher};
use rand::{CryptoRng, Rng};
use secp256k1::{PublicKey, SECP256K1, SecretKey};

use super::{
    error::{CryptographyError, EciesError},
    utils::{ecdh_xchng, kdf, sha256, sha256_hmac},
};

type Aes128Ctr64BE = ctr::Ctr64BE<aes::Aes128>;

const SIZE_PREFIX_SIZE: usize = 2;
const PUBLIC_KEY_SIZE: usize = 65;
const IV_SIZE: usize = 16;
const MAC_FOOTER_SIZE: usize = 32;

/// Bytes ECIES adds to a message, not counting the size prefix.
pub const ECIES_OVERHEAD: usize = PUBLIC_KEY_SIZE + IV_SIZE + MAC_FOOTER_SIZE;

/// Encrypts `message` for `remote_public_key`, returning the packet with its size prefix.
pub fn encrypt<R: Rng + CryptoRng>(
    rng: &mut R,
    remote_public_key: &PublicKey,
    mut message: Vec<u8>,
) -> Result<Vec<u8>, EciesError> {
    // Precompute the size of the message. This is needed for computing the MAC.
    let size: u16 = (message.len() + ECIES_OVERHEAD)
        .try_into()
        .map_err(|_| EciesError::MessageTooLong)?;
    let size_data = size.to_be_bytes();

    // Generate a keypair just for this message.
    let message_secret_key = SecretKey::new(rng);
    let message_secret = ecdh_xchng(&message_secret_key, remote_public_key)?;

    // Derive the AES and MAC keys from the message secret.
    let mut secret_keys = [0; 32];
    kdf(&message_secret, &mut secret_keys)?;
    let aes_key = &secret_keys[..16];
    let mac_key = sha256(&secret_keys[16..]);

    let iv: [u8; IV_SIZE] = rng.r#gen();
    let mut aes_cipher = Aes128Ctr64BE::new_from_slices(aes_key, &iv)
        .map_err(|error| CryptographyError::InvalidKey(error.to_string()))?;
    aes_cipher.apply_keystream(&mut message);
    let cipher_text = message;

    let mac_footer = sha256_hmac(&mac_key, &[&iv, &cipher_text], &size_data)?;
    let ephemeral_public_key =
        PublicKey::from_secret_key(SECP256K1, &message_secret_key).serialize_uncompressed();

    Ok([
        &size_data[..],
        &ephemeral_public_key,
        &iv,
        &cipher_text,
        &mac_footer,
    ]
    .concat())
}

/// Decrypts a packet produced by [`encrypt`], size prefix included.
///
/// The MAC is checked before anything is decrypted; a mismatch is [`EciesError::MacMismatch`].
pub fn decrypt(secret_key: &SecretKey, packet: &[u8]) -> Result<Vec<u8>, EciesError> {
    if packet.len() < SIZE_PREFIX_SIZE + ECIES_OVERHEAD {
        return Err(EciesError::MessageTooShort(packet.len()));
    }
    let (size_data, rest) = packet.split_at(SIZE_PREFIX_SIZE);
    let (public_key, rest) = rest.split_at(PUBLIC_KEY_SIZE);
    let (iv, rest) = rest.split_at(IV_SIZE);
    let (cipher_text, mac) = rest.split_at(rest.len() - MAC_FOOTER_SIZE);

    let remote_public_key = PublicKey::from_slice(public_key).map_err(CryptographyError::from)?;
    let shared_secret = ecdh_xchng(secret_key, &remote_public_key)?;

    let mut secret_keys = [0; 32];
    kdf(&shared_secret, &mut secret_keys)?;
    let aes_key = &secret_keys[..16];
    let mac_key = sha256(&secret_keys[16..]);

    let expected_mac = sha256_hmac(&mac_key, &[iv, cipher_text], size_data)?;
    if mac != expected_mac {
        return Err(EciesError::MacMismatch);
    }

    let mut aes_cipher = Aes128Ctr64BE::new_from_slices(aes_key, iv)
        .map_err(|error| CryptographyError::InvalidKey(error.to_string()))?;
    let mut plain_text = cipher_text.to_vec();
    aes_cipher.apply_keystream(&mut plain_text);
    Ok(plain_text)
}
