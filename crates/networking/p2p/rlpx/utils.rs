use std::array::TryFromSliceError;

use ethkit_common::{H512, types::Node};
use secp256k1::{PublicKey, SecretKey, ecdh::shared_secret_point};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use crate::rlpx::error::CryptographyError;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha256_hmac(
    key: &[u8],
    inputs: &[&[u8]],
    size_data: &[u8],
) -> Result<[u8; 32], CryptographyError> {
    use hmac::Mac;

    let mut hasher = hmac::Hmac::<Sha256>::new_from_slice(key)
        .map_err(|error| CryptographyError::InvalidKey(error.to_string()))?;
    for input in inputs {
        hasher.update(input);
    }
    hasher.update(size_data);
    Ok(hasher.finalize().into_bytes().into())
}

/// X coordinate of the shared point.
pub fn ecdh_xchng(
    secret_key: &SecretKey,
    public_key: &PublicKey,
) -> Result<[u8; 32], CryptographyError> {
    let point = shared_secret_point(public_key, secret_key);
    point[..32].try_into().map_err(|error: TryFromSliceError| {
        CryptographyError::InvalidGeneratedSecret(error.to_string())
    })
}

pub fn kdf(secret: &[u8], output: &mut [u8]) -> Result<(), CryptographyError> {
    // We don't use the `other_info` field
    concat_kdf::derive_key_into::<Sha256>(secret, &[], output)
        .map_err(|error| CryptographyError::CouldNotGetKeyFromSecret(error.to_string()))
}

/// Node id of a public key: its uncompressed form without the leading 0x04.
pub fn public_key_to_id(pk: &PublicKey) -> H512 {
    let bytes = pk.serialize_uncompressed();
    debug_assert_eq!(bytes[0], 4);
    H512::from_slice(&bytes[1..])
}

/// Inverse of [`public_key_to_id`]. Returns `None` if the id isn't a curve point.
pub fn id_to_public_key(id: H512) -> Option<PublicKey> {
    let mut full_pk = [0u8; 65];
    full_pk[0] = 0x04;
    full_pk[1..].copy_from_slice(&id.0);
    PublicKey::from_slice(&full_pk).ok()
}

pub fn log_peer_debug(node: &Node, text: &str) {
    debug!("[{node}]: {text}")
}

pub fn log_peer_warn(node: &Node, text: &str) {
    warn!("[{node}]: {text}")
}

pub fn log_peer_error(node: &Node, text: &str) {
    error!("[{node}]: {text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn ecdh_agrees_on_both_sides() {
        let a = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let b = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let a_pub = PublicKey::from_secret_key(secp256k1::SECP256K1, &a);
        let b_pub = PublicKey::from_secret_key(secp256k1::SECP256K1, &b);
        assert_eq!(
            ecdh_xchng(&a, &b_pub).unwrap(),
            ecdh_xchng(&b, &a_pub).unwrap()
        );
    }

    #[test]
    fn node_id_round_trips_through_public_key() {
        let secret = SecretKey::from_slice(&[0x33; 32]).unwrap();
        let public = PublicKey::from_secret_key(secp256k1::SECP256K1, &secret);
        let id = public_key_to_id(&public);
        assert_eq!(id_to_public_key(id), Some(public));
        assert_eq!(id_to_public_key(H512::zero()), None);
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256(&[]),
            hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }
}
