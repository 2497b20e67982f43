use std::fmt;

use ethkit_common::{H256, H512, H520};
use ethkit_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use keccak_hash::keccak;
use rand::{CryptoRng, Rng};
use secp256k1::{Message, PublicKey, SECP256K1, SecretKey};
use sha3::{Digest, Keccak256};

use super::{
    ecies,
    error::HandshakeError,
    utils::{ecdh_xchng, id_to_public_key, public_key_to_id},
};

pub const RLPX_PROTOCOL_VERSION: u8 = 4;

/// Auth padding bounds. Random padding hides the auth size on the wire.
const MIN_AUTH_PADDING: usize = 100;
const MAX_AUTH_PADDING: usize = 300;

/// Symmetric session state derived from the handshake, owned by a single connection.
#[derive(Clone)]
pub struct Secrets {
    pub remote_id: H512,
    pub aes: H256,
    pub mac: H256,
    pub token: H256,
    pub egress_mac: Keccak256,
    pub ingress_mac: Keccak256,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("remote_id", &self.remote_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthMessage {
    pub signature: H520,
    pub initiator_public_key: H512,
    pub nonce: H256,
    pub version: u8,
}

impl RLPEncode for AuthMessage {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.signature)
            .encode_field(&self.initiator_public_key)
            .encode_field(&self.nonce)
            .encode_field(&self.version)
            .finish();
    }
}

impl RLPDecode for AuthMessage {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (signature, decoder) = decoder.decode_field("signature")?;
        let (initiator_public_key, decoder) = decoder.decode_field("initiator_public_key")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (version, decoder) = decoder.decode_field("version")?;
        Ok((
            AuthMessage {
                signature,
                initiator_public_key,
                nonce,
                version,
            },
            decoder.finish_unchecked(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthAckMessage {
    pub ephemeral_public_key: H512,
    pub nonce: H256,
    pub version: u8,
}

impl RLPEncode for AuthAckMessage {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.ephemeral_public_key)
            .encode_field(&self.nonce)
            .encode_field(&self.version)
            .finish();
    }
}

impl RLPDecode for AuthAckMessage {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (ephemeral_public_key, decoder) = decoder.decode_field("ephemeral_public_key")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (version, decoder) = decoder.decode_field("version")?;
        // Newer versions may append fields
        Ok((
            AuthAckMessage {
                ephemeral_public_key,
                nonce,
                version,
            },
            decoder.finish_unchecked(),
        ))
    }
}

/// Initiator side of the RLPx handshake: `Idle -> AuthSent -> SecretsDerived`.
pub struct Handshake {
    identity: SecretKey,
    remote_id: H512,
    remote_public_key: PublicKey,
    ephemeral_key: SecretKey,
    nonce: H256,
    auth_packet: Option<Vec<u8>>,
}

impl Handshake {
    pub fn new<R: Rng + CryptoRng>(
        rng: &mut R,
        identity: SecretKey,
        remote_id: H512,
    ) -> Result<Self, HandshakeError> {
        let ephemeral_key = SecretKey::new(rng);
        let nonce = H256(rng.r#gen());
        Self::with_ephemeral(identity, remote_id, ephemeral_key, nonce)
    }

    /// Same as [`Handshake::new`] with a caller-chosen ephemeral key and nonce.
    pub fn with_ephemeral(
        identity: SecretKey,
        remote_id: H512,
        ephemeral_key: SecretKey,
        nonce: H256,
    ) -> Result<Self, HandshakeError> {
        let remote_public_key =
            id_to_public_key(remote_id).ok_or(HandshakeError::InvalidRemotePublicKey)?;
        Ok(Self {
            identity,
            remote_id,
            remote_public_key,
            ephemeral_key,
            nonce,
            auth_packet: None,
        })
    }

    /// Unencrypted, unpadded auth body: `[sig, initiator-pubkey, nonce, version]`.
    ///
    /// The signature is made with the ephemeral key over `ecdh(identity, remote) ^ nonce`, which
    /// lets the remote recover our ephemeral public key.
    pub fn auth_body(&self) -> Result<Vec<u8>, HandshakeError> {
        let static_shared_secret = H256(ecdh_xchng(&self.identity, &self.remote_public_key)?);
        let signature = sign_shared_secret(static_shared_secret, self.nonce, &self.ephemeral_key);
        let auth = AuthMessage {
            signature,
            initiator_public_key: public_key_to_id(&PublicKey::from_secret_key(
                SECP256K1,
                &self.identity,
            )),
            nonce: self.nonce,
            version: RLPX_PROTOCOL_VERSION,
        };
        Ok(auth.encode_to_vec())
    }

    /// Builds the encrypted auth packet and remembers it for MAC seeding.
    pub fn create_auth_message<R: Rng + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<u8>, HandshakeError> {
        let mut body = self.auth_body()?;
        let padding = rng.gen_range(MIN_AUTH_PADDING..=MAX_AUTH_PADDING);
        body.extend((0..padding).map(|_| rng.r#gen::<u8>()));

        let packet = ecies::encrypt(rng, &self.remote_public_key, body)?;
        self.auth_packet = Some(packet.clone());
        Ok(packet)
    }

    /// Derives the session secrets from the remote's auth-ack packet, size prefix included.
    pub fn extract_secrets(&self, ack_packet: &[u8]) -> Result<Secrets, HandshakeError> {
        let auth_packet = self
            .auth_packet
            .as_ref()
            .ok_or(HandshakeError::AuthNotSent)?;

        let ack_body = ecies::decrypt(&self.identity, ack_packet)?;
        let (ack, _padding) = AuthAckMessage::decode_unfinished(&ack_body)
            .map_err(|error| HandshakeError::InvalidAuthAckPayload(error.to_string()))?;
        let remote_ephemeral_key = id_to_public_key(ack.ephemeral_public_key).ok_or_else(|| {
            HandshakeError::InvalidAuthAckPayload("invalid ephemeral public key".to_owned())
        })?;

        let ephemeral_secret = ecdh_xchng(&self.ephemeral_key, &remote_ephemeral_key)?;
        let nonces_hash = keccak([ack.nonce.0, self.nonce.0].concat());
        let shared_secret = keccak([ephemeral_secret, nonces_hash.0].concat());
        let aes = keccak([ephemeral_secret, shared_secret.0].concat());
        let mac = keccak([ephemeral_secret, aes.0].concat());
        let token = keccak(shared_secret);

        // egress-mac = keccak256.init((mac-secret ^ recipient-nonce) || auth)
        let mut egress_mac = Keccak256::default();
        egress_mac.update((mac ^ ack.nonce).0);
        egress_mac.update(auth_packet);

        // ingress-mac = keccak256.init((mac-secret ^ initiator-nonce) || ack)
        let mut ingress_mac = Keccak256::default();
        ingress_mac.update((mac ^ self.nonce).0);
        ingress_mac.update(ack_packet);

        Ok(Secrets {
            remote_id: self.remote_id,
            aes,
            mac,
            token,
            egress_mac,
            ingress_mac,
        })
    }
}

fn sign_shared_secret(shared_secret: H256, local_nonce: H256, ephemeral_key: &SecretKey) -> H520 {
    let signature_prehash = shared_secret ^ local_nonce;
    let message = Message::from_digest(signature_prehash.0);
    let (recovery_id, signature) = SECP256K1
        .sign_ecdsa_recoverable(&message, ephemeral_key)
        .serialize_compact();
    let mut signature_bytes = [0; 65];
    signature_bytes[..64].copy_from_slice(&signature);
    signature_bytes[64] = recovery_id.to_i32() as u8;
    H520(signature_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlpx::error::{CryptographyError, EciesError};
    use rand::{SeedableRng, rngs::StdRng};

    /// Recovers the public key that produced an auth signature.
    fn recover_ephemeral_key(
        shared_secret: H256,
        nonce: H256,
        signature: H520,
    ) -> Result<PublicKey, CryptographyError> {
        use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};

        let recovery_id = RecoveryId::from_i32(signature[64] as i32)?;
        let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)?;
        let message = Message::from_digest((shared_secret ^ nonce).0);
        Ok(SECP256K1.recover_ecdsa(&message, &signature)?)
    }

    struct Remote {
        identity: SecretKey,
        ephemeral_key: SecretKey,
        nonce: H256,
    }

    impl Remote {
        fn id(&self) -> H512 {
            public_key_to_id(&PublicKey::from_secret_key(SECP256K1, &self.identity))
        }

        /// Responder half of the handshake, enough to check the initiator's derivations.
        fn answer(&self, auth_packet: &[u8], rng: &mut StdRng) -> (Vec<u8>, H256, H256) {
            let body = ecies::decrypt(&self.identity, auth_packet).unwrap();
            let (auth, _) = AuthMessage::decode_unfinished(&body).unwrap();
            let initiator = id_to_public_key(auth.initiator_public_key).unwrap();
            let static_secret = H256(ecdh_xchng(&self.identity, &initiator).unwrap());
            let initiator_ephemeral =
                recover_ephemeral_key(static_secret, auth.nonce, auth.signature).unwrap();

            let ack = AuthAckMessage {
                ephemeral_public_key: public_key_to_id(&PublicKey::from_secret_key(
                    SECP256K1,
                    &self.ephemeral_key,
                )),
                nonce: self.nonce,
                version: RLPX_PROTOCOL_VERSION,
            };
            let ack_packet = ecies::encrypt(rng, &initiator, ack.encode_to_vec()).unwrap();

            let ephemeral_secret = ecdh_xchng(&self.ephemeral_key, &initiator_ephemeral).unwrap();
            let nonces_hash = keccak([self.nonce.0, auth.nonce.0].concat());
            let shared_secret = keccak([ephemeral_secret, nonces_hash.0].concat());
            let aes = keccak([ephemeral_secret, shared_secret.0].concat());
            (ack_packet, shared_secret, aes)
        }
    }

    fn remote() -> Remote {
        Remote {
            identity: SecretKey::from_slice(&[0x02; 32]).unwrap(),
            ephemeral_key: SecretKey::from_slice(&[0x03; 32]).unwrap(),
            nonce: H256::repeat_byte(0x04),
        }
    }

    fn initiator(remote_id: H512) -> Handshake {
        Handshake::with_ephemeral(
            SecretKey::from_slice(&[0x01; 32]).unwrap(),
            remote_id,
            SecretKey::from_slice(&[0x05; 32]).unwrap(),
            H256::repeat_byte(0x06),
        )
        .unwrap()
    }

    #[test]
    fn auth_message_is_deterministic_under_fixed_randomness() {
        let remote = remote();
        let first = initiator(remote.id());
        let second = initiator(remote.id());
        assert_eq!(first.auth_body().unwrap(), second.auth_body().unwrap());

        let mut first = first;
        let mut second = second;
        let a = first
            .create_auth_message(&mut StdRng::seed_from_u64(1))
            .unwrap();
        let b = second
            .create_auth_message(&mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn auth_signature_recovers_the_ephemeral_key() {
        let remote = remote();
        let handshake = initiator(remote.id());
        let (auth, _) = AuthMessage::decode_unfinished(&handshake.auth_body().unwrap()).unwrap();
        let static_secret = H256(
            ecdh_xchng(&remote.identity, &id_to_public_key(auth.initiator_public_key).unwrap())
                .unwrap(),
        );
        let recovered = recover_ephemeral_key(static_secret, auth.nonce, auth.signature).unwrap();
        assert_eq!(
            recovered,
            PublicKey::from_secret_key(SECP256K1, &handshake.ephemeral_key)
        );
        assert_eq!(auth.version, RLPX_PROTOCOL_VERSION);
    }

    #[test]
    fn both_sides_derive_the_same_secrets() {
        let remote = remote();
        let mut rng = StdRng::seed_from_u64(2);
        let mut handshake = initiator(remote.id());
        let auth_packet = handshake.create_auth_message(&mut rng).unwrap();

        let (ack_packet, shared_secret, aes) = remote.answer(&auth_packet, &mut rng);
        let secrets = handshake.extract_secrets(&ack_packet).unwrap();

        assert_eq!(secrets.remote_id, remote.id());
        assert_eq!(secrets.aes, aes);
        assert_eq!(secrets.mac, keccak([ecdh_secret(&remote), aes.0].concat()));
        assert_eq!(secrets.token, keccak(shared_secret));

        // The responder seeds its ingress MAC the way we seed our egress MAC
        let mut remote_ingress = Keccak256::default();
        remote_ingress.update((secrets.mac ^ remote.nonce).0);
        remote_ingress.update(&auth_packet);
        assert_eq!(
            remote_ingress.finalize(),
            secrets.egress_mac.clone().finalize()
        );

        let mut remote_egress = Keccak256::default();
        remote_egress.update((secrets.mac ^ H256::repeat_byte(0x06)).0);
        remote_egress.update(&ack_packet);
        assert_eq!(
            remote_egress.finalize(),
            secrets.ingress_mac.clone().finalize()
        );
    }

    fn ecdh_secret(remote: &Remote) -> [u8; 32] {
        let initiator_ephemeral =
            PublicKey::from_secret_key(SECP256K1, &SecretKey::from_slice(&[0x05; 32]).unwrap());
        ecdh_xchng(&remote.ephemeral_key, &initiator_ephemeral).unwrap()
    }

    #[test]
    fn secrets_need_a_sent_auth() {
        let remote = remote();
        let handshake = initiator(remote.id());
        assert!(matches!(
            handshake.extract_secrets(&[0; 200]),
            Err(HandshakeError::AuthNotSent)
        ));
    }

    #[test]
    fn garbage_ack_payload_is_rejected() {
        let remote = remote();
        let mut rng = StdRng::seed_from_u64(3);
        let mut handshake = initiator(remote.id());
        handshake.create_auth_message(&mut rng).unwrap();

        let initiator_public = PublicKey::from_secret_key(SECP256K1, &handshake.identity);
        let ack_packet = ecies::encrypt(&mut rng, &initiator_public, vec![0x01, 0x02]).unwrap();
        assert!(matches!(
            handshake.extract_secrets(&ack_packet),
            Err(HandshakeError::InvalidAuthAckPayload(_))
        ));
    }

    #[test]
    fn tampered_ack_is_a_mac_mismatch() {
        let remote = remote();
        let mut rng = StdRng::seed_from_u64(4);
        let mut handshake = initiator(remote.id());
        let auth_packet = handshake.create_auth_message(&mut rng).unwrap();
        let (mut ack_packet, _, _) = remote.answer(&auth_packet, &mut rng);
        let last = ack_packet.len() - 1;
        ack_packet[last] ^= 0xff;
        assert!(matches!(
            handshake.extract_secrets(&ack_packet),
            Err(HandshakeError::Ecies(EciesError::MacMismatch))
        ));
    }
}
