//! Discovery v4 wire format.
//!
//! ```text
//! packet    = hash || signature || type || payload
//! hash      = keccak256(signature || type || payload)
//! signature = sign(keccak256(type || payload))
//! ```

use std::{fmt::Display, net::Ipv4Addr};

use bytes::BufMut;
use ethkit_common::{H256, H512, types::Node};
use ethkit_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    item::RLPItem,
    structs::Encoder,
};
use keccak_hash::keccak;
use secp256k1::{
    Message as SecpMessage, SECP256K1, SecretKey,
    ecdsa::{RecoverableSignature, RecoveryId},
};

use crate::{discovery::error::PacketError, rlpx::utils::public_key_to_id};

const HASH_SIZE: usize = 32;
const SIGNATURE_SIZE: usize = 65;
const HEADER_SIZE: usize = HASH_SIZE + SIGNATURE_SIZE;

pub const DISCOVERY_VERSION: u64 = 4;

/// Where a node listens. Used by Ping and Pong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub udp_port: u16,
    pub tcp_port: u16,
}

impl Endpoint {
    fn from_item(item: &RLPItem) -> Result<Self, PacketError> {
        let fields = fields(item, 3)?;
        Ok(Self {
            ip: decode_host(&fields[0])?,
            udp_port: decode_port(&fields[1])?,
            tcp_port: decode_port(&fields[2])?,
        })
    }
}

impl From<&Node> for Endpoint {
    fn from(node: &Node) -> Self {
        Self {
            ip: node.host,
            udp_port: node.discovery_port,
            tcp_port: node.port,
        }
    }
}

impl RLPEncode for Endpoint {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.ip)
            .encode_field(&self.udp_port)
            .encode_field(&self.tcp_port)
            .finish();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingMessage {
    pub version: u64,
    pub from: Endpoint,
    pub to: Endpoint,
    pub expiration: u64,
}

impl PingMessage {
    /// Ping from `local` to `remote`. The recipient's TCP port is left unset.
    pub fn new(local: &Node, remote: &Node, expiration: u64) -> Self {
        Self {
            version: DISCOVERY_VERSION,
            from: Endpoint::from(local),
            to: Endpoint {
                tcp_port: 0,
                ..Endpoint::from(remote)
            },
            expiration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PongMessage {
    pub to: Endpoint,
    /// Hash of the ping packet being answered.
    pub ping_hash: H256,
    pub expiration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindNodeMessage {
    pub target: H512,
    pub expiration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborsMessage {
    pub nodes: Vec<Node>,
    pub expiration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ping(PingMessage),
    Pong(PongMessage),
    FindNode(FindNodeMessage),
    Neighbors(NeighborsMessage),
}

impl Message {
    pub fn packet_type(&self) -> u8 {
        match self {
            Message::Ping(_) => 0x01,
            Message::Pong(_) => 0x02,
            Message::FindNode(_) => 0x03,
            Message::Neighbors(_) => 0x04,
        }
    }

    fn encode_payload(&self, buf: &mut dyn BufMut) {
        match self {
            Message::Ping(ping) => Encoder::new(buf)
                .encode_field(&ping.version)
                .encode_field(&ping.from)
                .encode_field(&ping.to)
                .encode_field(&ping.expiration)
                .finish(),
            Message::Pong(pong) => Encoder::new(buf)
                .encode_field(&pong.to)
                .encode_field(&pong.ping_hash)
                .encode_field(&pong.expiration)
                .finish(),
            Message::FindNode(find_node) => Encoder::new(buf)
                .encode_field(&find_node.target)
                .encode_field(&find_node.expiration)
                .finish(),
            Message::Neighbors(neighbors) => {
                let nodes: Vec<(Ipv4Addr, u16, u16, H512)> = neighbors
                    .nodes
                    .iter()
                    .map(|node| (node.host, node.discovery_port, node.port, node.id))
                    .collect();
                Encoder::new(buf)
                    .encode_field(&nodes)
                    .encode_field(&neighbors.expiration)
                    .finish()
            }
        }
    }

    fn decode_payload(packet_type: u8, payload: &[u8]) -> Result<Self, PacketError> {
        let item = RLPItem::decode(payload)?;
        match packet_type {
            0x01 => {
                let fields = fields(&item, 4)?;
                let version = fields[0].int_value()?;
                if version != DISCOVERY_VERSION {
                    return Err(PacketError::WrongVersion(version));
                }
                Ok(Message::Ping(PingMessage {
                    version,
                    from: Endpoint::from_item(&fields[1])?,
                    to: Endpoint::from_item(&fields[2])?,
                    expiration: fields[3].int_value()?,
                }))
            }
            0x02 => {
                let fields = fields(&item, 3)?;
                Ok(Message::Pong(PongMessage {
                    to: Endpoint::from_item(&fields[0])?,
                    ping_hash: fields[1].value()?,
                    expiration: fields[2].int_value()?,
                }))
            }
            0x03 => {
                let fields = fields(&item, 2)?;
                Ok(Message::FindNode(FindNodeMessage {
                    target: fields[0].value()?,
                    expiration: fields[1].int_value()?,
                }))
            }
            0x04 => {
                let fields = fields(&item, 2)?;
                let nodes = fields[0]
                    .list_value()?
                    .iter()
                    .map(|entry| -> Result<Node, PacketError> {
                        let entry = self::fields(entry, 4)?;
                        Ok(Node::new(
                            entry[3].value()?,
                            decode_host(&entry[0])?,
                            decode_port(&entry[2])?,
                            decode_port(&entry[1])?,
                        ))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Message::Neighbors(NeighborsMessage {
                    nodes,
                    expiration: fields[1].int_value()?,
                }))
            }
            other => Err(PacketError::WrongType(other)),
        }
    }

    /// Writes the signed packet for this message into `buf` and returns the packet hash.
    pub fn encode_with_header(&self, buf: &mut dyn BufMut, signer: &SecretKey) -> H256 {
        let mut signed: Vec<u8> = vec![self.packet_type()];
        self.encode_payload(&mut signed);

        let digest = SecpMessage::from_digest(keccak(&signed).0);
        let (recovery_id, signature) = SECP256K1
            .sign_ecdsa_recoverable(&digest, signer)
            .serialize_compact();

        let mut body = Vec::with_capacity(SIGNATURE_SIZE + signed.len());
        body.extend_from_slice(&signature);
        body.push(recovery_id.to_i32() as u8);
        body.extend_from_slice(&signed);

        let hash = keccak(&body);
        buf.put_slice(hash.as_bytes());
        buf.put_slice(&body);
        hash
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Ping(_) => "disc:Ping".fmt(f),
            Message::Pong(_) => "disc:Pong".fmt(f),
            Message::FindNode(_) => "disc:FindNode".fmt(f),
            Message::Neighbors(neighbors) => {
                write!(f, "disc:Neighbors({} nodes)", neighbors.nodes.len())
            }
        }
    }
}

/// A received packet, after its hash and signature were checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub hash: H256,
    /// Id of the node that signed the packet.
    pub node_id: H512,
    pub message: Message,
}

impl Packet {
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.is_empty() {
            return Err(PacketError::EmptyData);
        }
        // At least the type byte and a one byte payload
        if data.len() < HEADER_SIZE + 2 {
            return Err(PacketError::TooSmall(data.len()));
        }

        let hash = H256::from_slice(&data[..HASH_SIZE]);
        if keccak(&data[HASH_SIZE..]) != hash {
            return Err(PacketError::WrongHash);
        }

        let signature = &data[HASH_SIZE..HEADER_SIZE];
        let signed = &data[HEADER_SIZE..];
        let message = Message::decode_payload(signed[0], &signed[1..])?;
        let node_id = recover_node_id(signature, signed)?;

        Ok(Self {
            hash,
            node_id,
            message,
        })
    }
}

fn recover_node_id(signature: &[u8], signed: &[u8]) -> Result<H512, PacketError> {
    let recovery_id =
        RecoveryId::from_i32(signature[64] as i32).map_err(|_| PacketError::InvalidSignature)?;
    let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|_| PacketError::InvalidSignature)?;
    let digest = SecpMessage::from_digest(keccak(signed).0);
    let public_key = SECP256K1
        .recover_ecdsa(&digest, &signature)
        .map_err(|_| PacketError::InvalidSignature)?;
    Ok(public_key_to_id(&public_key))
}

/// List items of `item`, which must hold at least `arity` of them. Extra trailing
/// items are allowed for forward compatibility.
fn fields(item: &RLPItem, arity: usize) -> Result<&[RLPItem], PacketError> {
    let items = item.list_value()?;
    if items.len() < arity {
        return Err(PacketError::WrongParameters {
            expected: arity,
            received: items.len(),
        });
    }
    Ok(items)
}

fn decode_host(item: &RLPItem) -> Result<Ipv4Addr, PacketError> {
    let octets: [u8; 4] = item
        .data_value()
        .map_err(|_| PacketError::WrongHostDecode)?
        .try_into()
        .map_err(|_| PacketError::WrongHostDecode)?;
    Ok(Ipv4Addr::from(octets))
}

fn decode_port(item: &RLPItem) -> Result<u16, PacketError> {
    u16::try_from(item.int_value()?).map_err(|_| PacketError::from(RLPDecodeError::MalformedData))
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use secp256k1::PublicKey;

    use super::*;

    fn signer() -> SecretKey {
        SecretKey::from_slice(&hex!(
            "b71c71a67e1177ad4e901695e1b4b9ee17ae16c6668d313eac2f96dbcda3f291"
        ))
        .unwrap()
    }

    fn signer_id() -> H512 {
        public_key_to_id(&PublicKey::from_secret_key(SECP256K1, &signer()))
    }

    fn node(last_octet: u8) -> Node {
        Node::new(
            H512::repeat_byte(last_octet),
            Ipv4Addr::new(10, 0, 0, last_octet),
            30303,
            30301,
        )
    }

    fn encode(message: &Message) -> (H256, Vec<u8>) {
        let mut buf: Vec<u8> = vec![];
        let hash = message.encode_with_header(&mut buf, &signer());
        (hash, buf)
    }

    fn one_of_each() -> [Message; 4] {
        [
            Message::Ping(PingMessage::new(&node(1), &node(2), 1_700_000_000)),
            Message::Pong(PongMessage {
                to: Endpoint::from(&node(3)),
                ping_hash: H256::repeat_byte(0xab),
                expiration: 1_700_000_020,
            }),
            Message::FindNode(FindNodeMessage {
                target: signer_id(),
                expiration: 1_700_000_040,
            }),
            Message::Neighbors(NeighborsMessage {
                nodes: vec![node(4), node(5)],
                expiration: 1_700_000_060,
            }),
        ]
    }

    #[test]
    fn packets_decode_to_what_was_sent() {
        for message in one_of_each() {
            let (hash, buf) = encode(&message);
            let packet = Packet::decode(&buf).unwrap();
            assert_eq!(packet.hash, hash);
            assert_eq!(packet.node_id, signer_id());
            assert_eq!(packet.message, message);
        }
    }

    #[test]
    fn ping_leaves_recipient_tcp_port_unset() {
        let ping = PingMessage::new(&node(1), &node(2), 0);
        assert_eq!(ping.version, 4);
        assert_eq!(ping.from.tcp_port, 30303);
        assert_eq!(ping.to.tcp_port, 0);
        assert_eq!(ping.to.udp_port, 30301);
    }

    #[test]
    fn any_flipped_byte_is_a_wrong_hash() {
        for message in one_of_each() {
            let (_, buf) = encode(&message);
            for index in 0..buf.len() {
                let mut corrupted = buf.clone();
                corrupted[index] ^= 0x01;
                assert_eq!(
                    Packet::decode(&corrupted),
                    Err(PacketError::WrongHash),
                    "{message} byte {index}"
                );
            }
        }
    }

    /// Builds a correctly hashed packet around an arbitrary payload.
    fn raw_packet(packet_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8; SIGNATURE_SIZE];
        body.push(packet_type);
        body.extend_from_slice(payload);
        let mut packet = keccak(&body).as_bytes().to_vec();
        packet.extend(body);
        packet
    }

    #[test]
    fn malformed_packets_are_rejected() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::EmptyData));
        assert_eq!(
            Packet::decode(&[0u8; HEADER_SIZE]),
            Err(PacketError::TooSmall(HEADER_SIZE))
        );

        assert_eq!(
            Packet::decode(&raw_packet(0x09, &(1u8, 2u8).encode_to_vec())),
            Err(PacketError::WrongType(0x09))
        );
        assert_eq!(
            Packet::decode(&raw_packet(0x03, &vec![7u64].encode_to_vec())),
            Err(PacketError::WrongParameters {
                expected: 2,
                received: 1
            })
        );
    }

    #[test]
    fn ping_version_and_host_are_checked() {
        let endpoint = Endpoint::from(&node(1));
        let ping_v5 = (5u64, endpoint, endpoint, 10u64).encode_to_vec();
        assert_eq!(
            Packet::decode(&raw_packet(0x01, &ping_v5)),
            Err(PacketError::WrongVersion(5))
        );

        let bad_host = ([10u8, 0, 0], 30301u16, 30303u16);
        let pong = (bad_host, H256::zero(), 10u64).encode_to_vec();
        assert_eq!(
            Packet::decode(&raw_packet(0x02, &pong)),
            Err(PacketError::WrongHostDecode)
        );
    }

    #[test]
    fn unsigned_packet_is_rejected() {
        let endpoint = Endpoint::from(&node(1));
        let pong = (endpoint, H256::zero(), 10u64).encode_to_vec();
        assert_eq!(
            Packet::decode(&raw_packet(0x02, &pong)),
            Err(PacketError::InvalidSignature)
        );
    }
}
