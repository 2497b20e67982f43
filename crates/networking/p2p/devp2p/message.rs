use std::fmt;

use bytes::BufMut;
use ethkit_common::H512;
use ethkit_rlp::{
    decode::RLPDecode,
    error::{RLPDecodeError, RLPEncodeError},
    item::{RLPItem, RLPValue},
    structs::{Decoder, Encoder},
};

use super::capability::Capability;
use crate::rlpx::message::RLPxMessage;

pub const P2P_PROTOCOL_VERSION: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    pub protocol_version: u8,
    pub client_id: String,
    pub capabilities: Vec<Capability>,
    pub listen_port: u16,
    pub node_id: H512,
}

impl HelloMessage {
    pub fn new(
        client_id: String,
        capabilities: Vec<Capability>,
        listen_port: u16,
        node_id: H512,
    ) -> Self {
        Self {
            protocol_version: P2P_PROTOCOL_VERSION,
            client_id,
            capabilities,
            listen_port,
            node_id,
        }
    }
}

impl RLPxMessage for HelloMessage {
    const CODE: u8 = 0x00;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&self.protocol_version)
            .encode_field(&self.client_id)
            .encode_field(&self.capabilities)
            .encode_field(&self.listen_port)
            .encode_field(&self.node_id)
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        let decoder = Decoder::new(msg_data)?;
        let (protocol_version, decoder) = decoder.decode_field("protocolVersion")?;
        let (client_id, decoder) = decoder.decode_field("clientId")?;
        let (capabilities, decoder) = decoder.decode_field("capabilities")?;
        let (listen_port, decoder) = decoder.decode_field("listenPort")?;
        let (node_id, decoder) = decoder.decode_field("nodeId")?;
        // Implementations must ignore any additional list elements
        let _padding = decoder.finish_unchecked();
        Ok(Self {
            protocol_version,
            client_id,
            capabilities,
            listen_port,
            node_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    DisconnectRequested,
    TcpError,
    ProtocolBreach,
    UselessPeer,
    TooManyPeers,
    AlreadyConnected,
    IncompatibleVersion,
    InvalidIdentity,
    ClientQuitting,
    UnexpectedIdentity,
    SelfConnection,
    Timeout,
    SubprotocolError,
    Unknown(u8),
}

impl From<u8> for DisconnectReason {
    fn from(value: u8) -> Self {
        match value {
            0x00 => DisconnectReason::DisconnectRequested,
            0x01 => DisconnectReason::TcpError,
            0x02 => DisconnectReason::ProtocolBreach,
            0x03 => DisconnectReason::UselessPeer,
            0x04 => DisconnectReason::TooManyPeers,
            0x05 => DisconnectReason::AlreadyConnected,
            0x06 => DisconnectReason::IncompatibleVersion,
            0x07 => DisconnectReason::InvalidIdentity,
            0x08 => DisconnectReason::ClientQuitting,
            0x09 => DisconnectReason::UnexpectedIdentity,
            0x0a => DisconnectReason::SelfConnection,
            0x0b => DisconnectReason::Timeout,
            0x10 => DisconnectReason::SubprotocolError,
            other => DisconnectReason::Unknown(other),
        }
    }
}

impl From<DisconnectReason> for u8 {
    fn from(value: DisconnectReason) -> Self {
        match value {
            DisconnectReason::DisconnectRequested => 0x00,
            DisconnectReason::TcpError => 0x01,
            DisconnectReason::ProtocolBreach => 0x02,
            DisconnectReason::UselessPeer => 0x03,
            DisconnectReason::TooManyPeers => 0x04,
            DisconnectReason::AlreadyConnected => 0x05,
            DisconnectReason::IncompatibleVersion => 0x06,
            DisconnectReason::InvalidIdentity => 0x07,
            DisconnectReason::ClientQuitting => 0x08,
            DisconnectReason::UnexpectedIdentity => 0x09,
            DisconnectReason::SelfConnection => 0x0a,
            DisconnectReason::Timeout => 0x0b,
            DisconnectReason::SubprotocolError => 0x10,
            DisconnectReason::Unknown(other) => other,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::DisconnectRequested => write!(f, "Disconnect Requested"),
            DisconnectReason::TcpError => write!(f, "TCP Subsystem Error"),
            DisconnectReason::ProtocolBreach => write!(f, "Breach of Protocol"),
            DisconnectReason::UselessPeer => write!(f, "Useless Peer"),
            DisconnectReason::TooManyPeers => write!(f, "Too Many Peers"),
            DisconnectReason::AlreadyConnected => write!(f, "Already Connected"),
            DisconnectReason::IncompatibleVersion => write!(f, "Incompatible P2P Protocol Version"),
            DisconnectReason::InvalidIdentity => write!(f, "Null Node Identity Received"),
            DisconnectReason::ClientQuitting => write!(f, "Client Quitting"),
            DisconnectReason::UnexpectedIdentity => write!(f, "Unexpected Identity in Handshake"),
            DisconnectReason::SelfConnection => write!(f, "Identity is the Same as This Node"),
            DisconnectReason::Timeout => write!(f, "Ping Timeout"),
            DisconnectReason::SubprotocolError => write!(f, "Some Other Reason Specific to a Subprotocol"),
            DisconnectReason::Unknown(code) => write!(f, "Unknown Reason ({code:#04x})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectMessage {
    pub reason: DisconnectReason,
}

impl RLPxMessage for DisconnectMessage {
    const CODE: u8 = 0x01;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf)
            .encode_field(&u8::from(self.reason))
            .finish();
        Ok(())
    }

    fn decode(msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        // Some clients send the bare reason instead of a single element list
        let item = RLPItem::decode(msg_data)?;
        let reason = match item.kind() {
            RLPValue::List(items) => match items.first() {
                Some(item) => item.int_value()?,
                None => return Err(RLPDecodeError::MalformedData),
            },
            RLPValue::Data(_) => item.int_value()?,
        };
        let reason = u8::try_from(reason).map_err(|_| RLPDecodeError::InvalidLength)?;
        Ok(Self {
            reason: reason.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingMessage;

impl RLPxMessage for PingMessage {
    const CODE: u8 = 0x02;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf).finish();
        Ok(())
    }

    fn decode(_msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongMessage;

impl RLPxMessage for PongMessage {
    const CODE: u8 = 0x03;

    fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        Encoder::new(buf).finish();
        Ok(())
    }

    fn decode(_msg_data: &[u8]) -> Result<Self, RLPDecodeError> {
        Ok(Self)
    }
}

/// Base protocol messages, always at wire codes 0x00..0x0f.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevP2PMessage {
    Hello(HelloMessage),
    Disconnect(DisconnectMessage),
    Ping(PingMessage),
    Pong(PongMessage),
}

impl DevP2PMessage {
    pub fn code(&self) -> u8 {
        match self {
            DevP2PMessage::Hello(_) => HelloMessage::CODE,
            DevP2PMessage::Disconnect(_) => DisconnectMessage::CODE,
            DevP2PMessage::Ping(_) => PingMessage::CODE,
            DevP2PMessage::Pong(_) => PongMessage::CODE,
        }
    }

    pub fn decode(code: u8, data: &[u8]) -> Result<Self, RLPDecodeError> {
        match code {
            HelloMessage::CODE => Ok(DevP2PMessage::Hello(HelloMessage::decode(data)?)),
            DisconnectMessage::CODE => {
                Ok(DevP2PMessage::Disconnect(DisconnectMessage::decode(data)?))
            }
            PingMessage::CODE => Ok(DevP2PMessage::Ping(PingMessage::decode(data)?)),
            PongMessage::CODE => Ok(DevP2PMessage::Pong(PongMessage::decode(data)?)),
            _ => Err(RLPDecodeError::Custom(format!(
                "Unknown p2p message code {code:#04x}"
            ))),
        }
    }

    pub fn encode(&self, buf: &mut dyn BufMut) -> Result<(), RLPEncodeError> {
        match self {
            DevP2PMessage::Hello(msg) => msg.encode(buf),
            DevP2PMessage::Disconnect(msg) => msg.encode(buf),
            DevP2PMessage::Ping(msg) => msg.encode(buf),
            DevP2PMessage::Pong(msg) => msg.encode(buf),
        }
    }
}

impl fmt::Display for DevP2PMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevP2PMessage::Hello(msg) => write!(f, "p2p:Hello({})", msg.client_id),
            DevP2PMessage::Disconnect(msg) => write!(f, "p2p:Disconnect({})", msg.reason),
            DevP2PMessage::Ping(_) => "p2p:Ping".fmt(f),
            DevP2PMessage::Pong(_) => "p2p:Pong".fmt(f),
        }
    }
}
