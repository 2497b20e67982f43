use ethkit_common::types::Node;

use super::{
    capability::{BASE_PROTOCOL_LENGTH, Capability, CapabilityTable, SupportedCapability},
    error::DevP2PError,
    message::{
        DevP2PMessage, DisconnectMessage, DisconnectReason, HelloMessage, PingMessage,
        PongMessage,
    },
};
use crate::rlpx::{
    frame::Frame,
    utils::{log_peer_debug, log_peer_warn},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevP2PState {
    Connecting,
    HelloSent,
    Connected,
    Disconnected,
}

/// What the connection should do with an inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    /// The remote Hello was accepted and capabilities negotiated.
    Connected,
    /// Answer the remote with this frame.
    Reply(Frame),
    Ignored,
    /// A message for a negotiated capability, with its code made local again.
    Subprotocol {
        capability: Capability,
        code: u8,
        payload: Vec<u8>,
    },
}

/// Base protocol state of one peer connection.
///
/// It owns no transport: frames go in through [`DevP2PPeer::handle_frame`] and the frames to
/// send come out of its methods, so the driver decides how and when they hit the wire.
#[derive(Debug)]
pub struct DevP2PPeer {
    node: Node,
    hello: HelloMessage,
    supported: Vec<SupportedCapability>,
    state: DevP2PState,
    capabilities: CapabilityTable,
    remote_client_id: Option<String>,
    awaiting_pong: bool,
}

impl DevP2PPeer {
    pub fn new(node: Node, hello: HelloMessage, supported: Vec<SupportedCapability>) -> Self {
        Self {
            node,
            hello,
            supported,
            state: DevP2PState::Connecting,
            capabilities: CapabilityTable::default(),
            remote_client_id: None,
            awaiting_pong: false,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn state(&self) -> DevP2PState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == DevP2PState::Connected
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn remote_client_id(&self) -> Option<&str> {
        self.remote_client_id.as_deref()
    }

    pub fn hello_frame(&mut self) -> Result<Frame, DevP2PError> {
        let frame = self.base_frame(&DevP2PMessage::Hello(self.hello.clone()))?;
        self.state = DevP2PState::HelloSent;
        Ok(frame)
    }

    pub fn handle_frame(&mut self, frame: Frame) -> Result<Incoming, DevP2PError> {
        if frame.code < BASE_PROTOCOL_LENGTH {
            let message = DevP2PMessage::decode(frame.code, &frame.payload)?;
            log_peer_debug(&self.node, &format!("<<< {message}"));
            return self.handle_base_message(message);
        }

        if !self.is_connected() {
            return Err(DevP2PError::UnexpectedMessage(format!(
                "message {:#04x} before hello",
                frame.code
            )));
        }
        match self.capabilities.route(frame.code) {
            Some((shared, code)) => Ok(Incoming::Subprotocol {
                capability: shared.capability.clone(),
                code,
                payload: frame.payload,
            }),
            None => {
                log_peer_debug(
                    &self.node,
                    &format!("Dropping message with unrouted code {:#04x}", frame.code),
                );
                Ok(Incoming::Ignored)
            }
        }
    }

    fn handle_base_message(&mut self, message: DevP2PMessage) -> Result<Incoming, DevP2PError> {
        match message {
            DevP2PMessage::Hello(hello) => {
                if self.state != DevP2PState::HelloSent {
                    return Err(DevP2PError::UnexpectedMessage(format!(
                        "hello while {:?}",
                        self.state
                    )));
                }
                if hello.node_id != self.node.id {
                    return Err(DevP2PError::UnexpectedIdentity);
                }
                self.capabilities =
                    CapabilityTable::negotiate(&self.supported, &hello.capabilities)?;
                self.remote_client_id = Some(hello.client_id);
                self.state = DevP2PState::Connected;
                Ok(Incoming::Connected)
            }
            DevP2PMessage::Disconnect(DisconnectMessage { reason }) => {
                self.state = DevP2PState::Disconnected;
                Err(DevP2PError::DisconnectMessageReceived(reason))
            }
            DevP2PMessage::Ping(_) => Ok(Incoming::Reply(
                self.base_frame(&DevP2PMessage::Pong(PongMessage))?,
            )),
            DevP2PMessage::Pong(_) => {
                self.awaiting_pong = false;
                Ok(Incoming::Ignored)
            }
        }
    }

    /// Keep-alive ping. Fails if the previous one was never answered.
    pub fn ping_frame(&mut self) -> Result<Frame, DevP2PError> {
        if self.awaiting_pong {
            return Err(DevP2PError::PingTimeout);
        }
        let frame = self.base_frame(&DevP2PMessage::Ping(PingMessage))?;
        self.awaiting_pong = true;
        Ok(frame)
    }

    pub fn disconnect_frame(&mut self, reason: DisconnectReason) -> Result<Frame, DevP2PError> {
        let frame = self.base_frame(&DevP2PMessage::Disconnect(DisconnectMessage { reason }))?;
        self.state = DevP2PState::Disconnected;
        Ok(frame)
    }

    /// Frame for a capability message, or `None` if the capability wasn't negotiated,
    /// in which case the message is dropped.
    pub fn frame_for(&self, capability: &str, code: u8, payload: Vec<u8>) -> Option<Frame> {
        match self.capabilities.wire_code(capability, code) {
            Some(wire_code) => Some(Frame::new(wire_code, payload)),
            None => {
                log_peer_warn(
                    &self.node,
                    &format!("Dropping {capability} message {code:#04x}: capability not shared"),
                );
                None
            }
        }
    }

    fn base_frame(&self, message: &DevP2PMessage) -> Result<Frame, DevP2PError> {
        let mut payload: Vec<u8> = Vec::new();
        message.encode(&mut payload)?;
        log_peer_debug(&self.node, &format!(">>> {message}"));
        Ok(Frame::new(message.code(), payload))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use ethkit_common::H512;

    use super::*;

    fn node(id: u8) -> Node {
        Node::new(H512::repeat_byte(id), Ipv4Addr::LOCALHOST, 30303, 30303)
    }

    fn peer(local: u8, remote: u8, supported: Vec<SupportedCapability>) -> DevP2PPeer {
        let caps = supported.iter().map(|s| s.capability.clone()).collect();
        let hello = HelloMessage::new(format!("peer-{local}"), caps, 30303, H512::repeat_byte(local));
        DevP2PPeer::new(node(remote), hello, supported)
    }

    fn les() -> Vec<SupportedCapability> {
        vec![SupportedCapability::new("les", 2, 0x16)]
    }

    fn connected_pair() -> (DevP2PPeer, DevP2PPeer) {
        let mut a = peer(1, 2, les());
        let mut b = peer(2, 1, les());
        let a_hello = a.hello_frame().unwrap();
        let b_hello = b.hello_frame().unwrap();
        assert_eq!(a.handle_frame(b_hello).unwrap(), Incoming::Connected);
        assert_eq!(b.handle_frame(a_hello).unwrap(), Incoming::Connected);
        (a, b)
    }

    #[test]
    fn hello_exchange_connects_both_sides() {
        let (a, b) = connected_pair();
        assert!(a.is_connected() && b.is_connected());
        assert_eq!(a.capabilities(), b.capabilities());
        assert_eq!(a.remote_client_id(), Some("peer-2"));
    }

    #[test]
    fn hello_from_unexpected_identity_is_rejected() {
        let mut a = peer(1, 2, les());
        let mut impostor = peer(3, 1, les());
        a.hello_frame().unwrap();
        assert!(matches!(
            a.handle_frame(impostor.hello_frame().unwrap()),
            Err(DevP2PError::UnexpectedIdentity)
        ));
    }

    #[test]
    fn hello_without_shared_capabilities_fails() {
        let mut a = peer(1, 2, les());
        let mut b = peer(2, 1, vec![SupportedCapability::new("eth", 68, 0x11)]);
        a.hello_frame().unwrap();
        let err = a.handle_frame(b.hello_frame().unwrap()).unwrap_err();
        assert!(matches!(err, DevP2PError::NoSharedCapabilities));
        assert_eq!(err.disconnect_reason(), Some(DisconnectReason::UselessPeer));
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let (mut a, mut b) = connected_pair();
        let ping = a.ping_frame().unwrap();
        let Incoming::Reply(pong) = b.handle_frame(ping).unwrap() else {
            panic!("expected a pong reply");
        };
        assert_eq!(pong.code, 0x03);
        assert_eq!(a.handle_frame(pong).unwrap(), Incoming::Ignored);
        // The pong cleared the pending ping
        assert!(a.ping_frame().is_ok());
    }

    #[test]
    fn unanswered_ping_times_out() {
        let (mut a, _) = connected_pair();
        a.ping_frame().unwrap();
        assert!(matches!(a.ping_frame(), Err(DevP2PError::PingTimeout)));
    }

    #[test]
    fn disconnect_is_fatal() {
        let (mut a, mut b) = connected_pair();
        let frame = a.disconnect_frame(DisconnectReason::ClientQuitting).unwrap();
        assert_eq!(a.state(), DevP2PState::Disconnected);
        assert!(matches!(
            b.handle_frame(frame),
            Err(DevP2PError::DisconnectMessageReceived(
                DisconnectReason::ClientQuitting
            ))
        ));
        assert_eq!(b.state(), DevP2PState::Disconnected);
    }

    #[test]
    fn capability_messages_are_routed() {
        let (a, mut b) = connected_pair();
        let frame = a.frame_for("les", 0x02, vec![0xc0]).unwrap();
        assert_eq!(frame.code, 0x12);
        assert_eq!(
            b.handle_frame(frame).unwrap(),
            Incoming::Subprotocol {
                capability: Capability::new("les", 2),
                code: 0x02,
                payload: vec![0xc0],
            }
        );
        assert!(a.frame_for("eth", 0x00, vec![]).is_none());
        assert_eq!(
            b.handle_frame(Frame::new(0x30, vec![])).unwrap(),
            Incoming::Ignored
        );
    }

    #[test]
    fn capability_message_before_hello_is_rejected() {
        let mut a = peer(1, 2, les());
        a.hello_frame().unwrap();
        assert!(matches!(
            a.handle_frame(Frame::new(0x10, vec![0xc0])),
            Err(DevP2PError::UnexpectedMessage(_))
        ));
    }
}
