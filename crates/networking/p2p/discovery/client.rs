use std::{net::Ipv4Addr, time::Duration};

use ethkit_common::types::Node;
use tokio::net::UdpSocket;

use crate::discovery::error::DiscoveryError;

/// Max datagram size. Discovery v4 packets are limited to 1280 bytes.
const MAX_DISC_PACKET_SIZE: usize = 1280;

/// UDP client talking to a single discovery node from an ephemeral local port.
#[derive(Debug)]
pub struct UdpClient {
    node: Node,
    socket: UdpSocket,
    read_timeout: Duration,
    responded: bool,
}

impl UdpClient {
    pub async fn bind(node: Node, read_timeout: Duration) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.connect(node.udp_addr()).await?;
        Ok(Self {
            node,
            socket,
            read_timeout,
            responded: false,
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Whether the node sent anything back yet.
    pub fn responded(&self) -> bool {
        self.responded
    }

    pub async fn send(&self, data: &[u8]) -> Result<(), DiscoveryError> {
        self.socket.send(data).await?;
        Ok(())
    }

    /// Waits for the next datagram. Running out of time, or an empty read, is a
    /// [`DiscoveryError::Timeout`].
    pub async fn receive(&mut self) -> Result<Vec<u8>, DiscoveryError> {
        let mut buf = vec![0; MAX_DISC_PACKET_SIZE];
        let read = tokio::time::timeout(self.read_timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| DiscoveryError::Timeout)??;
        if read == 0 {
            return Err(DiscoveryError::Timeout);
        }
        self.responded = true;
        buf.truncate(read);
        Ok(buf)
    }
}
