use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ethkit_common::types::Node;
use ethkit_storage::NodeStore;
use secp256k1::SecretKey;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    discovery::{
        DiscoveryConfig,
        client::UdpClient,
        error::DiscoveryError,
        packet::{FindNodeMessage, Message, Packet, PingMessage, PongMessage},
    },
    rlpx::utils::log_peer_debug,
    utils::get_msg_expiration_from_seconds,
};

/// Refreshes the node store by asking known nodes for their neighbors.
///
/// Every probed node gets its own [`UdpClient`] and task. Nodes learned from
/// Neighbors packets are sent through the channel given at construction.
#[derive(Debug, Clone)]
pub struct NodeDiscovery {
    local_node: Node,
    signer: SecretKey,
    store: Arc<dyn NodeStore>,
    config: DiscoveryConfig,
    discovered: mpsc::UnboundedSender<Vec<Node>>,
    active_clients: Arc<AtomicUsize>,
}

/// Decrements the active client count when a client task ends, however it ends.
struct ActiveClient(Arc<AtomicUsize>);

impl Drop for ActiveClient {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl NodeDiscovery {
    pub fn new(
        local_node: Node,
        signer: SecretKey,
        store: Arc<dyn NodeStore>,
        config: DiscoveryConfig,
        discovered: mpsc::UnboundedSender<Vec<Node>>,
    ) -> Self {
        Self {
            local_node,
            signer,
            store,
            config,
            discovered,
            active_clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether a previous lookup still has clients waiting for answers.
    pub fn is_processing(&self) -> bool {
        self.active_clients.load(Ordering::SeqCst) > 0
    }

    /// Probes up to `alpha` nodes that were never used for discovery. Returns how many
    /// were probed. Must be called from within a tokio runtime.
    pub fn lookup(&self) -> Result<usize, DiscoveryError> {
        let candidates = self.store.non_used_nodes(self.config.alpha)?;
        if candidates.is_empty() {
            return Err(DiscoveryError::AllNodesUsed);
        }

        info!(count = candidates.len(), "Starting discovery lookup");
        for record in &candidates {
            self.store.mark_used(record.id())?;
            self.active_clients.fetch_add(1, Ordering::SeqCst);
            let active = ActiveClient(self.active_clients.clone());
            let discovery = self.clone();
            let node = record.node.clone();
            tokio::spawn(async move {
                let _active = active;
                discovery.find_neighbors(node).await;
            });
        }
        Ok(candidates.len())
    }

    async fn find_neighbors(&self, node: Node) {
        let mut client = match UdpClient::bind(node.clone(), self.config.read_timeout()).await {
            Ok(client) => client,
            Err(err) => {
                log_peer_debug(&node, &format!("Could not open discovery client: {err}"));
                return;
            }
        };

        let Err(err) = self.listen(&mut client).await else {
            return;
        };
        log_peer_debug(&node, &format!("Discovery client stopped: {err}"));

        if !client.responded()
            && let Err(err) = self.store.remove(node.id)
        {
            debug!("Could not remove unresponsive node {node}: {err}");
        }
    }

    /// Sends Ping and FindNode, then handles answers until the client errors out.
    async fn listen(&self, client: &mut UdpClient) -> Result<(), DiscoveryError> {
        self.send(client, Message::Ping(self.ping(client.node()))).await?;
        self.send(client, self.find_node()).await?;

        loop {
            let data = client.receive().await?;
            let packet = match Packet::decode(&data) {
                Ok(packet) => packet,
                Err(err) => {
                    log_peer_debug(client.node(), &format!("Dropping packet: {err}"));
                    continue;
                }
            };
            log_peer_debug(client.node(), &format!("<<< {}", packet.message));
            self.handle_packet(client, packet).await?;
        }
    }

    async fn handle_packet(
        &self,
        client: &UdpClient,
        packet: Packet,
    ) -> Result<(), DiscoveryError> {
        match packet.message {
            Message::Ping(ping) => {
                let pong = Message::Pong(PongMessage {
                    to: ping.from,
                    ping_hash: packet.hash,
                    expiration: self.expiration(),
                });
                self.send(client, pong).await?;
                self.send(client, self.find_node()).await?;
            }
            Message::Neighbors(neighbors) => {
                // Receiver gone means nobody is interested in new nodes anymore
                let _ = self.discovered.send(neighbors.nodes);
            }
            // We don't serve the table and never wait on pongs
            Message::Pong(_) | Message::FindNode(_) => {}
        }
        Ok(())
    }

    async fn send(&self, client: &UdpClient, message: Message) -> Result<(), DiscoveryError> {
        let mut buf: Vec<u8> = vec![];
        message.encode_with_header(&mut buf, &self.signer);
        log_peer_debug(client.node(), &format!(">>> {message}"));
        client.send(&buf).await
    }

    fn ping(&self, to: &Node) -> PingMessage {
        PingMessage::new(&self.local_node, to, self.expiration())
    }

    fn find_node(&self) -> Message {
        Message::FindNode(FindNodeMessage {
            target: self.local_node.id,
            expiration: self.expiration(),
        })
    }

    fn expiration(&self) -> u64 {
        get_msg_expiration_from_seconds(self.config.expiration_secs)
    }
}
