use std::{collections::HashSet, sync::Arc};

use ethkit_common::{
    H512,
    types::{Node, NodeRecord},
};
use ethkit_storage::NodeStore;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    discovery::{error::DiscoveryError, lookup::NodeDiscovery},
    utils::current_unix_time,
};

/// Hands out peers to connect to and keeps their scores up to date.
///
/// A node handed out by [`NodeManager::node`] stays in use until it is marked as a
/// success or a failure.
#[derive(Debug)]
pub struct NodeManager {
    store: Arc<dyn NodeStore>,
    discovery: NodeDiscovery,
    discovered: mpsc::UnboundedReceiver<Vec<Node>>,
    in_use: HashSet<H512>,
}

impl NodeManager {
    /// `discovered` is the receiving end of the channel `discovery` reports neighbors to.
    pub fn new(
        store: Arc<dyn NodeStore>,
        discovery: NodeDiscovery,
        discovered: mpsc::UnboundedReceiver<Vec<Node>>,
    ) -> Self {
        Self {
            store,
            discovery,
            discovered,
            in_use: HashSet::new(),
        }
    }

    /// Best eligible node not already in use. When there is none a discovery lookup is
    /// started, unless one is running, and `None` is returned.
    pub fn node(&mut self) -> Result<Option<Node>, DiscoveryError> {
        while let Ok(nodes) = self.discovered.try_recv() {
            self.add(&nodes)?;
        }

        let Some(record) = self.store.least_score_node(&self.in_use)? else {
            if !self.discovery.is_processing() {
                match self.discovery.lookup() {
                    Ok(_) | Err(DiscoveryError::AllNodesUsed) => {}
                    Err(err) => warn!("Discovery lookup failed: {err}"),
                }
            }
            return Ok(None);
        };
        self.in_use.insert(record.id());
        Ok(Some(record.node))
    }

    /// Waits for discovery to report new nodes and stores them. Returns how many were
    /// new, or `None` once discovery is gone.
    pub async fn discovered(&mut self) -> Result<Option<usize>, DiscoveryError> {
        match self.discovered.recv().await {
            Some(nodes) => Ok(Some(self.add(&nodes)?)),
            None => Ok(None),
        }
    }

    pub fn mark_success(&mut self, id: H512) -> Result<(), DiscoveryError> {
        self.in_use.remove(&id);
        self.store.increase_score(id)?;
        Ok(())
    }

    pub fn mark_failure(&mut self, id: H512) -> Result<(), DiscoveryError> {
        self.in_use.remove(&id);
        self.store.mark_non_eligible(id)?;
        Ok(())
    }

    /// Stores nodes not seen before. Known nodes keep their score and flags. Returns how
    /// many nodes were added.
    pub fn add(&mut self, nodes: &[Node]) -> Result<usize, DiscoveryError> {
        let timestamp = current_unix_time();
        let mut records = Vec::new();
        for node in nodes {
            if self.store.node(node.id)?.is_some()
                || records.iter().any(|record: &NodeRecord| record.id() == node.id)
            {
                continue;
            }
            records.push(NodeRecord::new(node.clone(), timestamp));
        }
        if !records.is_empty() {
            debug!("Adding new nodes: {}", records.len());
            self.store.save(&records)?;
        }
        Ok(records.len())
    }
}
