use std::sync::Arc;

use tracing::info;

use crate::{
    api::{NodeStore, SpvStore},
    store_db::in_memory::{InMemoryNodeStore, InMemorySpvStore},
};

/// Handles to the light client's two stores. Cloning is cheap and clones share state.
#[derive(Debug, Clone)]
pub struct Store {
    spv: Arc<dyn SpvStore>,
    nodes: Arc<dyn NodeStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    InMemory,
}

impl Store {
    pub fn new(engine_type: EngineType) -> Self {
        info!("Starting storage engine ({engine_type:?})");
        match engine_type {
            EngineType::InMemory => Self {
                spv: Arc::new(InMemorySpvStore::new()),
                nodes: Arc::new(InMemoryNodeStore::new()),
            },
        }
    }

    /// Builds a store backed by engines provided by the embedding wallet.
    pub fn from_engines(spv: Arc<dyn SpvStore>, nodes: Arc<dyn NodeStore>) -> Self {
        Self { spv, nodes }
    }

    pub fn spv(&self) -> &Arc<dyn SpvStore> {
        &self.spv
    }

    pub fn nodes(&self) -> &Arc<dyn NodeStore> {
        &self.nodes
    }
}
