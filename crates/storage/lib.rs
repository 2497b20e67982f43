mod api;
pub mod error;
mod store;
mod store_db;

pub use api::{NodeStore, SpvStore};
pub use store::{EngineType, Store};
pub use store_db::in_memory::{InMemoryNodeStore, InMemorySpvStore};
