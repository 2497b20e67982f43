mod account;
mod block;
mod node;
mod transaction;

pub use account::*;
pub use block::*;
pub use node::*;
pub use transaction::*;
