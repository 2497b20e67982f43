//! Bringing the local header chain and the wallet's account state up to date with a peer.

mod account_state;
mod block_syncer;

use std::fmt;

use ethkit_p2p::{PeerError, PeerHandle, les::Task};

pub use account_state::AccountStateSyncer;
pub use block_syncer::{BestBlock, BlockSyncer, HeadersOutcome};

/// What the wallet sees of the sync progress. Errors only surface as the reason of
/// [`SyncState::NotSynced`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Syncing,
    Synced,
    NotSynced(String),
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
            SyncState::NotSynced(reason) => write!(f, "not synced: {reason}"),
        }
    }
}

/// Something that runs LES tasks for the syncers, normally the connected peer.
pub trait TaskPerformer {
    fn perform(&self, task: Task) -> Result<(), PeerError>;
}

impl TaskPerformer for PeerHandle {
    fn perform(&self, task: Task) -> Result<(), PeerError> {
        self.add(task)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records tasks instead of sending them anywhere.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingPerformer {
        pub tasks: Mutex<Vec<Task>>,
    }

    impl RecordingPerformer {
        pub fn take(&self) -> Vec<Task> {
            std::mem::take(&mut *self.tasks.lock().unwrap())
        }
    }

    impl TaskPerformer for RecordingPerformer {
        fn perform(&self, task: Task) -> Result<(), PeerError> {
            self.tasks.lock().unwrap().push(task);
            Ok(())
        }
    }

    #[test]
    fn sync_state_display() {
        assert_eq!(SyncState::Synced.to_string(), "synced");
        assert_eq!(
            SyncState::NotSynced("Too many peers".to_owned()).to_string(),
            "not synced: Too many peers"
        );
    }
}
