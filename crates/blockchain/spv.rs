use std::{
    net::Ipv4Addr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use ethkit_common::{
    Address, H512, U256,
    types::{BlockHeader, Node, SignedTransaction},
};
use ethkit_p2p::{
    PeerEvents, PeerHandle,
    discovery::{NodeDiscovery, NodeManager},
    les::{LesSession, PeerEvent, Task},
    rlpx::utils::public_key_to_id,
    spawn_peer,
};
use ethkit_storage::{SpvStore, Store};
use secp256k1::{SECP256K1, SecretKey};
use tokio::{
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
        watch,
    },
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::{
    config::SpvConfig,
    delegate::WalletDelegate,
    error::SyncError,
    sync::{AccountStateSyncer, BestBlock, BlockSyncer, HeadersOutcome, SyncState},
    transaction_sender::TransactionSender,
};

/// How long to wait before asking the node manager again when it had no node to offer.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Command {
    Send {
        send_id: u64,
        transaction: SignedTransaction,
    },
    Stop,
}

/// Cloneable access to a light client from other tasks while [`SpvBlockchain::run`] drives it.
#[derive(Debug, Clone)]
pub struct SpvHandle {
    store: Arc<dyn SpvStore>,
    address: Address,
    checkpoint: BlockHeader,
    sync_state: watch::Receiver<SyncState>,
    commands: UnboundedSender<Command>,
    next_send_id: Arc<AtomicU64>,
}

impl SpvHandle {
    pub fn sync_state(&self) -> SyncState {
        self.sync_state.borrow().clone()
    }

    /// Receiver that wakes on every sync state change.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.sync_state.clone()
    }

    pub fn last_block_height(&self) -> Result<u64, SyncError> {
        Ok(self
            .store
            .last_block_header()?
            .map_or(self.checkpoint.number, |header| header.number))
    }

    /// Balance of the wallet account at the last proven state, zero before the first one.
    pub fn balance(&self) -> Result<U256, SyncError> {
        Ok(self
            .store
            .account_state(self.address)?
            .map(|state| state.balance)
            .unwrap_or_default())
    }

    /// Queues a transaction. The returned id is passed to
    /// [`WalletDelegate::on_send_result`] with the outcome.
    pub fn send(&self, transaction: SignedTransaction) -> Result<u64, SyncError> {
        let send_id = self.next_send_id.fetch_add(1, Ordering::Relaxed);
        self.commands
            .send(Command::Send {
                send_id,
                transaction,
            })
            .map_err(|_| SyncError::Stopped)?;
        Ok(send_id)
    }

    /// Makes [`SpvBlockchain::run`] return after the commands queued before this one.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }
}

/// The light client: finds nodes, keeps one LES peer connected and syncs headers and the
/// wallet account's state through it.
pub struct SpvBlockchain {
    config: SpvConfig,
    identity: SecretKey,
    node_manager: NodeManager,
    block_syncer: BlockSyncer,
    account_syncer: AccountStateSyncer,
    transaction_sender: TransactionSender,
    delegate: Arc<dyn WalletDelegate>,
    peer: Option<PeerHandle>,
    events: PeerEvents,
    event_receiver: UnboundedReceiver<(H512, PeerEvent)>,
    commands: UnboundedReceiver<Command>,
    sync_state: watch::Sender<SyncState>,
    handle: SpvHandle,
}

impl SpvBlockchain {
    /// Builds the client and seeds the node store with the configured bootnodes.
    pub fn new(
        config: SpvConfig,
        identity: SecretKey,
        address: Address,
        store: Store,
        delegate: Arc<dyn WalletDelegate>,
    ) -> Result<Self, SyncError> {
        let local_node = Node::new(
            public_key_to_id(&identity.public_key(SECP256K1)),
            Ipv4Addr::UNSPECIFIED,
            config.listen_port,
            config.listen_port,
        );
        let (discovered_sender, discovered) = unbounded_channel();
        let discovery = NodeDiscovery::new(
            local_node,
            identity,
            store.nodes().clone(),
            config.discovery.clone(),
            discovered_sender,
        );
        let mut node_manager = NodeManager::new(store.nodes().clone(), discovery, discovered);
        node_manager.add(&config.bootnodes())?;

        let checkpoint = config.network.checkpoint().header();
        let block_syncer =
            BlockSyncer::new(store.spv().clone(), checkpoint.clone(), config.headers_limit);
        let account_syncer = AccountStateSyncer::new(store.spv().clone(), address);

        let (events, event_receiver) = unbounded_channel();
        let (command_sender, commands) = unbounded_channel();
        let (sync_state, sync_state_receiver) =
            watch::channel(SyncState::NotSynced("Not started".to_owned()));
        let handle = SpvHandle {
            store: store.spv().clone(),
            address,
            checkpoint,
            sync_state: sync_state_receiver,
            commands: command_sender,
            next_send_id: Arc::new(AtomicU64::new(0)),
        };

        Ok(Self {
            config,
            identity,
            node_manager,
            block_syncer,
            account_syncer,
            transaction_sender: TransactionSender::default(),
            delegate,
            peer: None,
            events,
            event_receiver,
            commands,
            sync_state,
            handle,
        })
    }

    pub fn handle(&self) -> SpvHandle {
        self.handle.clone()
    }

    pub fn sync_state(&self) -> SyncState {
        self.handle.sync_state()
    }

    pub fn last_block_height(&self) -> Result<u64, SyncError> {
        self.handle.last_block_height()
    }

    pub fn balance(&self) -> Result<U256, SyncError> {
        self.handle.balance()
    }

    pub fn send(&self, transaction: SignedTransaction) -> Result<u64, SyncError> {
        self.handle.send(transaction)
    }

    /// Drives the client until [`SpvHandle::stop`] is called. Errors from the peer only
    /// replace it; storage failures end the loop.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        info!("Starting light client on {}", self.config.network);
        self.connect()?;

        loop {
            tokio::select! {
                Some((id, event)) = self.event_receiver.recv() => {
                    self.handle_event(id, event)?;
                }
                Some(command) = self.commands.recv() => {
                    let Command::Send { send_id, transaction } = command else {
                        break;
                    };
                    self.send_transaction(send_id, transaction);
                }
                discovered = self.node_manager.discovered(), if self.peer.is_none() => {
                    if let Some(count) = discovered? {
                        debug!("Discovery found {count} new nodes");
                    }
                    self.connect()?;
                }
                _ = sleep(RECONNECT_INTERVAL), if self.peer.is_none() => {
                    self.connect()?;
                }
            }
        }

        info!("Stopping light client");
        self.peer = None;
        self.block_syncer.reset();
        self.set_sync_state(SyncState::NotSynced("Stopped".to_owned()));
        Ok(())
    }

    fn connect(&mut self) -> Result<(), SyncError> {
        if self.peer.is_some() {
            return Ok(());
        }
        let Some(node) = self.node_manager.node()? else {
            debug!("No eligible node, waiting for discovery");
            return Ok(());
        };
        info!("Connecting to {node}");
        self.peer = Some(spawn_peer(
            self.identity,
            node,
            LesSession::default(),
            self.config.peer_config(),
            self.events.clone(),
        ));
        Ok(())
    }

    fn handle_event(&mut self, id: H512, event: PeerEvent) -> Result<(), SyncError> {
        if !self.peer.as_ref().is_some_and(|peer| peer.node().id == id) {
            debug!("Ignoring event from previous peer {id:#x}");
            return Ok(());
        }
        match self.process_event(id, event) {
            Err(err) if err.is_peer_fault() => {
                warn!("Dropping peer {id:#x}: {err}");
                self.replace_peer(id, err.to_string())
            }
            other => other,
        }
    }

    fn process_event(&mut self, id: H512, event: PeerEvent) -> Result<(), SyncError> {
        let Some(peer) = self.peer.as_ref() else {
            return Err(SyncError::NoPeer);
        };
        match event {
            PeerEvent::Connected => {
                let head = self.block_syncer.last_header()?;
                peer.add(Task::Handshake {
                    network_id: self.config.network.chain_id(),
                    genesis_hash: self.config.network.genesis_hash(),
                    head,
                })?;
            }
            PeerEvent::HandshakeCompleted {
                head_hash,
                head_number,
                head_td,
            } => {
                self.node_manager.mark_success(id)?;
                self.delegate
                    .on_handshake_complete(id, head_hash, head_number);
                self.block_syncer.set_best(BestBlock {
                    hash: head_hash,
                    number: head_number,
                    total_difficulty: head_td,
                });
                self.sync()?;
            }
            PeerEvent::BlockAnnounced {
                hash,
                number,
                total_difficulty,
            } => {
                self.block_syncer.set_best(BestBlock {
                    hash,
                    number,
                    total_difficulty,
                });
                self.sync()?;
            }
            PeerEvent::BlockHeadersReceived {
                block_header,
                headers,
                reverse,
            } => match self
                .block_syncer
                .handle_headers(peer, block_header, headers, reverse)?
            {
                HeadersOutcome::Progress(height) => self.delegate.on_headers_received(height),
                HeadersOutcome::ForkResolving => {}
                HeadersOutcome::Synced(last) => {
                    self.delegate.on_headers_received(last.number);
                    self.account_syncer.sync(peer, last)?;
                }
            },
            PeerEvent::AccountStateReceived(state) => {
                if self.account_syncer.handle(&state)? {
                    self.delegate.on_account_state_updated(&state);
                }
                if !self.block_syncer.is_syncing() {
                    self.set_sync_state(SyncState::Synced);
                }
            }
            PeerEvent::TransactionSent { send_id, hash } => {
                if let Some(result) = self.transaction_sender.resolve(send_id, Ok(hash)) {
                    self.delegate.on_send_result(send_id, result);
                }
            }
            PeerEvent::TransactionFailed { send_id, error } => {
                if let Some(result) = self.transaction_sender.resolve(send_id, Err(error)) {
                    self.delegate.on_send_result(send_id, result);
                }
            }
            PeerEvent::Disconnected(reason) => {
                info!("Peer {id:#x} disconnected: {reason}");
                self.replace_peer(id, reason)?;
            }
        }
        Ok(())
    }

    /// Syncs headers when the peer is ahead. Otherwise refreshes the account state.
    fn sync(&mut self) -> Result<(), SyncError> {
        let Some(peer) = self.peer.as_ref() else {
            return Err(SyncError::NoPeer);
        };
        if self.block_syncer.sync(peer)? {
            self.set_sync_state(SyncState::Syncing);
        } else if !self.block_syncer.is_syncing() {
            let last = self.block_syncer.last_header()?;
            self.account_syncer.sync(peer, last)?;
        }
        Ok(())
    }

    fn send_transaction(&mut self, send_id: u64, transaction: SignedTransaction) {
        let result = match self.peer.as_ref() {
            Some(peer) => self.transaction_sender.send(peer, send_id, transaction),
            None => Err(SyncError::NoPeer),
        };
        if let Err(err) = result {
            self.delegate.on_send_result(send_id, Err(err.to_string()));
        }
    }

    /// Drops the current peer, counting it as a failure, and connects to the next node.
    fn replace_peer(&mut self, id: H512, reason: String) -> Result<(), SyncError> {
        self.peer = None;
        self.node_manager.mark_failure(id)?;
        self.block_syncer.reset();
        for send_id in self.transaction_sender.abandon() {
            self.delegate
                .on_send_result(send_id, Err(format!("Peer lost: {reason}")));
        }
        self.set_sync_state(SyncState::NotSynced(reason));
        self.connect()
    }

    fn set_sync_state(&self, state: SyncState) {
        let changed = self.sync_state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state.clone();
            true
        });
        if changed {
            info!("Sync state: {state}");
            self.delegate.on_sync_state_changed(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ethkit_common::{
        H256,
        config::networks::{Checkpoint, Network},
        types::AccountState,
    };
    use ethkit_storage::EngineType;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingDelegate {
        send_results: Mutex<Vec<(u64, Result<H256, String>)>>,
        states: Mutex<Vec<SyncState>>,
    }

    impl WalletDelegate for RecordingDelegate {
        fn on_send_result(&self, send_id: u64, result: Result<H256, String>) {
            self.send_results.lock().unwrap().push((send_id, result));
        }

        fn on_sync_state_changed(&self, state: &SyncState) {
            self.states.lock().unwrap().push(state.clone());
        }
    }

    fn config() -> SpvConfig {
        SpvConfig {
            network: Network::Custom {
                chain_id: 1337,
                genesis_hash: H256::repeat_byte(0x01),
                checkpoint: Checkpoint {
                    number: 1000,
                    hash: H256::repeat_byte(0x02),
                    total_difficulty: U256::zero(),
                },
                bootnodes: vec![],
            },
            bootnodes: Some(vec![]),
            ..Default::default()
        }
    }

    fn client(delegate: Arc<RecordingDelegate>) -> (SpvBlockchain, Store) {
        let identity = SecretKey::new(&mut StdRng::seed_from_u64(7));
        let store = Store::new(EngineType::InMemory);
        let client = SpvBlockchain::new(
            config(),
            identity,
            Address::repeat_byte(0xaa),
            store.clone(),
            delegate,
        )
        .unwrap();
        (client, store)
    }

    #[test]
    fn reads_come_from_the_store() {
        let (client, store) = client(Arc::default());
        assert_eq!(client.last_block_height().unwrap(), 1000);
        assert_eq!(client.balance().unwrap(), U256::zero());

        let header = BlockHeader {
            number: 1001,
            ..Default::default()
        };
        store.spv().save_block_headers(&[header]).unwrap();
        let mut state = AccountState::empty(Address::repeat_byte(0xaa));
        state.balance = U256::from(5u64);
        store.spv().save_account_state(&state).unwrap();

        let handle = client.handle();
        assert_eq!(handle.last_block_height().unwrap(), 1001);
        assert_eq!(handle.balance().unwrap(), U256::from(5u64));
    }

    #[test]
    fn send_ids_are_sequential() {
        let (client, _) = client(Arc::default());
        let handle = client.handle();
        assert_eq!(client.send(SignedTransaction::default()).unwrap(), 0);
        assert_eq!(handle.send(SignedTransaction::default()).unwrap(), 1);
    }

    #[tokio::test]
    async fn send_without_peer_fails_and_stop_ends_the_loop() {
        let delegate = Arc::new(RecordingDelegate::default());
        let (mut client, _) = client(delegate.clone());
        let handle = client.handle();

        let send_id = handle.send(SignedTransaction::default()).unwrap();
        handle.stop();
        client.run().await.unwrap();

        let results = delegate.send_results.lock().unwrap().clone();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, send_id);
        assert!(results[0].1.is_err());

        assert_eq!(
            handle.sync_state(),
            SyncState::NotSynced("Stopped".to_owned())
        );
        assert_eq!(
            delegate.states.lock().unwrap().last(),
            Some(&SyncState::NotSynced("Stopped".to_owned()))
        );
    }

    #[tokio::test]
    async fn events_of_unknown_peers_are_ignored() {
        let (mut client, _) = client(Arc::default());
        let event = PeerEvent::Disconnected("gone".to_owned());
        client.handle_event(H512::repeat_byte(0x01), event).unwrap();
        assert_eq!(client.sync_state(), SyncState::NotSynced("Not started".to_owned()));
    }
}
