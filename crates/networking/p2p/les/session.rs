use std::collections::{HashMap, hash_map::Entry};

use ethkit_common::H512;
use rand::Rng;
use tracing::{debug, warn};

use super::{
    error::LesError,
    handlers::{
        AccountStateHandler, AnnounceHandler, BlockHeadersHandler, HandshakeHandler,
        SendTransactionHandler,
    },
    message::LesMessage,
    task::{PeerEvent, Task},
};

/// The connection side of a session: where requests go out and events go up.
pub trait Requester {
    fn peer_id(&self) -> H512;

    fn send(&mut self, message: LesMessage) -> Result<(), LesError>;

    fn notify(&mut self, event: PeerEvent);
}

/// A task handler. Handlers are asked in order and the first one to claim a task or
/// message deals with it.
pub trait Handler: Send {
    /// Returns the task back if this handler doesn't perform it.
    fn perform(
        &mut self,
        task: Task,
        requester: &mut dyn Requester,
    ) -> Result<Option<Task>, LesError>;

    /// Returns the message back if it isn't one this handler answers to.
    fn handle(
        &mut self,
        message: LesMessage,
        requester: &mut dyn Requester,
    ) -> Result<Option<LesMessage>, LesError>;
}

/// Requests in flight, keyed by a random request id.
#[derive(Debug)]
pub struct PendingRequests<T> {
    requests: HashMap<u64, T>,
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self {
            requests: HashMap::new(),
        }
    }
}

impl<T> PendingRequests<T> {
    /// Records `request` under a fresh id and returns the id.
    pub fn insert(&mut self, request: T) -> u64 {
        let mut rng = rand::thread_rng();
        loop {
            let id = rng.r#gen();
            if let Entry::Vacant(entry) = self.requests.entry(id) {
                entry.insert(request);
                return id;
            }
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<T> {
        self.requests.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Resolves the pending request a response refers to, or logs a stale response.
pub(crate) fn take_pending<T>(
    pending: &mut PendingRequests<T>,
    request_id: u64,
    kind: &str,
) -> Option<T> {
    let request = pending.remove(request_id);
    if request.is_none() {
        debug!("No pending request {request_id} for les:{kind}, ignoring");
    }
    request
}

/// LES session of one peer.
pub struct LesSession {
    handlers: Vec<Box<dyn Handler>>,
}

impl Default for LesSession {
    /// Session with the light client handlers, in dispatch order.
    fn default() -> Self {
        Self::new(vec![
            Box::new(HandshakeHandler::default()),
            Box::new(BlockHeadersHandler::default()),
            Box::new(AccountStateHandler::default()),
            Box::new(SendTransactionHandler::default()),
            Box::new(AnnounceHandler),
        ])
    }
}

impl LesSession {
    pub fn new(handlers: Vec<Box<dyn Handler>>) -> Self {
        Self { handlers }
    }

    pub fn add_handler(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(handler);
    }

    pub fn add(&mut self, task: Task, requester: &mut dyn Requester) -> Result<(), LesError> {
        let mut task = task;
        for handler in self.handlers.iter_mut() {
            match handler.perform(task, requester)? {
                Some(unclaimed) => task = unclaimed,
                None => return Ok(()),
            }
        }
        warn!("No handler performs {} tasks, dropping it", task.name());
        Ok(())
    }

    pub fn handle(
        &mut self,
        message: LesMessage,
        requester: &mut dyn Requester,
    ) -> Result<(), LesError> {
        let mut message = message;
        for handler in self.handlers.iter_mut() {
            match handler.handle(message, requester)? {
                Some(unclaimed) => message = unclaimed,
                None => return Ok(()),
            }
        }
        warn!("Unhandled message {message}");
        Ok(())
    }
}
