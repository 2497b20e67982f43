//! Async driver of one light client peer: RLPx transport, DevP2P base protocol and the
//! LES session, all owned by a single task.

use std::time::Duration;

use ethkit_common::{H512, types::Node};
use futures::{Sink, SinkExt, Stream, StreamExt};
use secp256k1::{PublicKey, SECP256K1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
    time::{Instant, interval_at, sleep, timeout},
};

use crate::{
    devp2p::{
        DevP2PError, DevP2PPeer, DisconnectReason, HelloMessage, Incoming, SupportedCapability,
        capability::Capability,
    },
    les::{
        LES_CAPABILITY, LES_PROTOCOL_LENGTH, LES_PROTOCOL_VERSION, LesError, LesMessage,
        LesSession, PeerEvent, Requester, Task,
    },
    rlpx::{
        RLPxConnection,
        error::RLPxError,
        frame::Frame,
        utils::{log_peer_debug, log_peer_error, log_peer_warn, public_key_to_id},
    },
};

/// Where peers report to: the id of the reporting node plus the event.
pub type PeerEvents = UnboundedSender<(H512, PeerEvent)>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Client id announced in Hello.
    pub client_id: String,
    /// TCP port announced in Hello.
    pub listen_port: u16,
    pub ping_interval_secs: u64,
    /// Deadline for the TCP connect plus the RLPx handshake, and again for the remote Hello.
    pub handshake_timeout_secs: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            client_id: "ethkit".to_owned(),
            listen_port: 30303,
            ping_interval_secs: 15,
            handshake_timeout_secs: 10,
        }
    }
}

impl PeerConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    RLPx(#[from] RLPxError),
    #[error(transparent)]
    DevP2P(#[from] DevP2PError),
    #[error(transparent)]
    Les(#[from] LesError),
    #[error("Connection closed by peer")]
    ConnectionClosed,
    #[error("Peer task has stopped")]
    PeerGone,
    #[error("Handshake timed out")]
    HandshakeTimeout,
}

impl PeerError {
    /// Reason sent to the remote when this error ends the connection, if one is sent.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            PeerError::DevP2P(err) => err.disconnect_reason(),
            PeerError::Les(LesError::Validation(_)) => Some(DisconnectReason::UselessPeer),
            PeerError::Les(_) => Some(DisconnectReason::SubprotocolError),
            PeerError::HandshakeTimeout => Some(DisconnectReason::Timeout),
            PeerError::RLPx(_) | PeerError::ConnectionClosed | PeerError::PeerGone => None,
        }
    }
}

/// Handle to a running peer task. Dropping it disconnects the peer.
#[derive(Debug)]
pub struct PeerHandle {
    node: Node,
    tasks: UnboundedSender<Task>,
    join: JoinHandle<()>,
}

impl PeerHandle {
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Queues a task. Tasks added before the DevP2P handshake completes are performed
    /// once it does.
    pub fn add(&self, task: Task) -> Result<(), PeerError> {
        self.tasks.send(task).map_err(|_| PeerError::PeerGone)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Capabilities the light client speaks.
pub fn supported_capabilities() -> Vec<SupportedCapability> {
    vec![SupportedCapability::new(
        LES_CAPABILITY,
        LES_PROTOCOL_VERSION,
        LES_PROTOCOL_LENGTH,
    )]
}

/// Connects to `node` in a new task. Every event, ending with
/// [`PeerEvent::Disconnected`], is sent to `events`.
pub fn spawn_peer(
    identity: SecretKey,
    node: Node,
    session: LesSession,
    config: PeerConfig,
    events: PeerEvents,
) -> PeerHandle {
    let (tasks, mut task_receiver) = unbounded_channel();
    let peer_node = node.clone();

    let join = tokio::spawn(async move {
        let connect = timeout(
            config.handshake_timeout(),
            RLPxConnection::connect(&identity, &peer_node),
        );
        let result = match connect.await {
            Ok(Ok(framed)) => {
                let (sink, stream) = framed.split();
                let local_id = public_key_to_id(&PublicKey::from_secret_key(SECP256K1, &identity));
                let mut connection = PeerConnection::new(
                    peer_node.clone(),
                    local_id,
                    &config,
                    session,
                    sink,
                    stream,
                    events.clone(),
                );
                connection.run(&mut task_receiver).await
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(PeerError::HandshakeTimeout),
        };

        let reason = match result {
            Ok(()) => DisconnectReason::DisconnectRequested.to_string(),
            Err(err @ (PeerError::RLPx(RLPxError::CryptographyError(_)) | PeerError::Les(_))) => {
                log_peer_error(&peer_node, &format!("Connection failed: {err}"));
                err.to_string()
            }
            Err(err) => {
                log_peer_debug(&peer_node, &format!("Connection ended: {err}"));
                err.to_string()
            }
        };
        let _ = events.send((peer_node.id, PeerEvent::Disconnected(reason)));
    });

    PeerHandle { node, tasks, join }
}

/// Collects what the session sends during one dispatch, so frames are written once the
/// session lets go of its borrows.
struct Outbox<'a> {
    devp2p: &'a DevP2PPeer,
    events: &'a PeerEvents,
    frames: Vec<Frame>,
}

impl<'a> Outbox<'a> {
    fn new(devp2p: &'a DevP2PPeer, events: &'a PeerEvents) -> Self {
        Self {
            devp2p,
            events,
            frames: Vec::new(),
        }
    }
}

impl Requester for Outbox<'_> {
    fn peer_id(&self) -> H512 {
        self.devp2p.node().id
    }

    fn send(&mut self, message: LesMessage) -> Result<(), LesError> {
        let payload = message.encode_to_vec()?;
        if let Some(frame) = self
            .devp2p
            .frame_for(LES_CAPABILITY, message.code(), payload)
        {
            log_peer_debug(self.devp2p.node(), &format!(">>> {message}"));
            self.frames.push(frame);
        }
        Ok(())
    }

    fn notify(&mut self, event: PeerEvent) {
        // Nobody listening anymore means the orchestrator is shutting down
        let _ = self.events.send((self.peer_id(), event));
    }
}

struct PeerConnection<S, R> {
    devp2p: DevP2PPeer,
    session: LesSession,
    sink: S,
    stream: R,
    events: PeerEvents,
    ping_interval: Duration,
    hello_timeout: Duration,
}

impl<S, R> PeerConnection<S, R>
where
    S: Sink<Frame, Error = RLPxError> + Unpin,
    R: Stream<Item = Result<Frame, RLPxError>> + Unpin,
{
    fn new(
        node: Node,
        local_id: H512,
        config: &PeerConfig,
        session: LesSession,
        sink: S,
        stream: R,
        events: PeerEvents,
    ) -> Self {
        let supported = supported_capabilities();
        let capabilities: Vec<Capability> = supported
            .iter()
            .map(|supported| supported.capability.clone())
            .collect();
        let hello = HelloMessage::new(
            config.client_id.clone(),
            capabilities,
            config.listen_port,
            local_id,
        );
        Self {
            devp2p: DevP2PPeer::new(node, hello, supported),
            session,
            sink,
            stream,
            events,
            ping_interval: config.ping_interval(),
            hello_timeout: config.handshake_timeout(),
        }
    }

    /// Runs until the remote leaves, an error occurs or `tasks` is closed. Local
    /// endings are announced to the remote with a Disconnect.
    async fn run(&mut self, tasks: &mut UnboundedReceiver<Task>) -> Result<(), PeerError> {
        let result = self.connection_loop(tasks).await;
        let reason = match &result {
            Ok(()) => Some(DisconnectReason::DisconnectRequested),
            Err(err) => err.disconnect_reason(),
        };
        if let Some(reason) = reason {
            self.send_disconnect(reason).await;
        }
        result
    }

    /// Tasks received before the remote Hello are held back until it arrives.
    async fn connection_loop(
        &mut self,
        tasks: &mut UnboundedReceiver<Task>,
    ) -> Result<(), PeerError> {
        let hello = self.devp2p.hello_frame()?;
        self.sink.send(hello).await?;

        let hello_deadline = sleep(self.hello_timeout);
        tokio::pin!(hello_deadline);
        let mut queued = Vec::new();
        let mut ping = interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        loop {
            tokio::select! {
                frame = self.stream.next() => match frame {
                    Some(frame) => {
                        self.handle_frame(frame?).await?;
                        if self.devp2p.is_connected() {
                            for task in std::mem::take(&mut queued) {
                                self.perform(task).await?;
                            }
                        }
                    }
                    None => return Err(PeerError::ConnectionClosed),
                },
                task = tasks.recv() => match task {
                    Some(task) if self.devp2p.is_connected() => self.perform(task).await?,
                    Some(task) => queued.push(task),
                    None => return Ok(()),
                },
                _ = &mut hello_deadline, if !self.devp2p.is_connected() => {
                    return Err(PeerError::HandshakeTimeout);
                }
                _ = ping.tick(), if self.devp2p.is_connected() => {
                    let frame = self.devp2p.ping_frame()?;
                    self.sink.send(frame).await?;
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), PeerError> {
        match self.devp2p.handle_frame(frame)? {
            Incoming::Connected => {
                log_peer_debug(
                    self.devp2p.node(),
                    &format!(
                        "Connected to {}",
                        self.devp2p.remote_client_id().unwrap_or_default()
                    ),
                );
                let _ = self
                    .events
                    .send((self.devp2p.node().id, PeerEvent::Connected));
            }
            Incoming::Reply(frame) => self.sink.send(frame).await?,
            Incoming::Ignored => {}
            Incoming::Subprotocol {
                capability,
                code,
                payload,
            } => {
                if capability.name != LES_CAPABILITY {
                    return Ok(());
                }
                let message = match LesMessage::decode(code, &payload) {
                    Ok(message) => message,
                    Err(LesError::RLPDecodeError(err)) => {
                        log_peer_warn(
                            self.devp2p.node(),
                            &format!("Dropping les message {code:#04x}: {err}"),
                        );
                        return Ok(());
                    }
                    Err(err) => return Err(err.into()),
                };
                log_peer_debug(self.devp2p.node(), &format!("<<< {message}"));

                let frames = {
                    let mut outbox = Outbox::new(&self.devp2p, &self.events);
                    self.session.handle(message, &mut outbox)?;
                    outbox.frames
                };
                self.flush(frames).await?;
            }
        }
        Ok(())
    }

    async fn perform(&mut self, task: Task) -> Result<(), PeerError> {
        log_peer_debug(self.devp2p.node(), &format!("Performing {} task", task.name()));
        let frames = {
            let mut outbox = Outbox::new(&self.devp2p, &self.events);
            self.session.add(task, &mut outbox)?;
            outbox.frames
        };
        self.flush(frames).await
    }

    async fn flush(&mut self, frames: Vec<Frame>) -> Result<(), PeerError> {
        for frame in frames {
            self.sink.send(frame).await?;
        }
        Ok(())
    }

    async fn send_disconnect(&mut self, reason: DisconnectReason) {
        let frame = match self.devp2p.disconnect_frame(reason) {
            Ok(frame) => frame,
            Err(err) => {
                log_peer_debug(
                    self.devp2p.node(),
                    &format!("Could not build Disconnect message: {err}"),
                );
                return;
            }
        };
        if let Err(err) = self.sink.send(frame).await {
            log_peer_debug(
                self.devp2p.node(),
                &format!("Could not send Disconnect message ({reason}): {err}"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use ethkit_common::{H256, U256, types::BlockHeader};
    use futures::channel::mpsc as futures_mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::{
        devp2p::message::{DevP2PMessage, DisconnectMessage, PingMessage},
        les::{ValidationError, status::StatusMessage},
    };

    const LES_OFFSET: u8 = 0x10;

    struct Remote {
        frames: UnboundedSender<Frame>,
        sent: futures_mpsc::UnboundedReceiver<Frame>,
        tasks: UnboundedSender<Task>,
        events: UnboundedReceiver<(H512, PeerEvent)>,
        join: JoinHandle<Result<(), PeerError>>,
    }

    impl Remote {
        fn node() -> Node {
            Node::new(H512::repeat_byte(0x22), Ipv4Addr::LOCALHOST, 30303, 30303)
        }

        fn start() -> Self {
            Self::start_with(PeerConfig {
                ping_interval_secs: 60,
                ..Default::default()
            })
        }

        fn start_with(config: PeerConfig) -> Self {
            let (frames, frame_receiver) = unbounded_channel::<Frame>();
            let (sink, sent) = futures_mpsc::unbounded::<Frame>();
            let (tasks, mut task_receiver) = unbounded_channel();
            let (event_sender, events) = unbounded_channel();

            let mut connection = PeerConnection::new(
                Self::node(),
                H512::repeat_byte(0x11),
                &config,
                LesSession::default(),
                sink.sink_map_err(|_| RLPxError::Disconnected),
                UnboundedReceiverStream::new(frame_receiver).map(Ok::<Frame, RLPxError>),
                event_sender,
            );
            let join = tokio::spawn(async move { connection.run(&mut task_receiver).await });
            Self {
                frames,
                sent,
                tasks,
                events,
                join,
            }
        }

        fn send_base(&self, message: DevP2PMessage) {
            let mut payload: Vec<u8> = vec![];
            message.encode(&mut payload).unwrap();
            self.frames.send(Frame::new(message.code(), payload)).unwrap();
        }

        fn send_les(&self, message: LesMessage) {
            let payload = message.encode_to_vec().unwrap();
            self.frames
                .send(Frame::new(LES_OFFSET + message.code(), payload))
                .unwrap();
        }

        async fn next_sent(&mut self) -> Frame {
            self.sent.next().await.unwrap()
        }

        async fn next_event(&mut self) -> PeerEvent {
            let (id, event) = self.events.recv().await.unwrap();
            assert_eq!(id, Self::node().id);
            event
        }

        /// Answers our Hello so the connection is up.
        async fn connect(&mut self) {
            assert_eq!(self.next_sent().await.code, 0x00);
            let capabilities = vec![Capability::new("les", 2)];
            self.send_base(DevP2PMessage::Hello(HelloMessage::new(
                "remote".to_owned(),
                capabilities,
                30303,
                Self::node().id,
            )));
            assert_eq!(self.next_event().await, PeerEvent::Connected);
        }
    }

    fn genesis() -> H256 {
        H256::repeat_byte(0xd4)
    }

    #[tokio::test]
    async fn tasks_wait_for_hello_then_run() {
        let mut remote = Remote::start();
        let head = BlockHeader::checkpoint(100, H256::repeat_byte(0x01), U256::from(5u64));
        remote
            .tasks
            .send(Task::Handshake {
                network_id: 1,
                genesis_hash: genesis(),
                head,
            })
            .unwrap();
        remote.connect().await;

        let status = remote.next_sent().await;
        assert_eq!(status.code, LES_OFFSET);
        assert!(matches!(
            LesMessage::decode(0x00, &status.payload).unwrap(),
            LesMessage::Status(StatusMessage { head_number: 100, .. })
        ));

        let remote_head = BlockHeader::checkpoint(120, H256::repeat_byte(0x02), U256::from(9u64));
        remote.send_les(LesMessage::Status(StatusMessage::new(1, genesis(), &remote_head)));
        assert_eq!(
            remote.next_event().await,
            PeerEvent::HandshakeCompleted {
                head_hash: H256::repeat_byte(0x02),
                head_number: 120,
                head_td: U256::from(9u64),
            }
        );
    }

    #[tokio::test]
    async fn ping_is_answered_and_garbage_skipped() {
        let mut remote = Remote::start();
        remote.connect().await;

        remote
            .frames
            .send(Frame::new(LES_OFFSET + 0x15, vec![0xff]))
            .unwrap();
        remote.send_base(DevP2PMessage::Ping(PingMessage));
        assert_eq!(remote.next_sent().await.code, 0x03);
    }

    #[tokio::test]
    async fn remote_disconnect_ends_the_connection() {
        let mut remote = Remote::start();
        remote.connect().await;
        remote.send_base(DevP2PMessage::Disconnect(DisconnectMessage {
            reason: DisconnectReason::TooManyPeers,
        }));

        let result = remote.join.await.unwrap();
        assert!(matches!(
            result,
            Err(PeerError::DevP2P(DevP2PError::DisconnectMessageReceived(
                DisconnectReason::TooManyPeers
            )))
        ));
        // Hello only, no Disconnect echoed back
        assert!(remote.sent.try_next().unwrap().is_none());
    }

    #[tokio::test]
    async fn closing_the_task_queue_disconnects() {
        let mut remote = Remote::start();
        remote.connect().await;
        let Remote {
            tasks,
            join,
            mut sent,
            frames: _frames,
            ..
        } = remote;
        drop(tasks);

        assert!(join.await.unwrap().is_ok());
        let disconnect = sent.next().await.unwrap();
        assert_eq!(disconnect.code, 0x01);
        assert_eq!(
            DevP2PMessage::decode(disconnect.code, &disconnect.payload).unwrap(),
            DevP2PMessage::Disconnect(DisconnectMessage {
                reason: DisconnectReason::DisconnectRequested
            })
        );
    }

    #[tokio::test]
    async fn silent_remote_times_out_before_hello() {
        let mut remote = Remote::start_with(PeerConfig {
            ping_interval_secs: 60,
            handshake_timeout_secs: 1,
            ..Default::default()
        });
        assert_eq!(remote.next_sent().await.code, 0x00);

        let result = tokio::time::timeout(Duration::from_secs(5), &mut remote.join)
            .await
            .expect("connection should give up waiting for Hello")
            .unwrap();
        assert!(matches!(result, Err(PeerError::HandshakeTimeout)));

        let disconnect = remote.next_sent().await;
        assert_eq!(
            DevP2PMessage::decode(disconnect.code, &disconnect.payload).unwrap(),
            DevP2PMessage::Disconnect(DisconnectMessage {
                reason: DisconnectReason::Timeout
            })
        );
    }

    #[tokio::test]
    async fn dropped_handle_before_hello_ends_the_connection() {
        let Remote {
            tasks,
            join,
            frames: _frames,
            sent: _sent,
            ..
        } = Remote::start();
        tasks
            .send(Task::Handshake {
                network_id: 1,
                genesis_hash: genesis(),
                head: BlockHeader::checkpoint(1, H256::repeat_byte(0x01), U256::zero()),
            })
            .unwrap();
        drop(tasks);

        let result = tokio::time::timeout(Duration::from_secs(5), join)
            .await
            .expect("connection should end once its handle is gone")
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn disconnect_reasons_follow_the_error() {
        let wrong_chain = PeerError::Les(LesError::Validation(
            ValidationError::ExpiredBestBlockHeight {
                local: 10,
                remote: 5,
            },
        ));
        assert_eq!(
            wrong_chain.disconnect_reason(),
            Some(DisconnectReason::UselessPeer)
        );
        assert_eq!(
            PeerError::Les(LesError::NoStatus).disconnect_reason(),
            Some(DisconnectReason::SubprotocolError)
        );
        assert_eq!(PeerError::ConnectionClosed.disconnect_reason(), None);
        assert_eq!(
            PeerError::HandshakeTimeout.disconnect_reason(),
            Some(DisconnectReason::Timeout)
        );
    }
}
