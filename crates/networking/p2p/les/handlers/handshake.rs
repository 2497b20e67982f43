use std::collections::HashMap;

use ethkit_common::{H256, H512};
use tracing::debug;

use crate::les::{
    error::{LesError, ValidationError},
    message::{LES_PROTOCOL_VERSION, LesMessage},
    session::{Handler, Requester},
    status::StatusMessage,
    task::{PeerEvent, Task},
};

/// What we told the peer about ourselves.
#[derive(Debug, Clone)]
struct LocalStatus {
    network_id: u64,
    genesis_hash: H256,
    head_number: u64,
}

/// Runs the Status exchange. There is at most one per peer, so it is keyed by peer id
/// rather than by request id.
#[derive(Debug, Default)]
pub struct HandshakeHandler {
    pending: HashMap<H512, LocalStatus>,
}

impl HandshakeHandler {
    fn validate(local: &LocalStatus, remote: &StatusMessage) -> Result<(), ValidationError> {
        if remote.protocol_version != LES_PROTOCOL_VERSION {
            return Err(ValidationError::InvalidProtocolVersion {
                expected: LES_PROTOCOL_VERSION,
                received: remote.protocol_version,
            });
        }
        if remote.network_id != local.network_id || remote.genesis_hash != local.genesis_hash {
            return Err(ValidationError::WrongNetwork {
                expected_network: local.network_id,
                expected_genesis: local.genesis_hash,
                network: remote.network_id,
                genesis: remote.genesis_hash,
            });
        }
        if remote.head_number < local.head_number {
            return Err(ValidationError::ExpiredBestBlockHeight {
                local: local.head_number,
                remote: remote.head_number,
            });
        }
        Ok(())
    }
}

impl Handler for HandshakeHandler {
    fn perform(
        &mut self,
        task: Task,
        requester: &mut dyn Requester,
    ) -> Result<Option<Task>, LesError> {
        let Task::Handshake {
            network_id,
            genesis_hash,
            head,
        } = task
        else {
            return Ok(Some(task));
        };

        requester.send(LesMessage::Status(StatusMessage::new(
            network_id,
            genesis_hash,
            &head,
        )))?;
        self.pending.insert(
            requester.peer_id(),
            LocalStatus {
                network_id,
                genesis_hash,
                head_number: head.number,
            },
        );
        Ok(None)
    }

    fn handle(
        &mut self,
        message: LesMessage,
        requester: &mut dyn Requester,
    ) -> Result<Option<LesMessage>, LesError> {
        let LesMessage::Status(status) = message else {
            return Ok(Some(message));
        };
        let Some(local) = self.pending.remove(&requester.peer_id()) else {
            debug!("Status received without a handshake in progress, ignoring");
            return Ok(None);
        };

        Self::validate(&local, &status)?;
        requester.notify(PeerEvent::HandshakeCompleted {
            head_hash: status.head_hash,
            head_number: status.head_number,
            head_td: status.head_td,
        });
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use ethkit_common::{U256, types::BlockHeader};

    use super::*;
    use crate::les::session::tests::TestRequester;

    const NETWORK: u64 = 1;

    fn genesis() -> H256 {
        H256::repeat_byte(0xd4)
    }

    fn start(handler: &mut HandshakeHandler, requester: &mut TestRequester) {
        let head = BlockHeader::checkpoint(100, H256::repeat_byte(0x01), U256::from(10u64));
        let task = Task::Handshake {
            network_id: NETWORK,
            genesis_hash: genesis(),
            head,
        };
        assert!(handler.perform(task, requester).unwrap().is_none());
    }

    fn remote_status(head_number: u64) -> StatusMessage {
        let head = BlockHeader::checkpoint(head_number, H256::repeat_byte(0x02), U256::from(20u64));
        StatusMessage::new(NETWORK, genesis(), &head)
    }

    #[test]
    fn status_is_sent_and_validated() {
        let mut handler = HandshakeHandler::default();
        let mut requester = TestRequester::default();
        start(&mut handler, &mut requester);

        let [LesMessage::Status(sent)] = requester.sent.as_slice() else {
            panic!("expected a status message");
        };
        assert_eq!(sent.head_number, 100);
        assert_eq!(sent.announce_type, Some(1));

        let claimed = handler
            .handle(LesMessage::Status(remote_status(120)), &mut requester)
            .unwrap();
        assert!(claimed.is_none());
        assert_eq!(
            requester.events,
            vec![PeerEvent::HandshakeCompleted {
                head_hash: H256::repeat_byte(0x02),
                head_number: 120,
                head_td: U256::from(20u64),
            }]
        );
    }

    #[test]
    fn checks_run_in_order() {
        let mut handler = HandshakeHandler::default();
        let mut requester = TestRequester::default();

        // Wrong version and network: the version is reported
        start(&mut handler, &mut requester);
        let mut status = remote_status(50);
        status.protocol_version = 3;
        status.network_id = 5;
        assert!(matches!(
            handler.handle(LesMessage::Status(status), &mut requester),
            Err(LesError::Validation(
                ValidationError::InvalidProtocolVersion { received: 3, .. }
            ))
        ));

        start(&mut handler, &mut requester);
        let mut status = remote_status(50);
        status.genesis_hash = H256::zero();
        assert!(matches!(
            handler.handle(LesMessage::Status(status), &mut requester),
            Err(LesError::Validation(ValidationError::WrongNetwork { .. }))
        ));

        start(&mut handler, &mut requester);
        assert!(matches!(
            handler.handle(LesMessage::Status(remote_status(50)), &mut requester),
            Err(LesError::Validation(
                ValidationError::ExpiredBestBlockHeight {
                    local: 100,
                    remote: 50
                }
            ))
        ));
        assert!(requester.events.is_empty());
    }

    #[test]
    fn status_without_handshake_is_swallowed() {
        let mut handler = HandshakeHandler::default();
        let mut requester = TestRequester::default();
        let claimed = handler
            .handle(LesMessage::Status(remote_status(10)), &mut requester)
            .unwrap();
        assert!(claimed.is_none());
        assert!(requester.events.is_empty());
    }

    #[test]
    fn other_tasks_are_handed_back() {
        let mut handler = HandshakeHandler::default();
        let mut requester = TestRequester::default();
        let task = Task::SendTransaction {
            send_id: 1,
            transaction: Default::default(),
        };
        assert_eq!(
            handler.perform(task.clone(), &mut requester).unwrap(),
            Some(task)
        );
    }
}
