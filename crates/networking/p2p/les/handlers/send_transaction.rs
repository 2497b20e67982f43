use ethkit_common::H256;

use crate::les::{
    error::LesError,
    message::{LesMessage, SendTxMessage, TransactionStatus},
    session::{Handler, PendingRequests, Requester, take_pending},
    task::{PeerEvent, Task},
};

#[derive(Debug, Clone, Copy)]
struct SendRequest {
    send_id: u64,
    hash: H256,
}

/// Submits transactions and reports the status the peer answers with. Anything but an
/// error or an unknown status, including an empty answer, counts as sent.
#[derive(Debug, Default)]
pub struct SendTransactionHandler {
    pending: PendingRequests<SendRequest>,
}

impl Handler for SendTransactionHandler {
    fn perform(
        &mut self,
        task: Task,
        requester: &mut dyn Requester,
    ) -> Result<Option<Task>, LesError> {
        let Task::SendTransaction {
            send_id,
            transaction,
        } = task
        else {
            return Ok(Some(task));
        };

        let request_id = self.pending.insert(SendRequest {
            send_id,
            hash: transaction.hash(),
        });
        let message = LesMessage::SendTx(SendTxMessage {
            request_id,
            transactions: vec![transaction],
        });
        if let Err(err) = requester.send(message) {
            self.pending.remove(request_id);
            return Err(err);
        }
        Ok(None)
    }

    fn handle(
        &mut self,
        message: LesMessage,
        requester: &mut dyn Requester,
    ) -> Result<Option<LesMessage>, LesError> {
        let LesMessage::TxStatus(response) = message else {
            return Ok(Some(message));
        };
        let Some(request) = take_pending(&mut self.pending, response.request_id, "TxStatus")
        else {
            return Ok(None);
        };

        let event = match response.statuses.first() {
            Some(TransactionStatus::Error(error)) => PeerEvent::TransactionFailed {
                send_id: request.send_id,
                error: error.clone(),
            },
            Some(TransactionStatus::Unknown) => PeerEvent::TransactionFailed {
                send_id: request.send_id,
                error: "Transaction unknown to peer".to_owned(),
            },
            _ => PeerEvent::TransactionSent {
                send_id: request.send_id,
                hash: request.hash,
            },
        };
        requester.notify(event);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use ethkit_common::types::SignedTransaction;

    use super::*;
    use crate::les::{message::TxStatusMessage, session::tests::TestRequester};

    fn send(handler: &mut SendTransactionHandler, requester: &mut TestRequester) -> u64 {
        let transaction = SignedTransaction {
            nonce: 3,
            ..Default::default()
        };
        handler
            .perform(
                Task::SendTransaction {
                    send_id: 77,
                    transaction,
                },
                requester,
            )
            .unwrap();
        match requester.sent.last() {
            Some(LesMessage::SendTx(message)) => message.request_id,
            other => panic!("expected SendTx, got {other:?}"),
        }
    }

    fn status(request_id: u64, statuses: Vec<TransactionStatus>) -> LesMessage {
        LesMessage::TxStatus(TxStatusMessage {
            request_id,
            buffer_value: 0,
            statuses,
        })
    }

    #[test]
    fn queued_pending_and_empty_answers_are_success() {
        for statuses in [
            vec![TransactionStatus::Queued],
            vec![TransactionStatus::Pending],
            vec![],
        ] {
            let mut handler = SendTransactionHandler::default();
            let mut requester = TestRequester::default();
            let request_id = send(&mut handler, &mut requester);
            handler
                .handle(status(request_id, statuses), &mut requester)
                .unwrap();
            assert!(matches!(
                requester.events.as_slice(),
                [PeerEvent::TransactionSent { send_id: 77, .. }]
            ));
        }
    }

    #[test]
    fn error_and_unknown_are_failures() {
        for statuses in [
            vec![TransactionStatus::Error("underpriced".to_owned())],
            vec![TransactionStatus::Unknown],
        ] {
            let mut handler = SendTransactionHandler::default();
            let mut requester = TestRequester::default();
            let request_id = send(&mut handler, &mut requester);
            handler
                .handle(status(request_id, statuses), &mut requester)
                .unwrap();
            assert!(matches!(
                requester.events.as_slice(),
                [PeerEvent::TransactionFailed { send_id: 77, .. }]
            ));
        }
    }

    #[test]
    fn stale_status_is_swallowed() {
        let mut handler = SendTransactionHandler::default();
        let mut requester = TestRequester::default();
        let request_id = send(&mut handler, &mut requester);
        let claimed = handler
            .handle(
                status(request_id.wrapping_add(1), vec![]),
                &mut requester,
            )
            .unwrap();
        assert!(claimed.is_none());
        assert!(requester.events.is_empty());
    }
}
