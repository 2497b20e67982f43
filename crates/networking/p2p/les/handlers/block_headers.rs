use ethkit_common::types::BlockHeader;

use crate::les::{
    error::LesError,
    message::{GetBlockHeadersMessage, LesMessage},
    session::{Handler, PendingRequests, Requester, take_pending},
    task::{PeerEvent, Task},
};

#[derive(Debug, Clone)]
struct HeadersRequest {
    block_header: BlockHeader,
    reverse: bool,
}

#[derive(Debug, Default)]
pub struct BlockHeadersHandler {
    pending: PendingRequests<HeadersRequest>,
}

impl Handler for BlockHeadersHandler {
    fn perform(
        &mut self,
        task: Task,
        requester: &mut dyn Requester,
    ) -> Result<Option<Task>, LesError> {
        let Task::BlockHeaders {
            block_header,
            limit,
            reverse,
        } = task
        else {
            return Ok(Some(task));
        };

        let origin = block_header.number;
        let request_id = self.pending.insert(HeadersRequest {
            block_header,
            reverse,
        });
        let message = LesMessage::GetBlockHeaders(GetBlockHeadersMessage {
            request_id,
            origin,
            max_headers: limit,
            skip: 0,
            reverse,
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
        let LesMessage::BlockHeaders(response) = message else {
            return Ok(Some(message));
        };
        let Some(request) = take_pending(&mut self.pending, response.request_id, "BlockHeaders")
        else {
            return Ok(None);
        };

        requester.notify(PeerEvent::BlockHeadersReceived {
            block_header: request.block_header,
            headers: response.headers,
            reverse: request.reverse,
        });
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use ethkit_common::{H256, U256};

    use super::*;
    use crate::les::{message::BlockHeadersMessage, session::tests::TestRequester};

    fn header(number: u64) -> BlockHeader {
        BlockHeader {
            number,
            parent_hash: H256::from_low_u64_be(number),
            ..Default::default()
        }
    }

    #[test]
    fn response_resolves_the_request_once() {
        let mut handler = BlockHeadersHandler::default();
        let mut requester = TestRequester::default();
        let from = BlockHeader::checkpoint(10, H256::repeat_byte(0x0a), U256::zero());
        handler
            .perform(
                Task::BlockHeaders {
                    block_header: from.clone(),
                    limit: 3,
                    reverse: false,
                },
                &mut requester,
            )
            .unwrap();

        let [LesMessage::GetBlockHeaders(request)] = requester.sent.as_slice() else {
            panic!("expected a GetBlockHeaders request");
        };
        assert_eq!((request.origin, request.max_headers), (10, 3));
        let request_id = request.request_id;

        let response = LesMessage::BlockHeaders(BlockHeadersMessage {
            request_id,
            buffer_value: 0,
            headers: vec![header(10), header(11)],
        });
        assert!(
            handler
                .handle(response.clone(), &mut requester)
                .unwrap()
                .is_none()
        );
        // Duplicate response: claimed, but nothing to resolve
        assert!(handler.handle(response, &mut requester).unwrap().is_none());

        assert_eq!(
            requester.events,
            vec![PeerEvent::BlockHeadersReceived {
                block_header: from,
                headers: vec![header(10), header(11)],
                reverse: false,
            }]
        );
    }
}
