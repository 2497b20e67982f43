use ethkit_common::{Address, Bytes, types::BlockHeader};
use ethkit_trie::verify_account_proof;
use keccak_hash::keccak;

use crate::les::{
    error::LesError,
    message::{GetProofsMessage, LesMessage, ProofRequest},
    session::{Handler, PendingRequests, Requester, take_pending},
    task::{PeerEvent, Task},
};

#[derive(Debug, Clone)]
struct AccountRequest {
    address: Address,
    block_header: BlockHeader,
}

/// Fetches account proofs and only reports states the proof verifies against the
/// requested header's state root.
#[derive(Debug, Default)]
pub struct AccountStateHandler {
    pending: PendingRequests<AccountRequest>,
}

impl Handler for AccountStateHandler {
    fn perform(
        &mut self,
        task: Task,
        requester: &mut dyn Requester,
    ) -> Result<Option<Task>, LesError> {
        let Task::AccountState {
            address,
            block_header,
        } = task
        else {
            return Ok(Some(task));
        };

        let block_hash = block_header.hash();
        let request_id = self.pending.insert(AccountRequest {
            address,
            block_header,
        });
        let message = LesMessage::GetProofs(GetProofsMessage {
            request_id,
            requests: vec![ProofRequest {
                block_hash,
                account_key: Bytes::new(),
                key: keccak(address),
                from_level: 0,
            }],
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
        let LesMessage::Proofs(response) = message else {
            return Ok(Some(message));
        };
        let Some(request) = take_pending(&mut self.pending, response.request_id, "Proofs") else {
            return Ok(None);
        };

        let state = verify_account_proof(
            request.address,
            request.block_header.state_root,
            &response.nodes,
        )?;
        requester.notify(PeerEvent::AccountStateReceived(state));
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use ethkit_common::{H256, U256, types::AccountState};
    use ethkit_rlp::{encode::RLPEncode, structs::Encoder};
    use ethkit_trie::{Nibbles, ProofError};

    use super::*;
    use crate::les::{message::ProofsMessage, session::tests::TestRequester};

    /// Single leaf trie holding `state`: the leaf is the root.
    fn leaf_proof(state: &AccountState) -> (H256, Bytes) {
        let path = Nibbles::from_bytes(keccak(state.address).as_bytes());
        let value = (
            state.nonce,
            state.balance,
            state.storage_root,
            state.code_hash,
        )
            .encode_to_vec();
        let mut leaf: Vec<u8> = vec![];
        Encoder::new(&mut leaf)
            .encode_bytes(&path.encode_compact(true))
            .encode_bytes(&value)
            .finish();
        (keccak(&leaf), Bytes::from(leaf))
    }

    fn request(
        handler: &mut AccountStateHandler,
        requester: &mut TestRequester,
        address: Address,
        state_root: H256,
    ) -> u64 {
        let block_header = BlockHeader {
            number: 5,
            state_root,
            ..Default::default()
        };
        handler
            .perform(
                Task::AccountState {
                    address,
                    block_header,
                },
                requester,
            )
            .unwrap();
        match requester.sent.last() {
            Some(LesMessage::GetProofs(message)) => {
                assert_eq!(message.requests[0].key, keccak(address));
                message.request_id
            }
            other => panic!("expected GetProofs, got {other:?}"),
        }
    }

    #[test]
    fn verified_state_is_reported() {
        let mut state = AccountState::empty(Address::repeat_byte(0x42));
        state.balance = U256::from(1_000_000u64);
        let (root, leaf) = leaf_proof(&state);

        let mut handler = AccountStateHandler::default();
        let mut requester = TestRequester::default();
        let request_id = request(&mut handler, &mut requester, state.address, root);

        let response = LesMessage::Proofs(ProofsMessage {
            request_id,
            buffer_value: 0,
            nodes: vec![leaf],
        });
        assert!(
            handler
                .handle(response.clone(), &mut requester)
                .unwrap()
                .is_none()
        );
        assert_eq!(requester.events, vec![PeerEvent::AccountStateReceived(state)]);

        // Already resolved
        assert!(handler.handle(response, &mut requester).unwrap().is_none());
        assert_eq!(requester.events.len(), 1);
    }

    #[test]
    fn proof_against_another_root_fails() {
        let state = AccountState::empty(Address::repeat_byte(0x42));
        let (_, leaf) = leaf_proof(&state);

        let mut handler = AccountStateHandler::default();
        let mut requester = TestRequester::default();
        let request_id = request(
            &mut handler,
            &mut requester,
            state.address,
            H256::repeat_byte(0x99),
        );

        let response = LesMessage::Proofs(ProofsMessage {
            request_id,
            buffer_value: 0,
            nodes: vec![leaf],
        });
        assert!(matches!(
            handler.handle(response, &mut requester),
            Err(LesError::Proof(ProofError::RootHashDoesNotMatchStateRoot))
        ));
        assert!(requester.events.is_empty());
    }
}
