use crate::les::{
    error::LesError,
    message::LesMessage,
    session::{Handler, Requester},
    task::{PeerEvent, Task},
};

/// Forwards new head announces. Performs no tasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnnounceHandler;

impl Handler for AnnounceHandler {
    fn perform(
        &mut self,
        task: Task,
        _requester: &mut dyn Requester,
    ) -> Result<Option<Task>, LesError> {
        Ok(Some(task))
    }

    fn handle(
        &mut self,
        message: LesMessage,
        requester: &mut dyn Requester,
    ) -> Result<Option<LesMessage>, LesError> {
        let LesMessage::Announce(announce) = message else {
            return Ok(Some(message));
        };
        requester.notify(PeerEvent::BlockAnnounced {
            hash: announce.block_hash,
            number: announce.block_number,
            total_difficulty: announce.total_difficulty,
        });
        Ok(None)
    }
}
