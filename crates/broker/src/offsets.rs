//! Consumer-group cursors, replicated through the same log as the messages.

use tracing::debug;

use crate::coordinator::ClusterCoordinator;
use crate::error::BrokerResult;
use crate::model::ConsumerOffset;
use crate::state::{Applied, BrokerState, Proposal};
use crate::topic_log::unexpected;

#[derive(Clone)]
pub struct OffsetStore {
    coordinator: ClusterCoordinator<BrokerState>,
}

impl OffsetStore {
    pub fn new(coordinator: ClusterCoordinator<BrokerState>) -> Self {
        Self { coordinator }
    }

    /// The cursor as applied on this node; `None` before the first delivery.
    pub fn get_offset(&self, group_id: &str, topic_id: &str) -> Option<ConsumerOffset> {
        self.coordinator.read(|state| state.offset(group_id, topic_id))
    }

    /// Move the cursor forward to `sequence_number`. Never moves it back:
    /// a stale or duplicate advance leaves the stored cursor as it is.
    pub async fn advance(
        &self,
        group_id: &str,
        topic_id: &str,
        sequence_number: u64,
    ) -> BrokerResult<Option<ConsumerOffset>> {
        let current = self.get_offset(group_id, topic_id);
        if current
            .as_ref()
            .is_some_and(|c| sequence_number <= c.last_sequence_number)
            || (current.is_none() && sequence_number == 0)
        {
            debug!(group_id, topic_id, sequence_number, "offset already at or past target");
            return Ok(current);
        }

        let proposal = Proposal::AdvanceOffset {
            group_id: group_id.to_string(),
            topic_id: topic_id.to_string(),
            sequence_number,
        };
        match self.coordinator.propose(proposal).await? {
            Applied::OffsetAdvanced { offset } => {
                debug!(
                    group_id,
                    topic_id,
                    last_sequence_number = offset.last_sequence_number,
                    "advanced consumer offset"
                );
                Ok(Some(offset))
            }
            other => Err(unexpected(other)),
        }
    }
}
