//! # topic_log
//!
//! why: hand out gap-free per-topic sequence numbers that every node agrees on
//! relations: proposes through ClusterCoordinator, reads BrokerState, stores payloads in a BlobStore
//! what: TopicLog with append, publish, get_messages, read_payload, purge_expired

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::config::ReadConsistency;
use crate::coordinator::ClusterCoordinator;
use crate::error::{BrokerResult, CoordinatorError};
use crate::model::{duration_millis, now_millis, DraftMessage, Message};
use crate::registry::TopicRegistry;
use crate::state::{Applied, BrokerState, Proposal};

#[derive(Clone)]
pub struct TopicLog {
    coordinator: ClusterCoordinator<BrokerState>,
    registry: Arc<dyn TopicRegistry>,
    blobs: Arc<dyn BlobStore>,
    read_consistency: ReadConsistency,
}

impl TopicLog {
    pub fn new(
        coordinator: ClusterCoordinator<BrokerState>,
        registry: Arc<dyn TopicRegistry>,
        blobs: Arc<dyn BlobStore>,
        read_consistency: ReadConsistency,
    ) -> Self {
        Self {
            coordinator,
            registry,
            blobs,
            read_consistency,
        }
    }

    /// Commit `draft` as the next message of `topic_id`. Returns only once a
    /// majority has stored it, with the sequence number the leader assigned.
    pub async fn append(&self, topic_id: &str, draft: DraftMessage) -> BrokerResult<Message> {
        self.registry.get_topic(topic_id).await?;
        self.propose_append(topic_id, draft).await
    }

    /// Store `payload` in the blob store and append a message referencing it.
    /// Expiry follows the topic's retention.
    pub async fn publish(
        &self,
        topic_id: &str,
        payload: Bytes,
        content_type: &str,
        metadata: BTreeMap<String, String>,
    ) -> BrokerResult<Message> {
        let topic = self.registry.get_topic(topic_id).await?;
        let key = format!("{topic_id}/{}", Uuid::new_v4());
        let size = payload.len() as u64;
        self.blobs.put(&key, payload, content_type).await?;

        let draft = DraftMessage {
            payload_ref: key,
            size,
            metadata,
            ttl_ms: topic.retention.map(duration_millis),
        };
        self.propose_append(topic_id, draft).await
    }

    async fn propose_append(&self, topic_id: &str, draft: DraftMessage) -> BrokerResult<Message> {
        let proposal = Proposal::Append {
            topic_id: topic_id.to_string(),
            draft,
        };
        match self.coordinator.propose(proposal).await? {
            Applied::Appended { message } => {
                debug!(
                    topic_id,
                    sequence_number = message.sequence_number,
                    "appended message"
                );
                Ok(message)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Messages of `topic_id` after `from_exclusive`, ascending, at most `limit`.
    pub async fn get_messages(
        &self,
        topic_id: &str,
        from_exclusive: u64,
        limit: usize,
    ) -> BrokerResult<Vec<Message>> {
        self.read_barrier().await?;
        Ok(self.read_applied(topic_id, from_exclusive, limit))
    }

    /// Same as `get_messages` without the barrier; the caller already passed one.
    pub(crate) fn read_applied(&self, topic_id: &str, from_exclusive: u64, limit: usize) -> Vec<Message> {
        self.coordinator
            .read(|state| state.messages_after(topic_id, from_exclusive, limit))
    }

    pub async fn read_payload(&self, message: &Message) -> BrokerResult<Bytes> {
        self.blobs.get(&message.payload_ref).await
    }

    /// Delete every message whose expiry has passed, on every node. Sequence
    /// numbers are never reused.
    pub async fn purge_expired(&self) -> BrokerResult<usize> {
        match self.coordinator.propose(Proposal::PurgeExpired).await? {
            Applied::Purged { removed } => {
                if removed > 0 {
                    info!(removed, "purged expired messages");
                }
                Ok(removed)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Whether a purge right now would remove anything on this node.
    pub fn has_expired(&self) -> bool {
        let now = now_millis();
        self.coordinator.read(|state| state.expired_count(now) > 0)
    }

    pub fn high_water(&self, topic_id: &str) -> u64 {
        self.coordinator.read(|state| state.high_water(topic_id))
    }

    pub fn is_leader(&self) -> bool {
        self.coordinator.is_leader()
    }

    pub(crate) async fn read_barrier(&self) -> Result<(), CoordinatorError> {
        match self.read_consistency {
            ReadConsistency::Linearizable => self.coordinator.read_barrier().await,
            ReadConsistency::Local => Ok(()),
        }
    }
}

pub(crate) fn unexpected(output: Applied) -> crate::error::BrokerError {
    CoordinatorError::internal(format!("unexpected apply output: {output:?}")).into()
}
