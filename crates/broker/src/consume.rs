//! # consume
//!
//! why: give consumer groups long-poll delivery on top of the topic log
//! relations: reads through TopicLog, records progress in OffsetStore, checks the TopicRegistry
//! what: ConsumeRequest, ConsumeResponse, ConsumeCoordinator
//!
//! Delivery is at-least-once. The cursor moves before the response reaches
//! the caller, and consumers sharing a group are not excluded from each
//! other: both may receive the same batch.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};
use crate::model::Message;
use crate::offsets::OffsetStore;
use crate::registry::TopicRegistry;
use crate::topic_log::TopicLog;

pub const DEFAULT_MAX_MESSAGES: u32 = 10;
pub const MAX_MESSAGES_LIMIT: u32 = 100;
pub const MAX_WAIT_TIME: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub topic_id: String,
    pub group_id: String,
    /// 1..=100
    pub max_messages: u32,
    /// How long to wait for a message when none is pending; at most 20s.
    pub wait_time: Duration,
}

impl ConsumeRequest {
    pub fn new(topic_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            group_id: group_id.into(),
            max_messages: DEFAULT_MAX_MESSAGES,
            wait_time: Duration::ZERO,
        }
    }

    pub fn with_max_messages(mut self, max_messages: u32) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    fn validate(&self) -> BrokerResult<()> {
        if !(1..=MAX_MESSAGES_LIMIT).contains(&self.max_messages) {
            return Err(BrokerError::InvalidArgument(format!(
                "maxMessages must be between 1 and {MAX_MESSAGES_LIMIT}, got {}",
                self.max_messages
            )));
        }
        if self.wait_time > MAX_WAIT_TIME {
            return Err(BrokerError::InvalidArgument(format!(
                "waitTimeSeconds must be at most {}, got {}",
                MAX_WAIT_TIME.as_secs(),
                self.wait_time.as_secs_f64()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    pub messages: Vec<Message>,
    /// One past the last delivered sequence, or the unchanged cursor if
    /// nothing was delivered.
    pub next_sequence_number: u64,
}

#[derive(Clone)]
pub struct ConsumeCoordinator {
    topics: TopicLog,
    offsets: OffsetStore,
    registry: Arc<dyn TopicRegistry>,
    poll_interval: Duration,
}

impl ConsumeCoordinator {
    pub fn new(
        topics: TopicLog,
        offsets: OffsetStore,
        registry: Arc<dyn TopicRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            topics,
            offsets,
            registry,
            poll_interval,
        }
    }

    pub async fn consume(&self, request: ConsumeRequest) -> BrokerResult<ConsumeResponse> {
        request.validate()?;
        let topic_id = request.topic_id.as_str();
        let group_id = request.group_id.as_str();
        self.registry.get_topic(topic_id).await?;
        self.registry.get_consumer_group(group_id).await?;

        self.topics.read_barrier().await?;
        let from = self
            .offsets
            .get_offset(group_id, topic_id)
            .map_or(0, |o| o.last_sequence_number);
        let limit = request.max_messages as usize;
        debug!(topic_id, group_id, from, limit, "consume started");

        let deadline = Instant::now() + request.wait_time;
        let mut messages = self.topics.read_applied(topic_id, from, limit);
        while messages.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(topic_id, group_id, from, "consume finished empty");
                return Ok(ConsumeResponse {
                    messages,
                    next_sequence_number: from,
                });
            }
            time::sleep(self.poll_interval.min(remaining)).await;
            messages = self.topics.get_messages(topic_id, from, limit).await?;
        }

        let last = messages
            .last()
            .map_or(from, |m| m.sequence_number);
        self.offsets.advance(group_id, topic_id, last).await?;
        debug!(topic_id, group_id, delivered = messages.len(), last, "consume delivered");

        Ok(ConsumeResponse {
            messages,
            next_sequence_number: last + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol() {
        let request = ConsumeRequest::new("t", "g");
        assert_eq!(request.max_messages, 10);
        assert_eq!(request.wait_time, Duration::ZERO);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(ConsumeRequest::new("t", "g").with_max_messages(1).validate().is_ok());
        assert!(ConsumeRequest::new("t", "g").with_max_messages(100).validate().is_ok());
        assert!(ConsumeRequest::new("t", "g")
            .with_wait_time(Duration::from_secs(20))
            .validate()
            .is_ok());
    }

    #[test]
    fn out_of_range_arguments_are_rejected() {
        for request in [
            ConsumeRequest::new("t", "g").with_max_messages(0),
            ConsumeRequest::new("t", "g").with_max_messages(101),
            ConsumeRequest::new("t", "g").with_wait_time(Duration::from_secs(21)),
        ] {
            assert!(matches!(request.validate(), Err(BrokerError::InvalidArgument(_))));
        }
    }
}
