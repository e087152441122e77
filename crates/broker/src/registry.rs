//! Topic and consumer-group lookup. Provisioning lives outside the broker;
//! the broker only asks whether a record exists.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{BrokerError, BrokerResult};
use crate::model::{ConsumerGroup, Topic};

#[async_trait]
pub trait TopicRegistry: Send + Sync {
    /// Fails `NotFound` for an unknown topic.
    async fn get_topic(&self, topic_id: &str) -> BrokerResult<Topic>;

    /// Fails `NotFound` for an unknown group.
    async fn get_consumer_group(&self, group_id: &str) -> BrokerResult<ConsumerGroup>;
}

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    topics: RwLock<HashMap<String, Topic>>,
    groups: RwLock<HashMap<String, ConsumerGroup>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_topic(&self, topic: Topic) {
        self.topics.write().insert(topic.topic_id.clone(), topic);
    }

    pub fn delete_topic(&self, topic_id: &str) -> bool {
        self.topics.write().remove(topic_id).is_some()
    }

    pub fn create_consumer_group(&self, group: ConsumerGroup) {
        self.groups.write().insert(group.group_id.clone(), group);
    }
}

#[async_trait]
impl TopicRegistry for InMemoryRegistry {
    async fn get_topic(&self, topic_id: &str) -> BrokerResult<Topic> {
        self.topics
            .read()
            .get(topic_id)
            .cloned()
            .ok_or_else(|| BrokerError::topic_not_found(topic_id))
    }

    async fn get_consumer_group(&self, group_id: &str) -> BrokerResult<ConsumerGroup> {
        self.groups
            .read()
            .get(group_id)
            .cloned()
            .ok_or_else(|| BrokerError::group_not_found(group_id))
    }
}
