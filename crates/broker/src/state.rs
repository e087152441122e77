//! # state
//!
//! why: hold the topic logs and consumer offsets every node rebuilds from the raft log
//! relations: implements coordinator::StateMachine; read by TopicLog and OffsetStore
//! what: Proposal, Command, Applied, BrokerState

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::{InvariantViolation, StateMachine};
use crate::model::{now_millis, ConsumerOffset, DraftMessage, Message};

/// What callers ask the leader to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Proposal {
    Append {
        topic_id: String,
        draft: DraftMessage,
    },
    AdvanceOffset {
        group_id: String,
        topic_id: String,
        sequence_number: u64,
    },
    PurgeExpired,
}

/// What actually enters the log, fully stamped by the leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Append { message: Message },
    AdvanceOffset { offset: ConsumerOffset },
    PurgeExpired { now: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Applied {
    Appended { message: Message },
    OffsetAdvanced { offset: ConsumerOffset },
    Purged { removed: usize },
}

#[derive(Debug, Default)]
struct TopicState {
    /// Highest sequence number ever assigned; never lowered by retention.
    high_water: u64,
    messages: BTreeMap<u64, Message>,
}

/// Topic logs and consumer offsets as of the last applied entry.
#[derive(Debug, Default)]
pub struct BrokerState {
    topics: HashMap<String, TopicState>,
    offsets: HashMap<(String, String), ConsumerOffset>,
}

impl BrokerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn high_water(&self, topic_id: &str) -> u64 {
        self.topics.get(topic_id).map_or(0, |t| t.high_water)
    }

    /// Up to `limit` messages with sequence number greater than `after`, ascending.
    pub fn messages_after(&self, topic_id: &str, after: u64, limit: usize) -> Vec<Message> {
        let Some(topic) = self.topics.get(topic_id) else {
            return Vec::new();
        };
        topic
            .messages
            .range(after.saturating_add(1)..)
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn message_count(&self, topic_id: &str) -> usize {
        self.topics.get(topic_id).map_or(0, |t| t.messages.len())
    }

    pub fn offset(&self, group_id: &str, topic_id: &str) -> Option<ConsumerOffset> {
        self.offsets
            .get(&(group_id.to_string(), topic_id.to_string()))
            .cloned()
    }

    /// Number of messages a purge at `now_ms` would remove.
    pub fn expired_count(&self, now_ms: i64) -> usize {
        self.topics
            .values()
            .flat_map(|t| t.messages.values())
            .filter(|m| m.is_expired(now_ms))
            .count()
    }

    fn next_sequence(&self, topic_id: &str, pending: &[Command]) -> u64 {
        let pending_max = pending
            .iter()
            .filter_map(|c| match c {
                Command::Append { message } if message.topic_id == topic_id => {
                    Some(message.sequence_number)
                }
                _ => None,
            })
            .max()
            .unwrap_or(0);
        self.high_water(topic_id).max(pending_max) + 1
    }

    fn apply_append(&mut self, message: Message) -> Result<Applied, InvariantViolation> {
        let topic = self.topics.entry(message.topic_id.clone()).or_default();
        let expected = topic.high_water + 1;
        if message.sequence_number != expected {
            return Err(InvariantViolation(format!(
                "topic '{}' expected sequence {} but log carries {}",
                message.topic_id, expected, message.sequence_number
            )));
        }
        topic.high_water = message.sequence_number;
        topic.messages.insert(message.sequence_number, message.clone());
        Ok(Applied::Appended { message })
    }

    fn apply_offset(&mut self, proposed: ConsumerOffset) -> Applied {
        let key = (proposed.group_id.clone(), proposed.topic_id.clone());
        let stored = self
            .offsets
            .entry(key)
            .and_modify(|current| {
                if proposed.last_sequence_number > current.last_sequence_number {
                    *current = proposed.clone();
                }
            })
            .or_insert_with(|| proposed.clone());
        Applied::OffsetAdvanced {
            offset: stored.clone(),
        }
    }

    fn apply_purge(&mut self, now: i64) -> Applied {
        let mut removed = 0;
        for topic in self.topics.values_mut() {
            let before = topic.messages.len();
            topic.messages.retain(|_, m| !m.is_expired(now));
            removed += before - topic.messages.len();
        }
        Applied::Purged { removed }
    }
}

/// Expiry stamp for a ttl; one past what `i64` millis can hold never expires.
fn expiry(now: i64, ttl_ms: Option<u64>) -> Option<i64> {
    let ttl = i64::try_from(ttl_ms?).ok()?;
    now.checked_add(ttl)
}

impl StateMachine for BrokerState {
    type Proposal = Proposal;
    type Command = Command;
    type Output = Applied;

    fn stamp(&self, proposal: Proposal, pending: &[Command]) -> Command {
        let now = now_millis();
        match proposal {
            Proposal::Append { topic_id, draft } => {
                let sequence_number = self.next_sequence(&topic_id, pending);
                Command::Append {
                    message: Message {
                        message_id: Uuid::new_v4().to_string(),
                        topic_id,
                        sequence_number,
                        timestamp: now,
                        payload_ref: draft.payload_ref,
                        size: draft.size,
                        metadata: draft.metadata,
                        expires_at: expiry(now, draft.ttl_ms),
                    },
                }
            }
            Proposal::AdvanceOffset {
                group_id,
                topic_id,
                sequence_number,
            } => Command::AdvanceOffset {
                offset: ConsumerOffset {
                    group_id,
                    topic_id,
                    last_sequence_number: sequence_number,
                    last_consumed_timestamp: now,
                },
            },
            Proposal::PurgeExpired => Command::PurgeExpired { now },
        }
    }

    fn apply(&mut self, _index: u64, command: Command) -> Result<Applied, InvariantViolation> {
        match command {
            Command::Append { message } => self.apply_append(message),
            Command::AdvanceOffset { offset } => Ok(self.apply_offset(offset)),
            Command::PurgeExpired { now } => Ok(self.apply_purge(now)),
        }
    }
}
