//! Records stored in the replicated log and the registry.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A committed message. Created once at apply time and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub topic_id: String,
    pub sequence_number: u64,
    /// Milliseconds since the unix epoch, stamped by the leader.
    pub timestamp: i64,
    /// Key of the payload in the blob store.
    pub payload_ref: String,
    pub size: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Message {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }
}

/// What a publisher hands to `TopicLog::append`; the leader fills in the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMessage {
    pub payload_ref: String,
    pub size: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Time to live from the moment the leader stamps the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

impl DraftMessage {
    pub fn new(payload_ref: impl Into<String>, size: u64) -> Self {
        Self {
            payload_ref: payload_ref.into(),
            size,
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(duration_millis(ttl));
        self
    }
}

/// Delivery cursor of one consumer group on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerOffset {
    pub group_id: String,
    pub topic_id: String,
    pub last_sequence_number: u64,
    pub last_consumed_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub topic_id: String,
    /// How long messages live after publish; `None` keeps them forever.
    pub retention: Option<Duration>,
}

impl Topic {
    pub fn new(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            retention: None,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroup {
    pub group_id: String,
}

impl ConsumerGroup {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
        }
    }
}

/// Wall-clock milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
