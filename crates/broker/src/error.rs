//! # error
//!
//! why: give callers of the broker one error vocabulary regardless of which layer failed
//! relations: CoordinatorError crosses the forward rpc, BrokerError wraps it for the log api
//! what: CoordinatorError, BrokerError, BrokerResult

use raft_core::NodeId;
use raft_storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the consensus layer. Serializable so a forwarded proposal
/// returns the leader's verdict unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinatorError {
    #[error("not the leader (leader hint: {leader_hint:?})")]
    NotLeader { leader_hint: Option<NodeId> },

    #[error("no leader is currently available")]
    NoLeaderAvailable,

    #[error("timed out waiting for {operation}")]
    Timeout { operation: String },

    /// Applying a committed entry broke a replicated-state invariant.
    /// The coordinator halts after reporting this.
    #[error("replicated log conflict: {reason}")]
    LogConflict { reason: String },

    #[error("durable storage failed: {reason}")]
    Storage { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },

    #[error("coordinator is shut down")]
    Shutdown,
}

impl CoordinatorError {
    /// `NotLeader` when a leader is known, `NoLeaderAvailable` otherwise.
    pub fn not_leader(leader_hint: Option<NodeId>) -> Self {
        match leader_hint {
            Some(_) => Self::NotLeader { leader_hint },
            None => Self::NoLeaderAvailable,
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotLeader { .. } | Self::NoLeaderAvailable | Self::Timeout { .. }
        )
    }
}

impl From<StorageError> for CoordinatorError {
    fn from(err: StorageError) -> Self {
        Self::Storage {
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("blob store error: {0}")]
    Blob(String),
}

impl BrokerError {
    pub fn topic_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "topic",
            id: id.to_string(),
        }
    }

    pub fn group_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "consumer group",
            id: id.to_string(),
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
