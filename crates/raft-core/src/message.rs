//! # message
//!
//! why: define the raft rpc payloads exchanged between nodes
//! relations: produced and consumed by node.rs, carried over http by the broker transport
//! what: VoteRequest, VoteResponse, AppendEntriesRequest, AppendEntriesResponse

use serde::{Deserialize, Serialize};

use crate::{LogEntry, NodeId};

/// Sent by a candidate to every peer when it starts an election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: NodeId,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

/// Answer to a [`VoteRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
    pub node_id: NodeId,
}

/// Replicate log entries; with no entries it is a heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: NodeId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

impl AppendEntriesRequest {
    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Answer to an [`AppendEntriesRequest`]
///
/// `match_index` is the last index known to be replicated when `success` is
/// true. `last_log_index` lets a leader skip back past a whole conflicting
/// suffix instead of probing one index per round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
    pub node_id: NodeId,
    #[serde(default)]
    pub match_index: u64,
    #[serde(default)]
    pub last_log_index: u64,
}
