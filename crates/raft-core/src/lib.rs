//! # raft-core
//!
//! why: implement the core raft consensus algorithm with no i/o of its own
//! relations: driven by seqlog-broker's cluster coordinator, persisted via raft-storage
//! what: role state machine, election logic, log management, rpc message types

pub mod error;
pub mod log;
pub mod message;
pub mod node;

pub use error::RaftError;
pub use log::{LogEntry, RaftLog};
pub use message::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
pub use node::{HardState, NodeState, RaftConfig, RaftNode, Ready};

/// Identifier of a node in the cluster.
pub type NodeId = u64;
