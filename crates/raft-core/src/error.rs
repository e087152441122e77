//! # error
//!
//! why: report state that cannot be turned into a valid raft node
//! relations: returned when restoring a node from raft-storage
//! what: RaftError

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RaftError {
    #[error("persisted log is not contiguous: expected index {expected}, found {found}")]
    LogGap { expected: u64, found: u64 },
}
