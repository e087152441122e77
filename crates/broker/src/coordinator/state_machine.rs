//! # state_machine
//!
//! why: let the coordinator replicate any deterministic state without knowing its shape
//! relations: implemented by crate::state::BrokerState, driven by ClusterCoordinator
//! what: StateMachine trait, InvariantViolation

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Replicated state fed by committed log entries.
///
/// A caller submits a `Proposal`. The leader turns it into a concrete
/// `Command` with [`StateMachine::stamp`] (assigning ids, sequence numbers,
/// timestamps) and only that command enters the log, so every node applies
/// exactly the same bytes.
pub trait StateMachine: Send + Sync + 'static {
    type Proposal: Serialize + DeserializeOwned + Debug + Send + 'static;
    type Command: Serialize + DeserializeOwned + Debug + Send + 'static;
    type Output: Serialize + DeserializeOwned + Debug + Send + 'static;

    /// Leader only. `pending` holds the commands appended to the log but not
    /// yet applied, oldest first.
    fn stamp(&self, proposal: Self::Proposal, pending: &[Self::Command]) -> Self::Command;

    /// Apply a committed command. Must depend on nothing but the current
    /// state and the command itself.
    fn apply(&mut self, index: u64, command: Self::Command)
        -> Result<Self::Output, InvariantViolation>;
}

/// A committed command could not be applied. Never recoverable.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct InvariantViolation(pub String);
