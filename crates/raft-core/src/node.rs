//! # node
//!
//! why: define the raft node state machine and its state transitions
//! relations: uses message.rs for rpc types, log.rs for entry management
//! what: NodeState enum, RaftNode struct, HardState/Ready persistence hand-off
//!
//! The node never touches the network, disk or clock. Every input is a
//! method call; every output is a return value or something drained through
//! [`RaftNode::take_ready`]. Whoever drives the node must persist a `Ready`
//! before sending any response produced by the same call.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::log::{LogEntry, RaftLog};
use crate::message::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::{NodeId, RaftError};

/// The three possible states a Raft node can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeState {
    /// Passive state - listens for heartbeats, votes when asked
    #[default]
    Follower,
    /// Transitional state - requesting votes to become leader
    Candidate,
    /// Active state - manages log replication, sends heartbeats
    Leader,
}

/// Timing and batching knobs, all durations in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftConfig {
    pub election_timeout_min: u64,
    pub election_timeout_max: u64,
    pub heartbeat_interval: u64,
    /// Upper bound on entries carried by one AppendEntries request
    pub max_append_entries: usize,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 150,
            election_timeout_max: 300,
            heartbeat_interval: 50,
            max_append_entries: 64,
        }
    }
}

/// The part of node state that must survive a restart besides the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardState {
    pub term: u64,
    pub voted_for: Option<NodeId>,
}

/// Everything the driver has to do after feeding the node an input.
///
/// Apply in order: save `hard_state`, truncate the stored log from
/// `truncate_from`, append `entries`, then apply `committed` to the state
/// machine.
#[derive(Debug, Default)]
pub struct Ready {
    pub hard_state: Option<HardState>,
    pub truncate_from: Option<u64>,
    pub entries: Vec<LogEntry>,
    pub committed: Vec<LogEntry>,
}

impl Ready {
    pub fn is_empty(&self) -> bool {
        self.hard_state.is_none()
            && self.truncate_from.is_none()
            && self.entries.is_empty()
            && self.committed.is_empty()
    }

    /// True if anything has to reach durable storage.
    pub fn needs_persist(&self) -> bool {
        self.hard_state.is_some() || self.truncate_from.is_some() || !self.entries.is_empty()
    }
}

/// A single Raft node in the cluster
#[derive(Debug)]
pub struct RaftNode {
    /// Unique identifier for this node
    pub id: NodeId,
    /// Every voting member, including this node
    pub cluster_nodes: Vec<NodeId>,
    /// Current state (Follower, Candidate, or Leader)
    pub state: NodeState,
    /// Current term number
    pub current_term: u64,
    /// Node ID that received our vote in current term (if any)
    pub voted_for: Option<NodeId>,
    pub log: RaftLog,
    /// Highest index known to be committed
    pub commit_index: u64,
    /// Highest index handed out through `Ready::committed`
    pub last_applied: u64,
    /// Best guess at who leads the current term
    pub leader_id: Option<NodeId>,
    pub votes_received: BTreeSet<NodeId>,
    /// Leader only: next index to send to each peer
    pub next_index: BTreeMap<NodeId, u64>,
    /// Leader only: highest index known replicated on each peer
    pub match_index: BTreeMap<NodeId, u64>,
    pub config: RaftConfig,

    hard_state_dirty: bool,
    unstable_from: Option<u64>,
    truncated_from: Option<u64>,
}

impl RaftNode {
    /// Create a new Raft node in Follower state
    pub fn new(id: NodeId, cluster_nodes: Vec<NodeId>) -> Self {
        Self::with_config(id, cluster_nodes, RaftConfig::default())
    }

    pub fn with_config(id: NodeId, mut cluster_nodes: Vec<NodeId>, config: RaftConfig) -> Self {
        if !cluster_nodes.contains(&id) {
            cluster_nodes.push(id);
        }
        cluster_nodes.sort_unstable();
        cluster_nodes.dedup();

        Self {
            id,
            cluster_nodes,
            state: NodeState::Follower,
            current_term: 0,
            voted_for: None,
            log: RaftLog::new(),
            commit_index: 0,
            last_applied: 0,
            leader_id: None,
            votes_received: BTreeSet::new(),
            next_index: BTreeMap::new(),
            match_index: BTreeMap::new(),
            config,
            hard_state_dirty: false,
            unstable_from: None,
            truncated_from: None,
        }
    }

    /// Rebuild a node from what storage handed back after a restart.
    ///
    /// The commit index is not persisted; it is relearned from the leader
    /// (or, on a single-node cluster, from the node's own next election).
    pub fn restore(
        id: NodeId,
        cluster_nodes: Vec<NodeId>,
        config: RaftConfig,
        hard_state: HardState,
        entries: Vec<LogEntry>,
    ) -> Result<Self, RaftError> {
        let mut node = Self::with_config(id, cluster_nodes, config);
        node.current_term = hard_state.term;
        node.voted_for = hard_state.voted_for;
        node.log = RaftLog::from_entries(entries)?;
        Ok(node)
    }

    pub fn is_leader(&self) -> bool {
        self.state == NodeState::Leader
    }

    pub fn hard_state(&self) -> HardState {
        HardState {
            term: self.current_term,
            voted_for: self.voted_for,
        }
    }

    /// Every member except this node
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.cluster_nodes.iter().copied().filter(move |n| *n != self.id)
    }

    /// Strict majority of the cluster: floor(n/2) + 1
    pub fn quorum_size(&self) -> usize {
        self.cluster_nodes.len() / 2 + 1
    }

    pub fn has_quorum(&self) -> bool {
        self.votes_received.len() >= self.quorum_size()
    }

    // -- elections --

    /// Election timeout fired: become candidate for the next term and vote
    /// for ourselves. A single-node cluster wins immediately.
    pub fn start_election(&mut self) -> VoteRequest {
        self.state = NodeState::Candidate;
        self.current_term += 1;
        self.voted_for = Some(self.id);
        self.leader_id = None;
        self.votes_received.clear();
        self.votes_received.insert(self.id);
        self.hard_state_dirty = true;

        let request = VoteRequest {
            term: self.current_term,
            candidate_id: self.id,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        };

        if self.has_quorum() {
            self.become_leader();
        }
        request
    }

    /// Returns the response and whether the election timer should be reset.
    pub fn handle_vote_request(&mut self, request: &VoteRequest) -> (VoteResponse, bool) {
        if request.term > self.current_term {
            self.become_follower(request.term, None);
        }

        let free_to_vote = self
            .voted_for
            .map_or(true, |candidate| candidate == request.candidate_id);
        let granted = request.term == self.current_term
            && free_to_vote
            && self
                .log
                .is_up_to_date(request.last_log_index, request.last_log_term);

        if granted && self.voted_for != Some(request.candidate_id) {
            self.voted_for = Some(request.candidate_id);
            self.hard_state_dirty = true;
        }

        let response = VoteResponse {
            term: self.current_term,
            vote_granted: granted,
            node_id: self.id,
        };
        (response, granted)
    }

    /// Count a vote. Returns true if this response made us leader.
    pub fn handle_vote_response(&mut self, response: &VoteResponse) -> bool {
        if response.term > self.current_term {
            self.become_follower(response.term, None);
            return false;
        }
        if self.state != NodeState::Candidate || response.term != self.current_term {
            return false;
        }
        if response.vote_granted && self.cluster_nodes.contains(&response.node_id) {
            self.votes_received.insert(response.node_id);
        }
        if self.has_quorum() {
            self.become_leader();
            return true;
        }
        false
    }

    /// Drop back to follower, adopting `term` if it is newer.
    pub fn become_follower(&mut self, term: u64, leader_id: Option<NodeId>) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
            self.hard_state_dirty = true;
        }
        self.state = NodeState::Follower;
        self.leader_id = leader_id;
        self.votes_received.clear();
        self.next_index.clear();
        self.match_index.clear();
    }

    fn become_leader(&mut self) {
        self.state = NodeState::Leader;
        self.leader_id = Some(self.id);
        self.votes_received.clear();

        let next = self.log.last_index() + 1;
        let peers: Vec<NodeId> = self.peers().collect();
        self.next_index = peers.iter().map(|p| (*p, next)).collect();
        self.match_index = peers.iter().map(|p| (*p, 0)).collect();

        // commit everything inherited from earlier terms through an entry of ours
        let blank = LogEntry::blank(self.current_term, next);
        self.push_entry(blank);
        self.advance_commit_index();
    }

    // -- replication --

    /// Leader only: append a command to the local log.
    pub fn append_entry(&mut self, command: Vec<u8>) -> Option<LogEntry> {
        if !self.is_leader() {
            return None;
        }
        let entry = LogEntry::new(self.current_term, self.log.last_index() + 1, command);
        self.push_entry(entry.clone());
        self.advance_commit_index();
        Some(entry)
    }

    /// Leader only: the next AppendEntries for `peer`, carrying whatever the
    /// peer is missing (possibly nothing, making it a heartbeat).
    pub fn create_append_entries(&self, peer: NodeId) -> Option<AppendEntriesRequest> {
        if !self.is_leader() {
            return None;
        }
        let next = (*self.next_index.get(&peer)?).clamp(1, self.log.last_index() + 1);
        let prev_log_index = next - 1;
        let prev_log_term = self.log.term_at(prev_log_index)?;

        Some(AppendEntriesRequest {
            term: self.current_term,
            leader_id: self.id,
            prev_log_index,
            prev_log_term,
            entries: self.log.entries_from(next, self.config.max_append_entries),
            leader_commit: self.commit_index,
        })
    }

    /// True if `peer` is missing entries the leader holds.
    pub fn peer_lagging(&self, peer: NodeId) -> bool {
        self.is_leader()
            && self
                .next_index
                .get(&peer)
                .is_some_and(|next| *next <= self.log.last_index())
    }

    /// Returns the response and whether the election timer should be reset.
    pub fn handle_append_entries(
        &mut self,
        request: &AppendEntriesRequest,
    ) -> (AppendEntriesResponse, bool) {
        if request.term < self.current_term {
            return (self.append_response(false, 0), false);
        }

        self.become_follower(request.term, Some(request.leader_id));

        if !self
            .log
            .matches(request.prev_log_index, request.prev_log_term)
        {
            let mut response = self.append_response(false, 0);
            if self.log.last_index() >= request.prev_log_index {
                // the entry at prev_log_index conflicts; everything from there is suspect
                response.last_log_index = request.prev_log_index.saturating_sub(1);
            }
            return (response, true);
        }

        let mut last_new = request.prev_log_index;
        for entry in &request.entries {
            match self.log.term_at(entry.index) {
                Some(term) if term == entry.term => {}
                Some(_) => {
                    debug_assert!(entry.index > self.commit_index, "committed entry overwritten");
                    self.log.truncate_from(entry.index);
                    self.truncated_from =
                        Some(self.truncated_from.map_or(entry.index, |t| t.min(entry.index)));
                    self.push_entry(entry.clone());
                }
                None => self.push_entry(entry.clone()),
            }
            last_new = entry.index;
        }

        if request.leader_commit > self.commit_index {
            self.commit_index = self
                .commit_index
                .max(request.leader_commit.min(last_new));
        }

        (self.append_response(true, last_new), true)
    }

    /// Record a peer's answer. Returns true if the commit index advanced.
    pub fn handle_append_entries_response(&mut self, response: &AppendEntriesResponse) -> bool {
        if response.term > self.current_term {
            self.become_follower(response.term, None);
            return false;
        }
        if !self.is_leader() || response.term != self.current_term {
            return false;
        }
        let peer = response.node_id;
        let Some(next) = self.next_index.get(&peer).copied() else {
            return false;
        };
        let matched = self.match_index.get(&peer).copied().unwrap_or(0);

        if response.success {
            let matched = matched.max(response.match_index.min(self.log.last_index()));
            self.match_index.insert(peer, matched);
            self.next_index.insert(peer, matched + 1);
            self.advance_commit_index()
        } else {
            let backed_up = next
                .saturating_sub(1)
                .min(response.last_log_index + 1)
                .max(matched + 1)
                .max(1);
            self.next_index.insert(peer, backed_up);
            false
        }
    }

    /// Leader only: commit the highest index of the current term that a
    /// majority has stored. Entries of earlier terms commit only indirectly.
    pub fn advance_commit_index(&mut self) -> bool {
        if !self.is_leader() {
            return false;
        }
        let quorum = self.quorum_size();
        let mut n = self.log.last_index();
        while n > self.commit_index {
            match self.log.term_at(n) {
                Some(term) if term == self.current_term => {
                    let replicas = 1 + self.match_index.values().filter(|m| **m >= n).count();
                    if replicas >= quorum {
                        self.commit_index = n;
                        return true;
                    }
                }
                _ => break,
            }
            n -= 1;
        }
        false
    }

    /// True once an entry from the current term is committed. Until then a
    /// fresh leader's commit index may lag what earlier leaders committed.
    pub fn committed_in_current_term(&self) -> bool {
        self.log.term_at(self.commit_index) == Some(self.current_term)
    }

    /// Drain everything produced since the last call.
    pub fn take_ready(&mut self) -> Ready {
        let hard_state = if std::mem::take(&mut self.hard_state_dirty) {
            Some(self.hard_state())
        } else {
            None
        };
        let truncate_from = self.truncated_from.take();
        let entries = match self.unstable_from.take() {
            Some(from) => self.log.entries_from(from, usize::MAX),
            None => Vec::new(),
        };
        let committed = if self.commit_index > self.last_applied {
            let batch = self.log.slice(self.last_applied, self.commit_index).to_vec();
            self.last_applied = self.commit_index;
            batch
        } else {
            Vec::new()
        };

        Ready {
            hard_state,
            truncate_from,
            entries,
            committed,
        }
    }

    fn push_entry(&mut self, entry: LogEntry) {
        let index = entry.index;
        self.log.push(entry);
        self.unstable_from = Some(self.unstable_from.map_or(index, |u| u.min(index)));
    }

    fn append_response(&self, success: bool, match_index: u64) -> AppendEntriesResponse {
        AppendEntriesResponse {
            term: self.current_term,
            success,
            node_id: self.id,
            match_index,
            last_log_index: self.log.last_index(),
        }
    }
}
