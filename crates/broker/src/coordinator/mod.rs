//! # coordinator
//!
//! why: run raft-core's node against real time, real peers and durable storage
//! relations: drives raft_core::RaftNode, persists through raft_storage::Storage,
//!            replicates any StateMachine (the broker uses crate::state::BrokerState)
//! what: ClusterCoordinator, CoordinatorConfig, RaftStatus, transports and the rpc router
//!
//! One tokio task ticks every `tick_interval` and fires election and
//! heartbeat timers. Everything that touches the node (ticks, rpc handlers,
//! proposals, rpc responses) does so under a single synchronous lock that is
//! never held across an `.await`. Each pass ends in `process_ready`, which
//! persists before anything produced by that pass leaves the node, then
//! applies newly committed entries.

mod memory;
mod server;
mod state_machine;
mod transport;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use server::raft_router;
pub use state_machine::{InvariantViolation, StateMachine};
pub use transport::{
    ForwardReply, HttpTransport, RaftTransport, ReadIndexResponse, RpcHandler, TransportError,
};
use transport::encode_forward_reply;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use raft_core::{
    AppendEntriesRequest, AppendEntriesResponse, NodeId, NodeState, RaftConfig, RaftNode,
    VoteRequest, VoteResponse,
};
use raft_storage::Storage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::CoordinatorError;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub node_id: NodeId,
    /// Every voting member, this node included.
    pub members: Vec<NodeId>,
    pub raft: RaftConfig,
    /// Resolution of the election and heartbeat timers.
    pub tick_interval: Duration,
    /// Bound on a single peer rpc.
    pub rpc_timeout: Duration,
    /// Bound on waiting for a proposal to commit and apply.
    pub commit_timeout: Duration,
}

impl CoordinatorConfig {
    pub fn new(node_id: NodeId, members: Vec<NodeId>) -> Self {
        Self {
            node_id,
            members,
            raft: RaftConfig::default(),
            tick_interval: Duration::from_millis(10),
            rpc_timeout: Duration::from_secs(4),
            commit_timeout: Duration::from_secs(5),
        }
    }
}

/// Snapshot served by `GET /raft/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaftStatus {
    pub node_id: NodeId,
    pub initialized: bool,
    pub term: u64,
    pub role: NodeState,
    pub leader_id: Option<NodeId>,
    pub commit_index: u64,
    pub last_applied: u64,
}

enum Route {
    Local,
    Leader(NodeId),
}

struct Waiter<O> {
    /// Term the entry was proposed in; a different term at the same index
    /// means the proposal was overwritten.
    term: u64,
    tx: oneshot::Sender<Result<O, CoordinatorError>>,
}

struct Core<S: StateMachine> {
    node: RaftNode,
    storage: Box<dyn Storage>,
    waiters: BTreeMap<u64, Waiter<S::Output>>,
    election_deadline: Instant,
    heartbeat_due: Instant,
    /// Leader only: last current-term response from each peer.
    last_ack: HashMap<NodeId, Instant>,
    /// Peers with a replication task running.
    in_flight: HashSet<NodeId>,
    halted: Option<CoordinatorError>,
}

impl<S: StateMachine> Core<S> {
    fn check_running(&self) -> Result<(), CoordinatorError> {
        match &self.halted {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn reset_election_timer(&mut self) {
        let config = &self.node.config;
        let low = config.election_timeout_min;
        let high = config.election_timeout_max.max(low);
        let timeout = rand::thread_rng().gen_range(low..=high);
        self.election_deadline = Instant::now() + Duration::from_millis(timeout);
    }

    fn route(&self) -> Result<Route, CoordinatorError> {
        self.check_running()?;
        if self.node.is_leader() {
            return Ok(Route::Local);
        }
        match self.node.leader_id {
            Some(leader) => Ok(Route::Leader(leader)),
            None => Err(CoordinatorError::NoLeaderAvailable),
        }
    }

    /// Commands in the log that have not been applied yet.
    fn pending_commands(&self) -> Result<Vec<S::Command>, CoordinatorError> {
        self.node
            .log
            .slice(self.node.last_applied, self.node.log.last_index())
            .iter()
            .filter(|entry| !entry.is_blank())
            .map(|entry| {
                serde_json::from_slice(&entry.command).map_err(|e| {
                    CoordinatorError::internal(format!("undecodable entry {}: {e}", entry.index))
                })
            })
            .collect()
    }

    fn majority_in_contact(&self, now: Instant, window: Duration) -> bool {
        let recent = self
            .node
            .peers()
            .filter(|peer| {
                self.last_ack
                    .get(peer)
                    .is_some_and(|at| now.saturating_duration_since(*at) <= window)
            })
            .count();
        recent + 1 >= self.node.quorum_size()
    }

    fn fail_waiters(&mut self, err: &CoordinatorError) {
        for (_, waiter) in std::mem::take(&mut self.waiters) {
            let _ = waiter.tx.send(Err(err.clone()));
        }
    }
}

struct Inner<S: StateMachine> {
    config: CoordinatorConfig,
    /// Lock order: `core` before `state`.
    core: Mutex<Core<S>>,
    state: RwLock<S>,
    transport: Arc<dyn RaftTransport>,
    applied: watch::Sender<u64>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<S: StateMachine> Inner<S> {
    /// Persist, then apply, whatever the last call into the node produced.
    fn process_ready(&self, core: &mut Core<S>) -> Result<(), CoordinatorError> {
        core.check_running()?;
        let ready = core.node.take_ready();
        if ready.is_empty() {
            return Ok(());
        }
        if ready.needs_persist() {
            if let Err(err) = core.storage.persist(&ready) {
                return Err(self.halt(core, err.into()));
            }
        }
        if ready.committed.is_empty() {
            return Ok(());
        }

        let leader_hint = core.node.leader_id;
        let mut state = self.state.write();
        for entry in ready.committed {
            let waiter = core.waiters.remove(&entry.index);
            let output = if entry.is_blank() {
                None
            } else {
                let applied = serde_json::from_slice::<S::Command>(&entry.command)
                    .map_err(|e| {
                        CoordinatorError::internal(format!(
                            "undecodable entry {}: {e}",
                            entry.index
                        ))
                    })
                    .and_then(|command| {
                        state
                            .apply(entry.index, command)
                            .map_err(|violation| CoordinatorError::LogConflict {
                                reason: format!("entry {}: {violation}", entry.index),
                            })
                    });
                match applied {
                    Ok(output) => Some(output),
                    Err(err) => {
                        drop(state);
                        if let Some(waiter) = waiter {
                            let _ = waiter.tx.send(Err(err.clone()));
                        }
                        return Err(self.halt(core, err));
                    }
                }
            };

            if let Some(waiter) = waiter {
                let reply = match output {
                    Some(output) if waiter.term == entry.term => Ok(output),
                    _ => Err(CoordinatorError::not_leader(leader_hint)),
                };
                let _ = waiter.tx.send(reply);
            }
        }
        drop(state);

        let applied = core.node.last_applied;
        self.applied.send_replace(applied);
        debug!(node_id = self.config.node_id, applied, "applied committed entries");
        Ok(())
    }

    fn halt(&self, core: &mut Core<S>, err: CoordinatorError) -> CoordinatorError {
        error!(node_id = self.config.node_id, error = %err, "halting cluster coordinator");
        core.halted = Some(err.clone());
        core.fail_waiters(&err);
        self.cancel.cancel();
        err
    }
}

/// Raft driver for one node. Cheap to clone; clones share the node.
pub struct ClusterCoordinator<S: StateMachine> {
    inner: Arc<Inner<S>>,
}

impl<S: StateMachine> Clone for ClusterCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: StateMachine> ClusterCoordinator<S> {
    /// Rebuild the node from `storage` and wrap it. Committed entries are
    /// re-applied to `state_machine` once the commit index is relearned.
    pub fn new(
        config: CoordinatorConfig,
        storage: Box<dyn Storage>,
        state_machine: S,
        transport: Arc<dyn RaftTransport>,
    ) -> Result<Self, CoordinatorError> {
        let (hard_state, entries) = storage.load()?;
        let node = RaftNode::restore(
            config.node_id,
            config.members.clone(),
            config.raft.clone(),
            hard_state,
            entries,
        )
        .map_err(|e| CoordinatorError::Storage {
            reason: e.to_string(),
        })?;
        info!(
            node_id = config.node_id,
            term = node.current_term,
            last_index = node.log.last_index(),
            "restored raft state"
        );

        let now = Instant::now();
        let mut core = Core {
            node,
            storage,
            waiters: BTreeMap::new(),
            election_deadline: now,
            heartbeat_due: now,
            last_ack: HashMap::new(),
            in_flight: HashSet::new(),
            halted: None,
        };
        core.reset_election_timer();
        let (applied, _) = watch::channel(0);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                core: Mutex::new(core),
                state: RwLock::new(state_machine),
                transport,
                applied,
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.config.node_id
    }

    /// Spawn the timer task. Calling it again is a no-op.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.core.lock().reset_election_timer();
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run().await });
        *self.inner.task.lock() = Some(handle);
        info!(node_id = self.node_id(), "cluster coordinator started");
    }

    /// Stop the timer task and fail everything still waiting. Rpcs arriving
    /// afterwards are rejected, so the node looks crashed to its peers.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        {
            let mut core = self.inner.core.lock();
            if core.halted.is_none() {
                core.halted = Some(CoordinatorError::Shutdown);
            }
            core.fail_waiters(&CoordinatorError::Shutdown);
        }
        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!(node_id = self.node_id(), "cluster coordinator stopped");
    }

    pub fn get_state(&self) -> RaftStatus {
        let core = self.inner.core.lock();
        RaftStatus {
            node_id: core.node.id,
            initialized: self.inner.started.load(Ordering::SeqCst) && core.halted.is_none(),
            term: core.node.current_term,
            role: core.node.state,
            leader_id: core.node.leader_id,
            commit_index: core.node.commit_index,
            last_applied: core.node.last_applied,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.inner.core.lock().node.is_leader()
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.inner.core.lock().node.leader_id
    }

    /// Run `f` against the applied state of this node. No freshness
    /// guarantee on its own; pair with [`Self::read_barrier`].
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.state.read())
    }

    /// Leader only: append `proposal` and wait until it is committed and
    /// applied. Fails `NotLeader` on followers without forwarding.
    pub async fn submit_command(&self, proposal: S::Proposal) -> Result<S::Output, CoordinatorError> {
        let (index, rx) = self.append_local(proposal)?;
        self.broadcast_append();

        match time::timeout(self.inner.config.commit_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoordinatorError::Shutdown),
            Err(_) => {
                warn!(node_id = self.node_id(), index, "proposal did not commit in time");
                Err(CoordinatorError::timeout(format!("commit of index {index}")))
            }
        }
    }

    /// Submit on the leader, or forward one hop to the known leader.
    pub async fn propose(&self, proposal: S::Proposal) -> Result<S::Output, CoordinatorError> {
        let route = self.inner.core.lock().route()?;
        match route {
            Route::Local => self.submit_command(proposal).await,
            Route::Leader(leader) => self.forward_to(leader, proposal).await,
        }
    }

    /// Leader only: a commit index that reflects every write acknowledged
    /// before the call, confirmed by a majority heartbeat round.
    pub async fn read_index(&self) -> Result<u64, CoordinatorError> {
        let deadline = Instant::now() + self.inner.config.commit_timeout;
        let mut applied = self.inner.applied.subscribe();
        let (index, term) = loop {
            let confirmed = {
                let core = self.inner.core.lock();
                core.check_running()?;
                if !core.node.is_leader() {
                    return Err(CoordinatorError::not_leader(core.node.leader_id));
                }
                core.node
                    .committed_in_current_term()
                    .then_some((core.node.commit_index, core.node.current_term))
            };
            if let Some(found) = confirmed {
                break found;
            }
            // the blank entry of this term has not committed yet
            if time::timeout_at(deadline, applied.changed()).await.is_err() {
                return Err(CoordinatorError::timeout("read index"));
            }
        };

        self.confirm_leadership(term).await?;
        Ok(index)
    }

    /// Wait until this node has applied everything committed before the call.
    pub async fn read_barrier(&self) -> Result<(), CoordinatorError> {
        let route = self.inner.core.lock().route()?;
        let index = match route {
            Route::Local => self.read_index().await?,
            Route::Leader(leader) => {
                let call = self.inner.transport.read_index(leader);
                match time::timeout(self.inner.config.rpc_timeout, call).await {
                    Ok(Ok(index)) => index,
                    Ok(Err(TransportError::Remote(err))) => return Err(err),
                    Ok(Err(err)) => {
                        debug!(node_id = self.node_id(), leader, error = %err, "read index rpc failed");
                        return Err(CoordinatorError::NoLeaderAvailable);
                    }
                    Err(_) => return Err(CoordinatorError::timeout("read index from leader")),
                }
            }
        };
        self.wait_applied(index).await
    }

    pub async fn wait_applied(&self, index: u64) -> Result<(), CoordinatorError> {
        let mut applied = self.inner.applied.subscribe();
        let outcome = match time::timeout(
            self.inner.config.commit_timeout,
            applied.wait_for(|at| *at >= index),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(CoordinatorError::Shutdown),
            Err(_) => Err(CoordinatorError::timeout(format!("apply of index {index}"))),
        };
        outcome
    }

    // -- timers --

    async fn run(self) {
        let mut ticker = time::interval(self.inner.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.tick() {
                        if err != CoordinatorError::Shutdown {
                            error!(node_id = self.node_id(), error = %err, "coordinator loop stopped");
                        }
                        break;
                    }
                }
            }
        }
    }

    fn tick(&self) -> Result<(), CoordinatorError> {
        let now = Instant::now();
        let mut core = self.inner.core.lock();
        core.check_running()?;
        core.waiters.retain(|_, waiter| !waiter.tx.is_closed());

        if core.node.is_leader() {
            let window = Duration::from_millis(core.node.config.election_timeout_max);
            if !core.majority_in_contact(now, window) {
                let term = core.node.current_term;
                warn!(node_id = core.node.id, term, "lost contact with a majority, stepping down");
                core.node.become_follower(term, None);
                core.reset_election_timer();
                return self.inner.process_ready(&mut core);
            }
            if now >= core.heartbeat_due {
                core.heartbeat_due = now + Duration::from_millis(core.node.config.heartbeat_interval);
                drop(core);
                self.broadcast_append();
            }
            return Ok(());
        }

        if now < core.election_deadline {
            return Ok(());
        }
        let request = core.node.start_election();
        core.reset_election_timer();
        info!(node_id = core.node.id, term = request.term, "election timeout, starting election");

        let won = core.node.is_leader();
        if won {
            self.on_became_leader(&mut core, now);
        }
        self.inner.process_ready(&mut core)?;
        drop(core);

        if won {
            self.broadcast_append();
        } else {
            self.request_votes(request);
        }
        Ok(())
    }

    // -- elections --

    fn request_votes(&self, request: VoteRequest) {
        let peers: Vec<NodeId> = self.inner.core.lock().node.peers().collect();
        for peer in peers {
            let this = self.clone();
            let request = request.clone();
            tokio::spawn(async move {
                let call = this.inner.transport.request_vote(peer, request);
                match time::timeout(this.inner.config.rpc_timeout, call).await {
                    Ok(Ok(response)) => this.on_vote_response(response),
                    Ok(Err(err)) => {
                        debug!(node_id = this.node_id(), peer, error = %err, "vote request failed")
                    }
                    Err(_) => debug!(node_id = this.node_id(), peer, "vote request timed out"),
                }
            });
        }
    }

    fn on_vote_response(&self, response: VoteResponse) {
        let won = {
            let mut core = self.inner.core.lock();
            if core.check_running().is_err() {
                return;
            }
            let won = core.node.handle_vote_response(&response);
            if won {
                self.on_became_leader(&mut core, Instant::now());
            }
            if self.inner.process_ready(&mut core).is_err() {
                return;
            }
            won
        };
        if won {
            self.broadcast_append();
        }
    }

    fn on_became_leader(&self, core: &mut Core<S>, now: Instant) {
        info!(node_id = core.node.id, term = core.node.current_term, "became leader");
        core.last_ack = core.node.peers().map(|peer| (peer, now)).collect();
        core.heartbeat_due = now + Duration::from_millis(core.node.config.heartbeat_interval);
    }

    // -- replication --

    fn append_local(
        &self,
        proposal: S::Proposal,
    ) -> Result<(u64, oneshot::Receiver<Result<S::Output, CoordinatorError>>), CoordinatorError> {
        let mut core = self.inner.core.lock();
        core.check_running()?;
        if !core.node.is_leader() {
            return Err(CoordinatorError::not_leader(core.node.leader_id));
        }

        let pending = core.pending_commands()?;
        let command = self.inner.state.read().stamp(proposal, &pending);
        let bytes = serde_json::to_vec(&command)
            .map_err(|e| CoordinatorError::internal(format!("unencodable command: {e}")))?;
        let Some(entry) = core.node.append_entry(bytes) else {
            return Err(CoordinatorError::not_leader(core.node.leader_id));
        };

        let (tx, rx) = oneshot::channel();
        core.waiters.insert(
            entry.index,
            Waiter {
                term: entry.term,
                tx,
            },
        );
        self.inner.process_ready(&mut core)?;
        debug!(node_id = core.node.id, index = entry.index, term = entry.term, "appended proposal");
        Ok((entry.index, rx))
    }

    /// Make sure every peer has a replication task; peers that already have
    /// one pick up new entries before their task exits.
    fn broadcast_append(&self) {
        let peers: Vec<NodeId> = {
            let mut core = self.inner.core.lock();
            if !core.node.is_leader() {
                return;
            }
            let all: Vec<NodeId> = core.node.peers().collect();
            all.into_iter()
                .filter(|peer| core.in_flight.insert(*peer))
                .collect()
        };
        for peer in peers {
            let this = self.clone();
            tokio::spawn(async move { this.replicate(peer).await });
        }
    }

    async fn replicate(&self, peer: NodeId) {
        loop {
            let request = {
                let mut core = self.inner.core.lock();
                match core.node.create_append_entries(peer) {
                    Some(request) if core.halted.is_none() => request,
                    _ => {
                        core.in_flight.remove(&peer);
                        return;
                    }
                }
            };

            let call = self.inner.transport.append_entries(peer, request);
            let again = match time::timeout(self.inner.config.rpc_timeout, call).await {
                Ok(Ok(response)) => self.on_append_response(peer, response, true),
                Ok(Err(err)) => {
                    debug!(node_id = self.node_id(), peer, error = %err, "append entries failed");
                    self.inner.core.lock().in_flight.remove(&peer);
                    false
                }
                Err(_) => {
                    debug!(node_id = self.node_id(), peer, "append entries timed out");
                    self.inner.core.lock().in_flight.remove(&peer);
                    false
                }
            };
            if !again {
                return;
            }
        }
    }

    /// Feed a peer's answer to the node. With `owns_slot`, returns whether
    /// the replication task should send again, releasing the slot if not.
    fn on_append_response(&self, peer: NodeId, response: AppendEntriesResponse, owns_slot: bool) -> bool {
        let mut core = self.inner.core.lock();
        if core.halted.is_some() {
            if owns_slot {
                core.in_flight.remove(&peer);
            }
            return false;
        }

        let was_leader = core.node.is_leader();
        if was_leader && response.term == core.node.current_term {
            core.last_ack.insert(peer, Instant::now());
        }
        if core.node.handle_append_entries_response(&response) {
            debug!(node_id = core.node.id, commit_index = core.node.commit_index, "commit index advanced");
        }
        if was_leader && !core.node.is_leader() {
            info!(node_id = core.node.id, term = core.node.current_term, peer, "saw a newer term, stepping down");
            core.reset_election_timer();
        }
        if self.inner.process_ready(&mut core).is_err() {
            core.in_flight.remove(&peer);
            return false;
        }

        let again = owns_slot && core.node.peer_lagging(peer);
        if owns_slot && !again {
            core.in_flight.remove(&peer);
        }
        again
    }

    /// One heartbeat round; succeeds once a majority answers in `term`.
    async fn confirm_leadership(&self, term: u64) -> Result<(), CoordinatorError> {
        let (requests, quorum) = {
            let core = self.inner.core.lock();
            core.check_running()?;
            if !core.node.is_leader() || core.node.current_term != term {
                return Err(CoordinatorError::not_leader(core.node.leader_id));
            }
            let requests: Vec<(NodeId, AppendEntriesRequest)> = core
                .node
                .peers()
                .filter_map(|peer| core.node.create_append_entries(peer).map(|r| (peer, r)))
                .collect();
            (requests, core.node.quorum_size())
        };

        let mut acks = 1;
        if acks >= quorum {
            return Ok(());
        }
        let timeout = self.inner.config.rpc_timeout;
        let mut calls: FuturesUnordered<_> = requests
            .into_iter()
            .map(|(peer, request)| {
                let transport = Arc::clone(&self.inner.transport);
                async move {
                    let outcome = time::timeout(timeout, transport.append_entries(peer, request)).await;
                    (peer, outcome)
                }
            })
            .collect();

        while let Some((peer, outcome)) = calls.next().await {
            match outcome {
                Ok(Ok(response)) => {
                    let in_term = response.term == term;
                    self.on_append_response(peer, response, false);
                    if in_term {
                        acks += 1;
                        if acks >= quorum {
                            return Ok(());
                        }
                    }
                }
                Ok(Err(err)) => {
                    debug!(node_id = self.node_id(), peer, error = %err, "leadership probe failed")
                }
                Err(_) => debug!(node_id = self.node_id(), peer, "leadership probe timed out"),
            }
        }
        Err(CoordinatorError::NoLeaderAvailable)
    }

    async fn forward_to(&self, leader: NodeId, proposal: S::Proposal) -> Result<S::Output, CoordinatorError> {
        let bytes = serde_json::to_vec(&proposal)
            .map_err(|e| CoordinatorError::internal(format!("unencodable proposal: {e}")))?;
        debug!(node_id = self.node_id(), leader, "forwarding proposal to leader");

        let budget = self.inner.config.commit_timeout + self.inner.config.rpc_timeout;
        match time::timeout(budget, self.inner.transport.forward(leader, bytes)).await {
            Ok(Ok(reply)) => {
                let reply: ForwardReply<S::Output> = serde_json::from_slice(&reply)
                    .map_err(|e| CoordinatorError::internal(format!("malformed forward reply: {e}")))?;
                reply.into()
            }
            Ok(Err(TransportError::Remote(err))) => Err(err),
            Ok(Err(TransportError::Timeout(_))) | Err(_) => {
                Err(CoordinatorError::timeout("proposal forwarded to leader"))
            }
            Ok(Err(err)) => {
                warn!(node_id = self.node_id(), leader, error = %err, "could not reach leader");
                Err(CoordinatorError::NoLeaderAvailable)
            }
        }
    }
}

#[async_trait]
impl<S: StateMachine> RpcHandler for ClusterCoordinator<S> {
    async fn request_vote(&self, request: VoteRequest) -> Result<VoteResponse, CoordinatorError> {
        let mut core = self.inner.core.lock();
        core.check_running()?;
        let was_leader = core.node.is_leader();
        let (response, reset) = core.node.handle_vote_request(&request);
        if reset {
            core.reset_election_timer();
        }
        if was_leader && !core.node.is_leader() {
            info!(node_id = core.node.id, term = core.node.current_term, "vote request carried a newer term, stepping down");
        }
        // the vote must be durable before the candidate hears about it
        self.inner.process_ready(&mut core)?;
        if response.vote_granted {
            info!(node_id = core.node.id, term = response.term, candidate = request.candidate_id, "granted vote");
        }
        Ok(response)
    }

    async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, CoordinatorError> {
        let mut core = self.inner.core.lock();
        core.check_running()?;
        let (response, reset) = core.node.handle_append_entries(&request);
        if reset {
            core.reset_election_timer();
        }
        self.inner.process_ready(&mut core)?;
        Ok(response)
    }

    async fn read_index(&self) -> Result<u64, CoordinatorError> {
        ClusterCoordinator::read_index(self).await
    }

    async fn forward(&self, proposal: Vec<u8>) -> Vec<u8> {
        let result = match serde_json::from_slice::<S::Proposal>(&proposal) {
            Ok(proposal) => self.submit_command(proposal).await,
            Err(e) => Err(CoordinatorError::internal(format!("undecodable proposal: {e}"))),
        };
        encode_forward_reply(self.node_id(), result)
    }

    fn status(&self) -> RaftStatus {
        self.get_state()
    }
}
