//! In-process transport with partition injection, for tests and single-binary clusters.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use raft_core::{AppendEntriesRequest, AppendEntriesResponse, NodeId, VoteRequest, VoteResponse};

use super::transport::{RaftTransport, RpcHandler, TransportError};

/// Registry of in-process nodes. Cloning shares the same network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<DashMap<NodeId, Arc<dyn RpcHandler>>>,
    /// Directed links that currently drop traffic.
    cut: Arc<RwLock<HashSet<(NodeId, NodeId)>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: NodeId, handler: Arc<dyn RpcHandler>) {
        self.nodes.insert(id, handler);
    }

    pub fn deregister(&self, id: NodeId) {
        self.nodes.remove(&id);
    }

    /// Transport used by node `from` to reach everyone else.
    pub fn transport(&self, from: NodeId) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport {
            network: self.clone(),
            from,
        })
    }

    /// Cut every link between the two sides, in both directions.
    pub fn partition(&self, side_a: &[NodeId], side_b: &[NodeId]) {
        let mut cut = self.cut.write();
        for a in side_a {
            for b in side_b {
                cut.insert((*a, *b));
                cut.insert((*b, *a));
            }
        }
    }

    /// Cut `node` off from every other registered node.
    pub fn isolate(&self, node: NodeId) {
        let others: Vec<NodeId> = self
            .nodes
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| *id != node)
            .collect();
        self.partition(&[node], &others);
    }

    pub fn heal(&self) {
        self.cut.write().clear();
    }

    fn connected(&self, from: NodeId, to: NodeId) -> bool {
        !self.cut.read().contains(&(from, to))
    }

    fn route(&self, from: NodeId, to: NodeId) -> Result<Arc<dyn RpcHandler>, TransportError> {
        if !self.connected(from, to) {
            return Err(TransportError::Unreachable(to));
        }
        self.nodes
            .get(&to)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TransportError::Unreachable(to))
    }

    /// A reply is lost if the link was cut while the request was in flight.
    fn deliver<T>(&self, from: NodeId, to: NodeId, reply: T) -> Result<T, TransportError> {
        if self.connected(to, from) {
            Ok(reply)
        } else {
            Err(TransportError::Unreachable(to))
        }
    }
}

pub struct MemoryTransport {
    network: MemoryNetwork,
    from: NodeId,
}

#[async_trait]
impl RaftTransport for MemoryTransport {
    async fn request_vote(
        &self,
        peer: NodeId,
        request: VoteRequest,
    ) -> Result<VoteResponse, TransportError> {
        let handler = self.network.route(self.from, peer)?;
        let response = handler
            .request_vote(request)
            .await
            .map_err(TransportError::Remote)?;
        self.network.deliver(self.from, peer, response)
    }

    async fn append_entries(
        &self,
        peer: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError> {
        let handler = self.network.route(self.from, peer)?;
        let response = handler
            .append_entries(request)
            .await
            .map_err(TransportError::Remote)?;
        self.network.deliver(self.from, peer, response)
    }

    async fn read_index(&self, peer: NodeId) -> Result<u64, TransportError> {
        let handler = self.network.route(self.from, peer)?;
        let index = handler.read_index().await.map_err(TransportError::Remote)?;
        self.network.deliver(self.from, peer, index)
    }

    async fn forward(&self, peer: NodeId, proposal: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let handler = self.network.route(self.from, peer)?;
        let reply = handler.forward(proposal).await;
        self.network.deliver(self.from, peer, reply)
    }
}
