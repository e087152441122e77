//! Configuration for the broker node and its command line.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use raft_core::{NodeId, RaftConfig};

use crate::coordinator::CoordinatorConfig;

/// How reads decide they are fresh enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReadConsistency {
    /// Read-index through the leader before every read.
    #[default]
    Linearizable,
    /// Serve whatever this node has applied.
    Local,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub coordinator: CoordinatorConfig,
    pub read_consistency: ReadConsistency,
    /// How often a waiting consume call re-reads the topic.
    pub poll_interval: Duration,
    /// Period of the retention reaper; `None` disables it.
    pub retention_interval: Option<Duration>,
}

impl BrokerConfig {
    pub fn new(coordinator: CoordinatorConfig) -> Self {
        Self {
            coordinator,
            read_consistency: ReadConsistency::default(),
            poll_interval: Duration::from_millis(500),
            retention_interval: Some(Duration::from_secs(30)),
        }
    }
}

/// A peer given on the command line as `id=host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    pub id: NodeId,
    pub addr: String,
}

impl PeerAddr {
    pub fn base_url(&self) -> String {
        if self.addr.starts_with("http://") || self.addr.starts_with("https://") {
            self.addr.clone()
        } else {
            format!("http://{}", self.addr)
        }
    }
}

impl FromStr for PeerAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, addr) = s
            .split_once('=')
            .ok_or_else(|| format!("expected id=host:port, got '{s}'"))?;
        let id = id
            .trim()
            .parse()
            .map_err(|e| format!("invalid node id '{id}': {e}"))?;
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(format!("peer {id} has an empty address"));
        }
        Ok(Self {
            id,
            addr: addr.to_string(),
        })
    }
}

/// CLI arguments for the seqlog broker daemon.
#[derive(Debug, Parser)]
#[command(name = "seqlogd")]
#[command(about = "Consensus-coordinated ordered message log")]
pub struct CliArgs {
    /// This node's id; must be unique in the cluster.
    #[arg(long, env = "SEQLOG_NODE_ID")]
    pub node_id: NodeId,

    /// Address the peer rpc server binds to.
    #[arg(long, env = "SEQLOG_LISTEN", default_value = "127.0.0.1:7001")]
    pub listen: SocketAddr,

    /// Another cluster member as id=host:port; repeat for each peer.
    #[arg(long = "peer", env = "SEQLOG_PEERS", value_delimiter = ',')]
    pub peers: Vec<PeerAddr>,

    /// Directory for the raft log and blob payloads.
    #[arg(long, env = "SEQLOG_DATA_DIR", default_value = ".seqlog")]
    pub data_dir: PathBuf,

    /// Keep raft state and payloads in memory (for testing).
    #[arg(long, default_value = "false")]
    pub in_memory: bool,

    #[arg(long, default_value = "150")]
    pub election_timeout_min_ms: u64,

    #[arg(long, default_value = "300")]
    pub election_timeout_max_ms: u64,

    #[arg(long, default_value = "50")]
    pub heartbeat_interval_ms: u64,

    /// Bound on a single peer rpc.
    #[arg(long, default_value = "4000", value_parser = clap::value_parser!(u64).range(3000..=5000))]
    pub rpc_timeout_ms: u64,

    /// Bound on waiting for a write to commit.
    #[arg(long, default_value = "5000")]
    pub commit_timeout_ms: u64,

    /// Re-read interval of long-polling consume calls.
    #[arg(long, default_value = "500")]
    pub poll_interval_ms: u64,

    /// Retention sweep period in seconds; 0 disables the sweep.
    #[arg(long, default_value = "30")]
    pub retention_interval_secs: u64,

    #[arg(long, value_enum, env = "SEQLOG_READ_CONSISTENCY", default_value = "linearizable")]
    pub read_consistency: ReadConsistency,

    /// Topic to register at startup; repeatable.
    #[arg(long = "topic")]
    pub topics: Vec<String>,

    /// Consumer group to register at startup; repeatable.
    #[arg(long = "group")]
    pub groups: Vec<String>,
}

impl CliArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.election_timeout_min_ms > self.election_timeout_max_ms {
            return Err("election timeout min exceeds max".to_string());
        }
        if self.heartbeat_interval_ms >= self.election_timeout_min_ms {
            return Err("heartbeat interval must be shorter than the election timeout".to_string());
        }
        if self.peers.iter().any(|p| p.id == self.node_id) {
            return Err(format!("node {} is listed as its own peer", self.node_id));
        }
        Ok(())
    }

    /// Convert CLI args to broker configuration.
    pub fn to_broker_config(&self) -> BrokerConfig {
        let mut members: Vec<NodeId> = self.peers.iter().map(|p| p.id).collect();
        members.push(self.node_id);

        let mut coordinator = CoordinatorConfig::new(self.node_id, members);
        coordinator.raft = RaftConfig {
            election_timeout_min: self.election_timeout_min_ms,
            election_timeout_max: self.election_timeout_max_ms,
            heartbeat_interval: self.heartbeat_interval_ms,
            ..RaftConfig::default()
        };
        coordinator.rpc_timeout = Duration::from_millis(self.rpc_timeout_ms);
        coordinator.commit_timeout = Duration::from_millis(self.commit_timeout_ms);

        BrokerConfig {
            coordinator,
            read_consistency: self.read_consistency,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            retention_interval: (self.retention_interval_secs > 0)
                .then(|| Duration::from_secs(self.retention_interval_secs)),
        }
    }

    /// Base url of every peer, keyed by node id.
    pub fn peer_urls(&self) -> HashMap<NodeId, String> {
        self.peers.iter().map(|p| (p.id, p.base_url())).collect()
    }
}
