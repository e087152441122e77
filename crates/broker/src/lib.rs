//! # seqlog-broker
//!
//! why: agree across broker nodes on message order and on consumer progress
//! relations: drives raft-core through raft-storage; fronts it with topic, offset and consume apis
//! what: ClusterCoordinator, TopicLog, OffsetStore, ConsumeCoordinator and their collaborators

pub mod blob;
pub mod broker;
pub mod config;
pub mod consume;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod offsets;
pub mod registry;
pub mod retention;
pub mod state;
pub mod telemetry;
pub mod topic_log;

pub use blob::{BlobStore, FileBlobStore, InMemoryBlobStore};
pub use broker::Broker;
pub use config::{BrokerConfig, CliArgs, PeerAddr, ReadConsistency};
pub use consume::{ConsumeCoordinator, ConsumeRequest, ConsumeResponse};
pub use coordinator::{
    raft_router, ClusterCoordinator, CoordinatorConfig, HttpTransport, MemoryNetwork,
    RaftStatus, RaftTransport, RpcHandler, StateMachine,
};
pub use error::{BrokerError, BrokerResult, CoordinatorError};
pub use model::{ConsumerGroup, ConsumerOffset, DraftMessage, Message, Topic};
pub use offsets::OffsetStore;
pub use registry::{InMemoryRegistry, TopicRegistry};
pub use state::{Applied, BrokerState, Command, Proposal};
pub use topic_log::TopicLog;
