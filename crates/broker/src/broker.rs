//! One broker node: coordinator, topic log, offsets and consume protocol
//! wired around a single replicated `BrokerState`.

use std::sync::Arc;

use parking_lot::Mutex;
use raft_storage::Storage;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::blob::BlobStore;
use crate::config::BrokerConfig;
use crate::consume::ConsumeCoordinator;
use crate::coordinator::{ClusterCoordinator, RaftTransport, RpcHandler};
use crate::error::CoordinatorError;
use crate::offsets::OffsetStore;
use crate::registry::TopicRegistry;
use crate::retention::spawn_retention_reaper;
use crate::state::BrokerState;
use crate::topic_log::TopicLog;

pub struct Broker {
    config: BrokerConfig,
    coordinator: ClusterCoordinator<BrokerState>,
    topics: TopicLog,
    offsets: OffsetStore,
    consumer: ConsumeCoordinator,
    cancel: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Broker {
    pub fn new(
        config: BrokerConfig,
        storage: Box<dyn Storage>,
        transport: Arc<dyn RaftTransport>,
        registry: Arc<dyn TopicRegistry>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, CoordinatorError> {
        let coordinator = ClusterCoordinator::new(
            config.coordinator.clone(),
            storage,
            BrokerState::new(),
            transport,
        )?;
        let topics = TopicLog::new(
            coordinator.clone(),
            Arc::clone(&registry),
            blobs,
            config.read_consistency,
        );
        let offsets = OffsetStore::new(coordinator.clone());
        let consumer =
            ConsumeCoordinator::new(topics.clone(), offsets.clone(), registry, config.poll_interval);

        Ok(Self {
            config,
            coordinator,
            topics,
            offsets,
            consumer,
            cancel: CancellationToken::new(),
            reaper: Mutex::new(None),
        })
    }

    pub fn start(&self) {
        self.coordinator.start();
        if let Some(interval) = self.config.retention_interval {
            let mut reaper = self.reaper.lock();
            if reaper.is_none() {
                *reaper = Some(spawn_retention_reaper(
                    self.topics.clone(),
                    interval,
                    self.cancel.clone(),
                ));
            }
        }
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let reaper = self.reaper.lock().take();
        if let Some(handle) = reaper {
            let _ = handle.await;
        }
        self.coordinator.shutdown().await;
    }

    pub fn coordinator(&self) -> &ClusterCoordinator<BrokerState> {
        &self.coordinator
    }

    pub fn topics(&self) -> &TopicLog {
        &self.topics
    }

    pub fn offsets(&self) -> &OffsetStore {
        &self.offsets
    }

    pub fn consumer(&self) -> &ConsumeCoordinator {
        &self.consumer
    }

    /// What peers call into; register it with a transport's server side.
    pub fn rpc_handler(&self) -> Arc<dyn RpcHandler> {
        Arc::new(self.coordinator.clone())
    }
}
