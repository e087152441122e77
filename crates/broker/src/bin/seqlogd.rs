//! seqlogd: one broker node serving the peer rpc surface over http.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use raft_storage::{FileStorage, InMemoryStorage, Storage};
use seqlog_broker::blob::{BlobStore, FileBlobStore, InMemoryBlobStore};
use seqlog_broker::telemetry::init_tracing;
use seqlog_broker::{
    raft_router, Broker, CliArgs, ConsumerGroup, HttpTransport, InMemoryRegistry, Topic,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    args.validate().map_err(|e| anyhow!(e))?;
    let config = args.to_broker_config();

    let (storage, blobs): (Box<dyn Storage>, Arc<dyn BlobStore>) = if args.in_memory {
        (Box::new(InMemoryStorage::new()), Arc::new(InMemoryBlobStore::new()))
    } else {
        let raft_dir = args.data_dir.join(format!("node-{}", args.node_id)).join("raft");
        let storage = FileStorage::new(&raft_dir)
            .with_context(|| format!("opening raft storage at {}", raft_dir.display()))?;
        info!(node_id = args.node_id, dir = %storage.dir().display(), "opened raft storage");
        let blob_dir = args.data_dir.join(format!("node-{}", args.node_id)).join("blobs");
        (Box::new(storage), Arc::new(FileBlobStore::new(blob_dir)))
    };

    let registry = Arc::new(InMemoryRegistry::new());
    for topic in &args.topics {
        registry.create_topic(Topic::new(topic.clone()));
    }
    for group in &args.groups {
        registry.create_consumer_group(ConsumerGroup::new(group.clone()));
    }

    let transport = HttpTransport::new(args.peer_urls(), config.coordinator.rpc_timeout)
        .context("building peer http client")?
        .with_forward_timeout(config.coordinator.commit_timeout + config.coordinator.rpc_timeout);
    let broker = Broker::new(config, storage, Arc::new(transport), registry, blobs)?;

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(node_id = args.node_id, listen = %args.listen, peers = args.peers.len(), "seqlogd listening");

    broker.start();
    axum::serve(listener, raft_router(broker.rpc_handler()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving peer rpc")?;

    info!("shutting down");
    broker.shutdown().await;
    Ok(())
}
