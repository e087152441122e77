//! # blob
//!
//! why: keep payload bytes out of the replicated log; messages only carry a key
//! relations: written by TopicLog::publish, read by TopicLog::read_payload
//! what: BlobStore trait, InMemoryBlobStore, FileBlobStore

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, BrokerResult};

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BrokerResult<()>;

    /// Fails `NotFound` if nothing is stored under `key`.
    async fn get(&self, key: &str) -> BrokerResult<Bytes>;
}

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Bytes,
    content_type: String,
}

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, StoredBlob>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.get(key).map(|b| b.content_type.clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BrokerResult<()> {
        self.blobs.insert(
            key.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> BrokerResult<Bytes> {
        self.blobs
            .get(key)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| blob_not_found(key))
    }
}

/// Blobs as files under a root directory, with a json sidecar per blob.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobMeta {
    content_type: String,
    size: u64,
}

impl FileBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Keys are relative paths made of plain components only.
    fn path_for(&self, key: &str) -> BrokerResult<PathBuf> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(BrokerError::InvalidArgument(format!(
                "blob key '{key}' must be a relative path"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn sidecar(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".meta.json");
    PathBuf::from(name)
}

fn blob_not_found(key: &str) -> BrokerError {
    BrokerError::NotFound {
        kind: "blob",
        id: key.to_string(),
    }
}

fn io_error(key: &str, err: std::io::Error) -> BrokerError {
    BrokerError::Blob(format!("{key}: {err}"))
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> BrokerResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e))?;
        }
        let meta = BlobMeta {
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
        };
        let meta = serde_json::to_vec(&meta).map_err(|e| BrokerError::Blob(e.to_string()))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| io_error(key, e))?;
        tokio::fs::write(sidecar(&path), meta)
            .await
            .map_err(|e| io_error(key, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> BrokerResult<Bytes> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(blob_not_found(key)),
            Err(e) => Err(io_error(key, e)),
        }
    }
}
