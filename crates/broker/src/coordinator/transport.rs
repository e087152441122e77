//! # transport
//!
//! why: carry raft rpcs between nodes without tying the coordinator to http
//! relations: RaftTransport is called by ClusterCoordinator; RpcHandler is what a node exposes
//! what: the two rpc traits, TransportError, reqwest-based HttpTransport, wire envelopes

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use raft_core::{AppendEntriesRequest, AppendEntriesResponse, NodeId, VoteRequest, VoteResponse};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use super::RaftStatus;
use crate::error::CoordinatorError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(NodeId),

    #[error("rpc to peer {0} timed out")]
    Timeout(NodeId),

    #[error("http error: {0}")]
    Http(String),

    /// The peer answered with a coordinator error of its own.
    #[error("peer rejected the request: {0}")]
    Remote(CoordinatorError),

    #[error("malformed rpc body: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Outgoing side: how this node reaches its peers.
#[async_trait]
pub trait RaftTransport: Send + Sync {
    async fn request_vote(
        &self,
        peer: NodeId,
        request: VoteRequest,
    ) -> Result<VoteResponse, TransportError>;

    async fn append_entries(
        &self,
        peer: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError>;

    /// Ask `peer` (the leader) for a confirmed read index.
    async fn read_index(&self, peer: NodeId) -> Result<u64, TransportError>;

    /// Hand an encoded proposal to `peer`; the reply is an encoded [`ForwardReply`].
    async fn forward(&self, peer: NodeId, proposal: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// Incoming side: what a node answers to its peers.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn request_vote(&self, request: VoteRequest) -> Result<VoteResponse, CoordinatorError>;

    async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, CoordinatorError>;

    async fn read_index(&self) -> Result<u64, CoordinatorError>;

    async fn forward(&self, proposal: Vec<u8>) -> Vec<u8>;

    fn status(&self) -> RaftStatus;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadIndexResponse {
    pub read_index: u64,
}

/// Result of a forwarded proposal as it travels back from the leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardReply<T> {
    Ok(T),
    Err(CoordinatorError),
}

impl<T> From<Result<T, CoordinatorError>> for ForwardReply<T> {
    fn from(result: Result<T, CoordinatorError>) -> Self {
        match result {
            Ok(output) => Self::Ok(output),
            Err(err) => Self::Err(err),
        }
    }
}

impl<T> From<ForwardReply<T>> for Result<T, CoordinatorError> {
    fn from(reply: ForwardReply<T>) -> Self {
        match reply {
            ForwardReply::Ok(output) => Ok(output),
            ForwardReply::Err(err) => Err(err),
        }
    }
}

/// Encode the reply to a forwarded proposal. An output that fails to encode
/// goes back as an `Internal` error instead of an empty body.
pub(crate) fn encode_forward_reply<T: Serialize>(
    node_id: NodeId,
    result: Result<T, CoordinatorError>,
) -> Vec<u8> {
    match serde_json::to_vec(&ForwardReply::from(result)) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(node_id, error = %e, "could not encode forward reply");
            let reply: ForwardReply<()> =
                ForwardReply::Err(CoordinatorError::internal(format!("unencodable forward reply: {e}")));
            serde_json::to_vec(&reply).unwrap_or_else(|_| {
                br#"{"err":{"kind":"internal","reason":"unencodable forward reply"}}"#.to_vec()
            })
        }
    }
}

/// Peer transport over the `/raft/*` routes served by `server::raft_router`.
pub struct HttpTransport {
    client: reqwest::Client,
    /// Base url per peer, e.g. `http://10.0.0.2:7001`
    peers: HashMap<NodeId, String>,
    /// The leader holds a forward open until the proposal commits, so it
    /// gets a longer budget than the other rpcs.
    forward_timeout: Duration,
}

impl HttpTransport {
    pub fn new(peers: HashMap<NodeId, String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            client,
            peers,
            forward_timeout: timeout,
        })
    }

    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }

    fn url(&self, peer: NodeId, path: &str) -> Result<String, TransportError> {
        let base = self
            .peers
            .get(&peer)
            .ok_or(TransportError::Unreachable(peer))?;
        Ok(format!("{}{}", base.trim_end_matches('/'), path))
    }

    async fn post_json<Req, Resp>(
        &self,
        peer: NodeId,
        path: &str,
        body: &Req,
    ) -> Result<Resp, TransportError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.url(peer, path)?;
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| send_error(peer, e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        if status.is_success() {
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            match serde_json::from_slice::<CoordinatorError>(&bytes) {
                Ok(err) => Err(TransportError::Remote(err)),
                Err(_) => Err(TransportError::Http(format!("{path} returned {status}"))),
            }
        }
    }
}

fn send_error(peer: NodeId, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(peer)
    } else if err.is_connect() {
        TransportError::Unreachable(peer)
    } else {
        TransportError::Http(err.to_string())
    }
}

#[async_trait]
impl RaftTransport for HttpTransport {
    async fn request_vote(
        &self,
        peer: NodeId,
        request: VoteRequest,
    ) -> Result<VoteResponse, TransportError> {
        self.post_json(peer, "/raft/request-vote", &request).await
    }

    async fn append_entries(
        &self,
        peer: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError> {
        self.post_json(peer, "/raft/append-entries", &request).await
    }

    async fn read_index(&self, peer: NodeId) -> Result<u64, TransportError> {
        let response: ReadIndexResponse = self
            .post_json(peer, "/raft/read-index", &serde_json::Value::Null)
            .await?;
        Ok(response.read_index)
    }

    async fn forward(&self, peer: NodeId, proposal: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let url = self.url(peer, "/raft/forward")?;
        let response = self
            .client
            .post(url)
            .timeout(self.forward_timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(proposal)
            .send()
            .await
            .map_err(|e| send_error(peer, e))?;
        if !response.status().is_success() {
            return Err(TransportError::Http(format!(
                "/raft/forward returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_reply_matches_ok_err_envelope() {
        let ok: ForwardReply<u64> = Ok(7).into();
        assert_eq!(serde_json::to_value(&ok).unwrap(), serde_json::json!({ "ok": 7 }));

        let err: ForwardReply<u64> = Err(CoordinatorError::NoLeaderAvailable).into();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["err"]["kind"], "no_leader_available");
    }

    #[test]
    fn unencodable_output_becomes_internal_error() {
        // json object keys must be strings
        let output = HashMap::from([((1u8, 2u8), 3u8)]);
        let bytes = encode_forward_reply(1, Ok(output));
        let reply: ForwardReply<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(
            reply,
            ForwardReply::Err(CoordinatorError::Internal { .. })
        ));
    }

    /// Serves `/raft/forward` with a reply that arrives after `delay`.
    async fn slow_leader(delay: Duration) -> String {
        use axum::routing::post;

        let app = axum::Router::new().route(
            "/raft/forward",
            post(move || async move {
                tokio::time::sleep(delay).await;
                r#"{"ok":1}"#
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn forward_outlives_the_rpc_timeout() {
        let base = slow_leader(Duration::from_millis(800)).await;
        let peers = HashMap::from([(2, base)]);

        let short = HttpTransport::new(peers.clone(), Duration::from_millis(300)).unwrap();
        assert!(matches!(
            short.forward(2, b"{}".to_vec()).await,
            Err(TransportError::Timeout(2))
        ));

        let patient = HttpTransport::new(peers, Duration::from_millis(300))
            .unwrap()
            .with_forward_timeout(Duration::from_secs(3));
        let reply = patient.forward(2, b"{}".to_vec()).await.unwrap();
        assert_eq!(reply, br#"{"ok":1}"#.to_vec());
    }

    #[test]
    fn unknown_peer_is_unreachable() {
        let transport = HttpTransport::new(HashMap::new(), Duration::from_secs(1)).unwrap();
        assert!(matches!(
            transport.url(9, "/raft/status"),
            Err(TransportError::Unreachable(9))
        ));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let peers = HashMap::from([(2, "http://127.0.0.1:7002/".to_string())]);
        let transport = HttpTransport::new(peers, Duration::from_secs(1)).unwrap();
        assert_eq!(
            transport.url(2, "/raft/forward").unwrap(),
            "http://127.0.0.1:7002/raft/forward"
        );
    }
}
