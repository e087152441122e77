//! HTTP side of the peer rpc surface, the counterpart of `HttpTransport`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use raft_core::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};

use super::transport::{ReadIndexResponse, RpcHandler};
use super::RaftStatus;
use crate::error::CoordinatorError;

type Handler = Arc<dyn RpcHandler>;

/// Coordinator errors go back as their own json so the caller can decode
/// them into the same variant.
struct RpcError(CoordinatorError);

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoordinatorError::NotLeader { .. } => StatusCode::MISDIRECTED_REQUEST,
            CoordinatorError::NoLeaderAvailable | CoordinatorError::Shutdown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CoordinatorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CoordinatorError::LogConflict { .. }
            | CoordinatorError::Storage { .. }
            | CoordinatorError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0)).into_response()
    }
}

impl From<CoordinatorError> for RpcError {
    fn from(err: CoordinatorError) -> Self {
        RpcError(err)
    }
}

pub fn raft_router(handler: Handler) -> Router {
    Router::new()
        .route("/raft/append-entries", post(append_entries))
        .route("/raft/request-vote", post(request_vote))
        .route("/raft/status", get(status))
        .route("/raft/read-index", post(read_index))
        .route("/raft/forward", post(forward))
        .with_state(handler)
}

async fn append_entries(
    State(handler): State<Handler>,
    Json(request): Json<AppendEntriesRequest>,
) -> Result<Json<AppendEntriesResponse>, RpcError> {
    Ok(Json(handler.append_entries(request).await?))
}

async fn request_vote(
    State(handler): State<Handler>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, RpcError> {
    Ok(Json(handler.request_vote(request).await?))
}

async fn status(State(handler): State<Handler>) -> Json<RaftStatus> {
    Json(handler.status())
}

async fn read_index(State(handler): State<Handler>) -> Result<Json<ReadIndexResponse>, RpcError> {
    let read_index = handler.read_index().await?;
    Ok(Json(ReadIndexResponse { read_index }))
}

async fn forward(State(handler): State<Handler>, body: Bytes) -> impl IntoResponse {
    let reply = handler.forward(body.to_vec()).await;
    ([(header::CONTENT_TYPE, "application/json")], reply)
}
