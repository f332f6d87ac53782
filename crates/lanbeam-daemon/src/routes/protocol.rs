//! LocalSend v2 protocol endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use lanbeam_core::Error;
use lanbeam_proto::{parse_prepare_upload, parse_version_message};

use crate::routes::error_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/localsend/v2/register", post(register))
        .route("/api/localsend/v2/prepare-upload", post(prepare_upload))
        .route("/api/localsend/v2/upload", post(upload))
        .route("/api/localsend/v2/cancel", post(cancel))
}

/// POST /register — a peer announces itself over HTTP.
async fn register(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Response {
    let peer = match parse_version_message(&body) {
        Ok(peer) => peer,
        Err(err) => {
            debug!(from = %addr, error = %err, "bad register body");
            return error_response(&Error::BadRequest);
        }
    };
    state.receiver.register_peer(peer, addr.ip()).await;
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

#[derive(Deserialize)]
struct PinQuery {
    pin: Option<String>,
}

/// POST /prepare-upload — admission control and session minting.
async fn prepare_upload(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<PinQuery>,
    body: Bytes,
) -> Response {
    let request = match parse_prepare_upload(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!(from = %addr, error = %err, "bad prepare-upload body");
            return error_response(&Error::BadRequest);
        }
    };
    match state
        .receiver
        .prepare_upload(request, query.pin.as_deref(), addr.ip())
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// POST /upload — stream one file body into the receiver.
async fn upload(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    body: Body,
) -> Response {
    let (Some(session_id), Some(file_id), Some(token)) = (
        non_empty(query.get("sessionId")),
        non_empty(query.get("fileId")),
        non_empty(query.get("token")),
    ) else {
        return error_response(&Error::MissingParameters);
    };

    let stream = body
        .into_data_stream()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));

    match state
        .receiver
        .upload(session_id, file_id, token, addr.ip(), stream)
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(&err),
    }
}

/// POST /cancel — tear a session down; unknown sessions still return 200.
async fn cancel(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(session_id) = non_empty(query.get("sessionId")) else {
        return error_response(&Error::MissingParameters);
    };
    state.receiver.cancel(session_id).await;
    StatusCode::OK.into_response()
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}
