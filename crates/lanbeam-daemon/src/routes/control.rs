//! Local control surface: trigger a scan, list discovered peers, and
//! initiate a send.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;

use lanbeam_core::Error;
use lanbeam_proto::PeerEndpoint;

use crate::routes::error_response;
use crate::sender::{collect_file, OutgoingFile};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/scan", post(scan))
        .route("/devices", get(devices))
        .route("/send", post(send))
}

/// POST /scan — queue an immediate discovery sweep. Coalesced while one
/// is already pending.
async fn scan(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.discovery.scan_now();
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct DevicesQuery {
    /// Unix seconds; only peers seen at or after this instant.
    since: Option<i64>,
}

/// GET /devices — discovered peers, optionally filtered by last-seen.
async fn devices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DevicesQuery>,
) -> Json<serde_json::Value> {
    let since: Option<DateTime<Utc>> = query
        .since
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    let devices = state.registry.list_since(since);
    Json(json!({ "devices": devices }))
}

#[derive(Deserialize)]
struct SendFileEntry {
    path: PathBuf,
    #[serde(rename = "fileType")]
    file_type: Option<String>,
}

#[derive(Deserialize)]
struct SendRequest {
    /// Peer fingerprint, falling back to alias.
    target: String,
    files: Vec<SendFileEntry>,
    pin: Option<String>,
}

/// POST /send — resolve a discovered peer and stream files to it.
async fn send(State(state): State<Arc<AppState>>, Json(request): Json<SendRequest>) -> Response {
    let Some(device) = state.registry.find(&request.target) else {
        return error_response(&Error::NotFound(request.target));
    };
    let IpAddr::V4(address) = device.address else {
        return error_response(&Error::Internal("peer has no IPv4 address".to_string()));
    };
    let peer = PeerEndpoint::new(address, device.info.port, device.info.protocol);

    let mut outgoing: Vec<OutgoingFile> = Vec::with_capacity(request.files.len());
    for entry in &request.files {
        match collect_file(&entry.path, entry.file_type.as_deref()).await {
            Ok(file) => outgoing.push(file),
            Err(err) => return error_response(&err),
        }
    }
    if outgoing.is_empty() {
        return error_response(&Error::BadRequest);
    }

    match state
        .sender
        .send_files(&peer, outgoing, request.pin.as_deref())
        .await
    {
        Ok(report) => Json(json!({
            "sessionId": report.session_id,
            "files": report.files_sent,
        }))
        .into_response(),
        Err(err) => error_response(&err),
    }
}
