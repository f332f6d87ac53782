//! HTTP surface: the LocalSend v2 protocol endpoints plus the local
//! control namespace.

pub mod control;
pub mod protocol;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;

use lanbeam_core::Error;

use crate::state::AppState;

/// Build the daemon router. Wrong methods yield 405, unknown paths 404.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(protocol::routes())
        .nest(
            "/api/lanbeam/v1",
            control::routes().layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Map an error to its protocol status code and exact JSON body.
pub(crate) fn error_response(err: &Error) -> Response {
    let status =
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
