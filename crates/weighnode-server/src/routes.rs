//! HTTP route handlers.
//!
//! # Endpoints
//!
//! ### `GET /`
//! Returns a fixed plaintext banner pointing at `/data`.
//!
//! ### `GET /data`
//! Samples the load cell and returns `{"weight":<n>}` (with `"id"` when the
//! node has a bin identifier). Always `200 OK`: a missing sensor shows up as
//! `"weight":0`, not as an HTTP error.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{debug, error};
use weighnode_core::endpoints::{
    Response as NodeResponse, CONTENT_TYPE_JSON, DATA_PATH, STATUS_PATH,
};
use weighnode_core::encoder::FALLBACK_BODY;

use crate::AppState;

/// Create the Axum router with both node routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(STATUS_PATH, get(status_handler))
        .route(DATA_PATH, get(data_handler))
        .with_state(state)
}

/// Handler for `/`.
async fn status_handler(State(service): State<AppState>) -> Response {
    to_axum(service.status())
}

/// Handler for `/data`.
///
/// The sensor cycle blocks (readiness wait plus averaging), so it runs on the
/// blocking pool instead of an async worker.
async fn data_handler(State(service): State<AppState>) -> Response {
    match tokio::task::spawn_blocking(move || service.data()).await {
        Ok(response) => {
            debug!("Served {}", response.body);
            to_axum(response)
        }
        Err(e) => {
            error!("Data request aborted: {}", e);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, CONTENT_TYPE_JSON)],
                FALLBACK_BODY,
            )
                .into_response()
        }
    }
}

fn to_axum(response: NodeResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    (
        status,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}
