//! Reader-facing HTTP endpoints.
//!
//! - `GET /api/doorCache`    - tag → membership level
//! - `GET /api/machineCache` - tag → completed trainings
//! - `GET /health/ping`      - liveness
//!
//! Both cache routes answer 503 until the first sync cycle has published a
//! snapshot, so readers never mistake "not synced yet" for "no access".

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::cache::{CacheReader, CacheSnapshot, CacheUnavailable};

pub const GENERATION_HEADER: &str = "x-cache-generation";
pub const BUILT_AT_HEADER: &str = "x-cache-built-at";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Build the router over a cache reader.
pub fn router(reader: CacheReader) -> Router {
    Router::new()
        .route("/api/doorCache", get(door_cache))
        .route("/api/machineCache", get(machine_cache))
        .route("/health/ping", get(ping))
        .with_state(reader)
}

async fn door_cache(State(reader): State<CacheReader>) -> Response {
    respond(&reader, CacheSnapshot::door_json)
}

async fn machine_cache(State(reader): State<CacheReader>) -> Response {
    respond(&reader, CacheSnapshot::machine_json)
}

async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

fn respond(reader: &CacheReader, body: fn(&CacheSnapshot) -> &[u8]) -> Response {
    match reader.current() {
        Ok(snapshot) => snapshot_response(&snapshot, body),
        Err(e @ CacheUnavailable) => {
            metrics::counter!("tagsync_cache_unavailable_total").increment(1);
            let mut resp =
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorBody { error: e.to_string() })).into_response();
            resp.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from_static("30"));
            resp
        }
    }
}

fn snapshot_response(snapshot: &Arc<CacheSnapshot>, body: fn(&CacheSnapshot) -> &[u8]) -> Response {
    let mut resp = (StatusCode::OK, body(snapshot.as_ref()).to_vec()).into_response();
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(GENERATION_HEADER, HeaderValue::from(snapshot.generation()));
    if let Ok(v) = HeaderValue::from_str(&snapshot.built_at().to_rfc3339()) {
        headers.insert(BUILT_AT_HEADER, v);
    }
    resp
}
