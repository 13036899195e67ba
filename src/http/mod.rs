//! HTTP/JSON façade over the store.
//!
//! A thin translator with no logic of its own beyond unit conversion
//! (TTL seconds to milliseconds) and status mapping:
//!
//! - `GET /kv/{key}` -> `{key, value, found}`, 404 when not found
//! - `POST|PUT /kv/{key}` with `{value, ttl?}` -> `{"status":"OK"}`
//! - `DELETE /kv/{key}` -> `{deleted}`, 404 when the key was absent
//! - `GET /health` -> `{"status":"healthy","stats":{...}}`

use crate::storage::VersionedStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SetRequest {
    value: String,
    /// TTL in seconds; absent or zero means no expiration.
    #[serde(default)]
    ttl: i64,
}

#[derive(Debug, Serialize)]
struct GetResponse {
    key: String,
    value: String,
    found: bool,
}

/// Builds the façade router over `store`.
pub fn router(store: Arc<VersionedStore>) -> Router {
    Router::new()
        .route(
            "/kv/:key",
            get(get_key).post(set_key).put(set_key).delete(delete_key),
        )
        .route("/health", get(health))
        .with_state(store)
}

/// Serves the façade on `addr` until the shutdown signal flips.
pub async fn serve(
    store: Arc<VersionedStore>,
    addr: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP facade listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&stop| stop).await;
        })
        .await
}

async fn get_key(
    State(store): State<Arc<VersionedStore>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<GetResponse>) {
    let stored = store.get(&Bytes::from(key.clone()));
    let found = stored.is_some();
    let value = stored
        .map(|v| String::from_utf8_lossy(&v).into_owned())
        .unwrap_or_default();

    let status = if found {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    (status, Json(GetResponse { key, value, found }))
}

async fn set_key(
    State(store): State<Arc<VersionedStore>>,
    Path(key): Path<String>,
    Json(request): Json<SetRequest>,
) -> Json<serde_json::Value> {
    store.set(
        Bytes::from(key),
        Bytes::from(request.value),
        request.ttl.saturating_mul(1000),
    );
    Json(json!({ "status": "OK" }))
}

async fn delete_key(
    State(store): State<Arc<VersionedStore>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let deleted = store.delete(&Bytes::from(key));

    let status = if deleted {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    (status, Json(json!({ "deleted": deleted })))
}

async fn health(State(store): State<Arc<VersionedStore>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "stats": store.stats(),
    }))
}
