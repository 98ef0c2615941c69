//! The read-only HTTP/JSON query API over captured transactions
//! (spec.md §6).
//!
//! Grounded in the route shape sketched (but never implemented) by
//! `internal/httpd/routes.go` in the original mailmock, and in the
//! teacher's own `health/mod.rs`, which already reached for `axum` to serve
//! a small read-only endpoint over the SMTP server's shared state.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::store::{ListResult, TransactionStore};

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 50;

#[derive(Clone)]
struct ApiState {
    store: Arc<TransactionStore>,
}

/// Builds the `/v1/api/mailmock` router over a shared [`TransactionStore`].
pub fn router(store: Arc<TransactionStore>) -> Router {
    Router::new()
        .route("/v1/api/mailmock/", get(list_transactions))
        .route("/v1/api/mailmock/:id", get(get_transaction))
        .with_state(ApiState { store })
}

/// Binds and serves the query API until `stop` fires, then shuts down
/// gracefully (finishing in-flight requests before returning).
pub async fn run(bind_addr: &str, store: Arc<TransactionStore>, stop: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding HTTP query API on {bind_addr}"))?;

    info!("HTTP query API listening on {bind_addr}");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await
        .context("HTTP query API server error")
}

/// Parses a query parameter as `u64`, returning `400` on a non-integer value.
fn parse_u64_param(params: &HashMap<String, String>, key: &str, default: u64) -> Result<u64, Response> {
    match params.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            (StatusCode::BAD_REQUEST, format!("'{key}' must be a non-negative integer")).into_response()
        }),
    }
}

async fn list_transactions(
    State(state): State<ApiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let from = match parse_u64_param(&params, "from", 0) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let limit = match parse_u64_param(&params, "limit", DEFAULT_LIMIT) {
        Ok(v) => v.min(MAX_LIMIT),
        Err(resp) => return resp,
    };

    match state.store.list(from, limit) {
        ListResult::NotFound => (StatusCode::NOT_FOUND, "no transactions at that offset").into_response(),
        ListResult::Page { entries, is_full } => {
            if is_full {
                (StatusCode::OK, Json(entries)).into_response()
            } else {
                let total = state.store.len();
                let range = format!("{from}-{}/{total}", from + limit);
                let mut resp = (StatusCode::PARTIAL_CONTENT, Json(entries)).into_response();
                if let Ok(value) = HeaderValue::from_str(&range) {
                    resp.headers_mut().insert("Content-Range", value);
                }
                resp
            }
        }
    }
}

async fn get_transaction(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let id: u64 = match id.parse() {
        Ok(id) => id,
        Err(_) => return (StatusCode::BAD_REQUEST, "id must be a non-negative integer").into_response(),
    };

    match state.store.get(id) {
        Some(stored) => (StatusCode::OK, Json(stored)).into_response(),
        None => (StatusCode::NOT_FOUND, "no such transaction").into_response(),
    }
}
