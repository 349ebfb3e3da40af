//! HTTP route handlers.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use netledger_core::packet::StoredPacketRecord;
use serde::Deserialize;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PacketParams {
    pub limit: Option<i64>,
    pub sort: Option<String>,
}

/// HTTP request logging middleware.
///
/// Logs each request as "IP METHOD PATH - STATUS".
async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".into());
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!("{} {} {} - {}", peer, method, uri, response.status().as_u16());
    response
}

/// `GET /packets?limit=<int>&sort=<column>`
async fn list_packets(
    State(state): State<AppState>,
    params: Result<Query<PacketParams>, QueryRejection>,
) -> Result<Json<Vec<StoredPacketRecord>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let records = state
        .queries
        .get_packets(params.limit.unwrap_or(0), params.sort.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(records))
}

/// `GET /metrics` in the Prometheus text format.
async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .gather_metrics()
        .map_err(|e| ApiError::Metrics(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/packets", get(list_packets))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}
