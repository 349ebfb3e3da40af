//! # netledger read API
//!
//! `GET /packets` lists stored packet records, `GET /metrics` exposes the
//! pipeline's Prometheus metrics.

pub mod error;
pub mod routes;

use std::future::Future;
use std::net::SocketAddr;

use netledger_core::query::QueryService;
use netledger_telemetry::MetricsRecorder;
use tokio::net::TcpListener;
use tracing::info;

pub use error::ApiError;
pub use routes::create_router;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub queries: QueryService,
    pub metrics: MetricsRecorder,
}

/// Serves the API on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("Read API listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        create_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
