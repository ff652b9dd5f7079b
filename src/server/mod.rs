//! HTTP server for duckgate
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness and store status |
//! | `GET` | `/tables` | List tables |
//! | `POST` | `/tables?table_name=X` | Create a table |
//! | `POST` | `/create_table` | Create a table (`{"name", "schema"}` body) |
//! | `GET` | `/tables/{name}` | Export a table |
//! | `POST` | `/tables/{name}` | Bulk insert rows |
//! | `DELETE` | `/tables/{name}` | Drop a table |
//! | `GET` | `/tables/{name}/schema` | Table columns and row count |
//! | `GET` | `/table/{name}` | Same as `/tables/{name}/schema` |
//! | `GET` | `/table/{name}/export` | Same as `GET /tables/{name}` |
//! | `POST` | `/sql` | Run a SQL statement and export the result |
//! | `POST` | `/execute` | Same as `/sql` |
//! | `POST` | `/import?table_name=X` | Create a table from an uploaded file |
//! | `GET` | `/test` | Run the smoke-test suite on a scratch database |

pub mod error;
mod export;
mod import_api;
mod request;
mod sql_api;
mod tables_api;

pub use error::{ApiError, ErrorResponse};
pub use request::RequestParams;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use duckgate_engine::{EngineError, TableStore};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::diagnostics;
use crate::error::{DuckgateError, Result};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TableStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<TableStore>, config: ServerConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Run `op` against the store on the blocking pool, bounded by the
    /// configured query timeout.
    ///
    /// On timeout the request fails with `QueryTimeout`; the statement itself
    /// runs to completion in the background and its result is discarded.
    pub(crate) async fn run_store<T, F>(&self, op: F) -> std::result::Result<T, ApiError>
    where
        F: FnOnce(&TableStore) -> duckgate_engine::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let timeout = self.config.query_timeout;
        let task = tokio::task::spawn_blocking(move || op(&store));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join)) => Err(ApiError::Internal(format!("store task failed: {}", join))),
            Err(_) => {
                let timeout_ms = self.config.query_timeout_ms();
                warn!(timeout_ms, "Store operation timed out");
                Err(EngineError::QueryTimeout { timeout_ms }.into())
            }
        }
    }
}

/// Build the router with every endpoint.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.upload_limit_bytes();
    Router::new()
        .route("/health", get(health_handler))
        .route("/test", get(diagnostics_handler))
        .merge(tables_api::routes())
        .merge(sql_api::routes())
        .merge(import_api::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind, serve until Ctrl-C, then close the store.
pub async fn serve(config: ServerConfig, store: Arc<TableStore>) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            DuckgateError::Server(format!(
                "port {} is already in use. Fix: pass --port or set DUCKGATE_PORT, \
                 or stop the existing process.",
                config.port
            ))
        } else {
            DuckgateError::Server(format!("failed to bind {}: {}", addr, e))
        }
    })?;

    let state = AppState::new(store.clone(), config);
    let app = create_router(state);

    info!(addr = %addr, "Starting HTTP server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let healthy = state.store.is_open();
    let status = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status)).into_response()
}

async fn diagnostics_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<diagnostics::SmokeReport>, ApiError> {
    let options = state.config.export_options();
    let report = tokio::task::spawn_blocking(move || diagnostics::run_smoke_tests(&options))
        .await
        .map_err(|e| ApiError::Internal(format!("smoke tests failed to run: {}", e)))?;
    info!(passed = report.passed, failed = report.failed, "Smoke tests finished");
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store = Arc::new(TableStore::open_in_memory().unwrap());
        AppState::new(store, ServerConfig::default())
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_health_reports_closed_store() {
        let state = test_state();
        state.store.close();
        let response = create_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_run_store_times_out() {
        let store = Arc::new(TableStore::open_in_memory().unwrap());
        let config = ServerConfig {
            query_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let state = AppState::new(store, config);

        let err = state
            .run_store(|_| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Engine(EngineError::QueryTimeout { timeout_ms: 20 })
        ));
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let state = test_state();
        state.store.close();
        let response = create_router(state)
            .oneshot(Request::delete("/tables/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_smoke_endpoint_passes() {
        let response = create_router(test_state())
            .oneshot(Request::get("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["failed"], 0, "{}", json);
        assert!(json["passed"].as_u64().unwrap() > 0);
    }
}
