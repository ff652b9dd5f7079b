//! Raw SQL endpoint.
//!
//! `POST /sql` (and `POST /execute`) runs one statement with `$name`
//! parameters bound by the store. The statement becomes a subquery when the
//! query string also asks for select/filter/pivot/order/paging steps.

use axum::{body::Bytes, extract::State, response::Response, routing::post, Router};
use duckgate_engine::{DataFormat, NamedParams, QuerySource, Value};
use serde::Deserialize;
use serde_json::Map;
use tracing::info;

use super::error::ApiError;
use super::export::{self, ExportRequest};
use super::request::RequestParams;
use super::AppState;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/sql", post(execute_sql_handler))
        .route("/execute", post(execute_sql_handler))
}

/// SQL request body.
///
/// | Field | Type | Default | Description |
/// |-------|------|---------|-------------|
/// | `sql` | `String` | (required) | One SQL statement |
/// | `params` | `object` | `{}` | Values for `$name` placeholders |
/// | `format` | `String?` | `json` | Export format; falls back to the `format` query parameter |
#[derive(Debug, Deserialize)]
struct SqlRequest {
    sql: String,
    #[serde(default)]
    params: Map<String, serde_json::Value>,
    #[serde(default)]
    format: Option<String>,
}

async fn execute_sql_handler(
    State(state): State<AppState>,
    query: RequestParams,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: SqlRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))?;
    if request.sql.trim().is_empty() {
        return Err(ApiError::bad_request("'sql' must not be empty"));
    }

    let format = match request.format.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse::<DataFormat>()?,
        _ => query.format()?,
    };
    let params: NamedParams = request
        .params
        .iter()
        .map(|(name, value)| (name.clone(), Value::from_json(value)))
        .collect();

    info!(format = %format, params = params.len(), "Executing SQL");
    let request = ExportRequest {
        source: QuerySource::Subquery(request.sql),
        spec: query.query_spec()?,
        params,
        format,
    };
    export::export(&state, request).await
}
