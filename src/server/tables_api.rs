//! Table endpoints: list, create, drop, schema, export and bulk insert.
//!
//! Tables are re-resolved by name on every request; nothing about a table is
//! cached between requests.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use duckgate_engine::{
    codec, ColumnDef, DataFormat, EngineError, Identifier, NamedParams, QuerySource,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::info;

use super::error::ApiError;
use super::export::{self, ExportRequest};
use super::request::RequestParams;
use super::AppState;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/tables", get(list_tables_handler).post(create_table_handler))
        .route("/create_table", post(create_table_legacy_handler))
        .route(
            "/tables/:name",
            get(export_table_handler)
                .post(insert_rows_handler)
                .delete(drop_table_handler),
        )
        .route("/tables/:name/schema", get(table_info_handler))
        .route("/table/:name", get(table_info_handler))
        .route("/table/:name/export", get(export_table_handler))
}

// ─── Request / Response types ────────────────────────────────────────────────

/// Body of `POST /tables`: column name to type, in declaration order.
#[derive(Debug, Deserialize)]
struct CreateTableRequest {
    columns: Map<String, JsonValue>,
}

/// Body of `POST /create_table`.
#[derive(Debug, Deserialize)]
struct LegacyCreateTableRequest {
    name: String,
    schema: Map<String, JsonValue>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct TablesResponse {
    tables: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TableInfoResponse {
    name: String,
    schema: Vec<ColumnDef>,
    row_count: u64,
}

#[derive(Debug, Serialize)]
struct InsertResponse {
    inserted: u64,
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn list_tables_handler(
    State(state): State<AppState>,
) -> Result<Json<TablesResponse>, ApiError> {
    let tables = state.run_store(|store| store.list_tables()).await?;
    Ok(Json(TablesResponse { tables }))
}

async fn create_table_handler(
    State(state): State<AppState>,
    params: RequestParams,
    body: Bytes,
) -> Result<Response, ApiError> {
    let name = params.require_table_name()?.to_string();
    let request: CreateTableRequest = parse_json(&body)?;
    create_table(&state, name, request.columns).await
}

async fn create_table_legacy_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: LegacyCreateTableRequest = parse_json(&body)?;
    create_table(&state, request.name, request.schema).await
}

async fn drop_table_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let table = name.clone();
    state.run_store(move |store| store.drop_table(&table)).await?;
    Ok(Json(MessageResponse {
        message: format!("Table {} dropped successfully", name),
    }))
}

async fn table_info_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TableInfoResponse>, ApiError> {
    let (schema, row_count) = state
        .run_store(move |store| {
            let schema = store.get_schema(&name)?;
            let rows = store.row_count(&schema.name)?;
            Ok((schema, rows))
        })
        .await?;
    Ok(Json(TableInfoResponse {
        name: schema.name,
        schema: schema.columns,
        row_count,
    }))
}

async fn export_table_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    params: RequestParams,
) -> Result<Response, ApiError> {
    let request = ExportRequest {
        source: QuerySource::Table(Identifier::parse(&name)?),
        spec: params.query_spec()?,
        params: NamedParams::new(),
        format: params.format()?,
    };
    info!(table = %name, format = %request.format, "Exporting table");
    export::export(&state, request).await
}

async fn insert_rows_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InsertResponse>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let format = DataFormat::from_media_type(content_type).ok_or_else(|| {
        ApiError::UnsupportedMediaType(if content_type.is_empty() {
            "missing Content-Type".to_string()
        } else {
            content_type.to_string()
        })
    })?;

    let table = name.clone();
    let inserted = state
        .run_store(move |store| {
            let rows = codec::decode_verbatim(body, format)?;
            store.insert_rows(&table, &rows)
        })
        .await?;
    info!(table = %name, rows = inserted, format = %format, "Bulk insert complete");
    Ok(Json(InsertResponse { inserted }))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn create_table(
    state: &AppState,
    name: String,
    columns: Map<String, JsonValue>,
) -> Result<Response, ApiError> {
    let columns = column_types(columns)?;
    let table = name.clone();
    state
        .run_store(move |store| store.create_table(&table, &columns))
        .await?;
    let body = MessageResponse {
        message: format!("Table {} created successfully", name),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Column definitions from a JSON object whose values are type names.
fn column_types(columns: Map<String, JsonValue>) -> Result<Vec<(String, String)>, ApiError> {
    columns
        .into_iter()
        .map(|(name, ty)| match ty {
            JsonValue::String(ty) => Ok((name, ty)),
            other => Err(EngineError::InvalidSchema(format!(
                "type of column '{}' must be a string, got {}",
                name, other
            ))
            .into()),
        })
        .collect()
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))
}
