//! File import: `POST /import?table_name=X` with a multipart `file` field.
//!
//! The upload is written to a temporary file in the spool directory and
//! loaded with DuckDB's own readers into a new table. The format comes from
//! the uploaded file's extension.

use std::io::Write;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use duckgate_engine::{DataFormat, Identifier};
use serde::Serialize;
use tracing::info;

use super::error::ApiError;
use super::request::RequestParams;
use super::AppState;

const FILE_FIELD: &str = "file";

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/import", post(import_handler))
}

#[derive(Debug, Serialize)]
struct ImportResponse {
    message: String,
    table: String,
    rows: u64,
}

async fn import_handler(
    State(state): State<AppState>,
    params: RequestParams,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let table = Identifier::parse(params.require_table_name()?)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let format = DataFormat::from_extension(&filename)?;
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        upload = Some((format, data));
        break;
    }
    let (format, data) = upload
        .ok_or_else(|| ApiError::bad_request("multipart field 'file' is missing"))?;

    let options = state.config.export_options();
    let name = table.to_string();
    let rows = state
        .run_store(move |store| {
            let mut file = options.temp_file(format)?;
            file.write_all(&data)?;
            file.flush()?;
            let path = file.into_temp_path();
            store.import_file(table.as_str(), &path, format)
        })
        .await?;

    info!(table = %name, rows, format = %format, "Import complete");
    let body = ImportResponse {
        message: format!("Data imported to table {} successfully", name),
        table: name,
        rows,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{header, Request};
    use duckgate_engine::TableStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "duckgate-test-boundary";

    fn multipart_request(uri: &str, filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{c}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = filename,
            c = content
        );
        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn app_with_spool(dir: &std::path::Path) -> Router {
        let store = Arc::new(TableStore::open_in_memory().unwrap());
        let config = ServerConfig {
            spool_dir: dir.to_path_buf(),
            ..Default::default()
        };
        super::super::create_router(AppState::new(store, config))
    }

    async fn json_of(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_import_csv_creates_table() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_spool(dir.path());

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/import?table_name=people",
                "people.csv",
                "id,name\n1,Alice\n2,Bob\n",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_of(response).await;
        assert_eq!(json["rows"], 2);
        assert_eq!(json["table"], "people");

        // The uploaded copy is gone once the import finishes.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let response = app
            .oneshot(
                Request::get("/tables/people?order_by=id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = json_of(response).await;
        assert_eq!(json["data"][1]["name"], "Bob");
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let response = app_with_spool(dir.path())
            .oneshot(multipart_request("/import?table_name=t", "data.xlsx", "x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["code"], "UNSUPPORTED_FORMAT");
    }

    #[tokio::test]
    async fn test_import_requires_table_name() {
        let dir = tempfile::tempdir().unwrap();
        let response = app_with_spool(dir.path())
            .oneshot(multipart_request("/import", "data.csv", "a\n1\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_import_into_existing_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_spool(dir.path());
        let first = app
            .clone()
            .oneshot(multipart_request("/import?table_name=t", "a.ndjson", "{\"a\":1}\n"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .oneshot(multipart_request("/import?table_name=t", "a.ndjson", "{\"a\":2}\n"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(second).await["code"], "TABLE_ALREADY_EXISTS");
    }
}
