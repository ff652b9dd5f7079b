//! Turning a query into an export response.
//!
//! File-backed artifacts are streamed from disk. The response body owns the
//! temporary file, so it is deleted once the body is dropped: after the last
//! chunk is sent, on a write error, or when the client goes away.

use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use duckgate_engine::{
    codec, DataFormat, EngineError, ExportArtifact, NamedParams, QuerySource, QuerySpec,
    TableStore,
};
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::error::ApiError;
use super::AppState;
use crate::config::ExportEngine;

/// One export request: what to read, how to shape it, and how to encode it.
#[derive(Debug, Clone)]
pub(crate) struct ExportRequest {
    pub source: QuerySource,
    pub spec: QuerySpec,
    pub params: NamedParams,
    pub format: DataFormat,
}

/// Run `request` on the blocking pool and build the response.
pub(crate) async fn export(state: &AppState, request: ExportRequest) -> Result<Response, ApiError> {
    let format = request.format;
    let engine = state.config.export_engine;
    let options = state.config.export_options();

    let artifact = state
        .run_store(move |store| produce(store, &request, engine, &options))
        .await?;
    artifact_response(artifact, format).await
}

fn produce(
    store: &TableStore,
    request: &ExportRequest,
    engine: ExportEngine,
    options: &codec::ExportOptions,
) -> duckgate_engine::Result<ExportArtifact> {
    if let QuerySource::Table(table) = &request.source {
        // Resolve first so a missing table is a 404 rather than a query error.
        store.get_schema(table.as_str())?;
    }

    // COPY cannot take bound parameters; those exports go through the codec.
    let native = engine == ExportEngine::Native
        && request.format != DataFormat::Json
        && request.params.is_empty();
    if native {
        let path = options.temp_file(request.format)?.into_temp_path();
        store.export_query(
            &request.source,
            &request.spec,
            &request.params,
            &path,
            request.format,
        )?;
        debug!(format = %request.format, "Exported with COPY");
        return Ok(ExportArtifact::spooled(path, request.format));
    }

    let rows = store.query(&request.source, &request.spec, &request.params)?;
    codec::export(&rows, request.format, options)
}

/// Build the HTTP response for an encoded export.
pub(crate) async fn artifact_response(
    artifact: ExportArtifact,
    format: DataFormat,
) -> Result<Response, ApiError> {
    let disposition = (format != DataFormat::Json).then(|| attachment(artifact.filename()));

    let mut response = match artifact {
        ExportArtifact::Inline {
            body, media_type, ..
        } => ([(header::CONTENT_TYPE, media_type)], body).into_response(),
        ExportArtifact::Spooled {
            file, media_type, ..
        } => {
            let handle = tokio::fs::File::open(&file).await?;
            let len = handle.metadata().await?.len();
            // The closure owns the TempPath; dropping the body removes the file.
            let stream = ReaderStream::new(handle).map(move |chunk| {
                let _spooled = &file;
                chunk
            });
            let mut response =
                ([(header::CONTENT_TYPE, media_type)], Body::from_stream(stream)).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
            response
        }
    };

    if let Some(value) = disposition.transpose()? {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

fn attachment(filename: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|e| ApiError::from(EngineError::encoding(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_inline_json_has_no_disposition() {
        let artifact = ExportArtifact::Inline {
            body: Bytes::from_static(b"{}"),
            media_type: "application/json",
            filename: "result.json".into(),
        };
        let response = artifact_response(artifact, DataFormat::Json).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
    }

    #[tokio::test]
    async fn test_spooled_file_lives_as_long_as_the_body() {
        let dir = tempfile::tempdir().unwrap();
        let file = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile_in(dir.path())
            .unwrap();
        std::fs::write(file.path(), "id\n1\n").unwrap();
        let artifact = ExportArtifact::spooled(file.into_temp_path(), DataFormat::Csv);

        let response = artifact_response(artifact, DataFormat::Csv).await.unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"result.csv\""
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"id\n1\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unread_body_still_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = tempfile::Builder::new().tempfile_in(dir.path()).unwrap();
        std::fs::write(file.path(), "payload").unwrap();
        let artifact = ExportArtifact::spooled(file.into_temp_path(), DataFormat::Parquet);

        let response = artifact_response(artifact, DataFormat::Parquet).await.unwrap();
        drop(response);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
