//! Query-string parameters shared by the export, SQL and import endpoints.
//!
//! List parameters accept both a comma-separated value (`select=b,a`) and
//! repeated keys (`order_by=a&order_by=b`).

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use duckgate_engine::{split_list, DataFormat, QuerySpec};

use super::error::ApiError;

/// Parsed query-string parameters.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RequestParams {
    pub format: Option<String>,
    pub table_name: Option<String>,
    pub select: Vec<String>,
    pub filter: Option<String>,
    pub pivot_index: Vec<String>,
    pub pivot_column: Option<String>,
    pub pivot_values: Option<String>,
    pub order_by: Vec<String>,
    pub ascending: Option<bool>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl RequestParams {
    /// Build from decoded `(key, value)` pairs. Unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ApiError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = RequestParams::default();
        for (key, value) in pairs {
            match key.as_str() {
                "format" => params.format = Some(value),
                "table_name" => params.table_name = Some(value),
                "select" | "columns" => params.select.extend(split_list(&value)),
                "where" | "filter" => params.filter = Some(value),
                "pivot_index" => params.pivot_index.extend(split_list(&value)),
                "pivot_columns" | "pivot_column" => params.pivot_column = Some(value),
                "pivot_values" => params.pivot_values = Some(value),
                "order" | "order_by" => params.order_by.extend(split_list(&value)),
                "ascending" => params.ascending = Some(parse_bool(&key, &value)?),
                "limit" => params.limit = Some(parse_count(&key, &value)?),
                "offset" => params.offset = Some(parse_count(&key, &value)?),
                _ => {}
            }
        }
        Ok(params)
    }

    /// The requested export format, `json` when absent.
    pub fn format(&self) -> Result<DataFormat, ApiError> {
        match self.format.as_deref().map(str::trim) {
            None | Some("") => Ok(DataFormat::Json),
            Some(raw) => Ok(raw.parse()?),
        }
    }

    /// The select/filter/pivot/order/paging steps of this request.
    pub fn query_spec(&self) -> Result<QuerySpec, ApiError> {
        let mut builder = QuerySpec::builder()
            .select(self.select.iter().cloned())
            .pivot_index(self.pivot_index.iter().cloned())
            .order_by(self.order_by.iter().cloned())
            .ascending(self.ascending.unwrap_or(true));
        if let Some(filter) = &self.filter {
            builder = builder.filter(filter.clone());
        }
        if let Some(column) = &self.pivot_column {
            builder = builder.pivot_column(column.clone());
        }
        if let Some(values) = &self.pivot_values {
            builder = builder.pivot_values(values.clone());
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        Ok(builder.build()?)
    }

    /// The `table_name` parameter, required by create and import.
    pub fn require_table_name(&self) -> Result<&str, ApiError> {
        self.table_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::bad_request("missing query parameter 'table_name'"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        RequestParams::from_pairs(pairs)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ApiError::bad_request(format!(
            "'{}' must be true or false, got '{}'",
            key, raw
        ))),
    }
}

/// Non-negative and no larger than a signed 64-bit `LIMIT` accepts.
fn parse_count(key: &str, raw: &str) -> Result<u64, ApiError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|n| i64::try_from(*n).is_ok())
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "'{}' must be an integer between 0 and {}, got '{}'",
                key,
                i64::MAX,
                raw
            ))
        })
}
