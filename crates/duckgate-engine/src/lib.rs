//! Table store, query builder and format codecs for duckgate.
//!
//! This crate is a workspace member that isolates the heavy `duckdb` (bundled C++)
//! dependency into its own compilation unit, so the HTTP layer rebuilds without
//! recompiling DuckDB.
//!
//! # Overview
//!
//! 1. [`QuerySpec`] captures the select/filter/pivot/order/paging steps of a
//!    request and [`QueryBuilder`] renders them into one SQL statement.
//! 2. [`TableStore`] runs statements against DuckDB with named parameters
//!    bound by the engine, and manages tables.
//! 3. [`codec`] turns a [`ResultSet`] into JSON, NDJSON, CSV or Parquet and
//!    decodes uploads back into rows.
//!
//! # Modules
//!
//! - [`codec`] -- Wire formats, spooling of large exports.
//! - [`error`] -- Engine error taxonomy.
//! - [`ident`] -- Identifier allow-list and column type names.
//! - [`params`] -- `$name` parameter binding.
//! - [`query`] -- Query specs and the builder.
//! - [`store`] -- DuckDB table store.
//! - [`value`] -- Tagged values and result sets.

pub mod codec;
pub mod error;
pub mod ident;
mod lexer;
pub mod params;
pub mod query;
pub mod store;
pub mod value;

pub use codec::{DataFormat, ExportArtifact, ExportOptions};
pub use error::{EngineError, Result};
pub use ident::{normalize_type_name, quote, Identifier};
pub use params::{bind_named, NamedParams};
pub use query::{
    split_list, PivotSpec, Predicate, QueryBuilder, QueryPlan, QuerySource, QuerySpec,
    QuerySpecBuilder,
};
pub use store::{ColumnDef, TableSchema, TableStore, IN_MEMORY};
pub use value::{Record, ResultSet, TypeClass, Value};
