#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # duckgate
//!
//! duckgate is a thin HTTP gateway over an embedded DuckDB database. It turns
//! requests (filter/order/pivot/paging parameters, or raw SQL with named
//! parameters) into validated queries, and streams the results back as JSON,
//! NDJSON, CSV or Parquet.
//!
//! ## Quick Start
//!
//! ```bash
//! # In-memory database on 0.0.0.0:3000
//! $ ./duckgate
//!
//! # Persistent database, custom port
//! $ ./duckgate --db analytics.duckdb --port 8080
//!
//! # Create a table, load rows, export them
//! $ curl -X POST 'localhost:3000/tables?table_name=users' \
//!     -H 'Content-Type: application/json' \
//!     -d '{"columns": {"id": "INTEGER", "name": "VARCHAR"}}'
//! $ curl -X POST localhost:3000/tables/users -H 'Content-Type: text/csv' \
//!     --data-binary $'id,name\n1,Alice\n2,Bob\n'
//! $ curl 'localhost:3000/tables/users?format=csv&order_by=id'
//! ```
//!
//! ## Library Usage
//!
//! The router can be embedded in another axum application:
//!
//! ```no_run
//! use std::sync::Arc;
//! use duckgate::{create_router, AppState, ServerConfig};
//! use duckgate_engine::TableStore;
//!
//! # async fn run() -> duckgate::Result<()> {
//! let store = Arc::new(TableStore::open_in_memory()?);
//! let app = create_router(AppState::new(store, ServerConfig::default()));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The query builder, store adapter and codecs live in the `duckgate-engine`
//! crate.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod server;

pub use config::{ExportEngine, ServerArgs, ServerConfig};
pub use error::{DuckgateError, Result};
pub use server::{create_router, serve, ApiError, AppState};
