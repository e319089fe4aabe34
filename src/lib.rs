//! `rust-file-tables` exposes semi-structured files (CSV, JSON/YAML documents, spreadsheets) as
//! typed, filterable tables that stream rows through a declared column schema.
//!
//! A [`spec::SourceSpec`] names a file, its format and a root [`spec::TableSpec`]. Compiling
//! it with [`schema::compile_source`] yields the typed [`types::TableSchema`], the compiled
//! transform templates and the compiled admission filter. [`pipeline::fetch_table`] then
//! streams every source row through
//!
//! 1. the table filter ([`filter`]), rejecting rows that fail or error,
//! 2. per-column transforms ([`transform`]), rendering templates over the raw row,
//! 3. coercion ([`coerce`]), applying null/zero-value rules and the declared type,
//!
//! and emits the result to a [`pipeline::RowSink`]. Each admitted row is also offered to the
//! table's relations: filtered, re-typed views of the same row.
//!
//! ## What you can read
//!
//! - **CSV**: header line plus data lines, configurable single-byte separator
//! - **JSON**: array of objects, single object, or newline-delimited objects
//! - **YAML**: sequence of mappings or a single mapping
//! - **Spreadsheets** (requires the Cargo feature `excel`): `.xlsx`, `.xls`, `.ods`
//!
//! ## Quick example
//!
//! ```no_run
//! use rust_file_tables::pipeline::{CancellationFlag, CollectingSink, FetchOptions, fetch_table};
//! use rust_file_tables::schema::compile_source;
//! use rust_file_tables::spec::{ColumnSpec, SourceSpec, TableSpec};
//!
//! # fn main() -> Result<(), rust_file_tables::PipelineError> {
//! let table = TableSpec::new(
//!     "people",
//!     vec![
//!         ColumnSpec::new("id", "int").primary_key().not_null(),
//!         ColumnSpec::new("name", "string").with_transform("{{ .Value | trim | title }}"),
//!         ColumnSpec::new("age", "int"),
//!     ],
//! )
//! .with_filter("int(_.age) >= 18")
//! .with_relation(
//!     TableSpec::new("seniors", vec![ColumnSpec::new("id", "int")]).with_filter("int(_.age) >= 65"),
//! );
//!
//! let source = compile_source(&SourceSpec::new("people.csv", "csv", table))?;
//! let sink = CollectingSink::new();
//! fetch_table(&source, &sink, &CancellationFlag::new(), &FetchOptions::default())?;
//! for ds in sink.into_datasets() {
//!     println!("{}: rows={}", ds.schema.name, ds.row_count());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`spec`]: declarative configuration, loadable from YAML or JSON
//! - [`schema`]: compilation of specs into typed, ready-to-fetch tables
//! - [`ingestion`]: format decoders and fetch observers
//! - [`filter`]: the row admission expression language
//! - [`transform`]: column transform templates
//! - [`coerce`]: null/zero-value policy and typed emission
//! - [`pipeline`]: fetching, relations, sinks and cancellation
//! - [`execution`]: concurrent multi-source fetches with metrics
//! - [`types`]: rows, values and schemas
//! - [`error`]: error types

pub mod coerce;
pub mod error;
pub mod execution;
pub mod filter;
pub mod ingestion;
pub mod pipeline;
pub mod schema;
pub mod spec;
pub mod transform;
pub mod types;

pub use error::{PipelineError, PipelineResult};
