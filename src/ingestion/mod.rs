//! Source decoding.
//!
//! [`read_rows`] (from [`format`]) decodes a file into loosely-typed [`crate::types::Row`]s,
//! dispatching on a [`SourceFormat`] resolved once from the source's format tag. Fetch
//! outcomes are reported to a [`FetchObserver`].
//!
//! Format-specific decoders are also available under:
//! - [`csv`]
//! - [`json`] (JSON and YAML)
//! - `excel` (feature `excel`)

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod format;
pub mod json;
pub mod observability;

pub use format::{ReadOptions, ReadStats, SourceFormat, read_rows};
pub use observability::{
    CompositeObserver, FetchContext, FetchObserver, FetchSeverity, FetchStats, TracingObserver,
};
