//! Format selection and the shared row-reading entrypoint.
//!
//! A source's format tag is resolved once, when the source is compiled, into a
//! [`SourceFormat`]. [`read_rows`] then dispatches to the matching decoder and feeds every
//! decoded [`Row`] to a visitor in source order. Returning an error from the visitor stops
//! the read and the error is propagated unchanged.

use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::types::Row;

use super::{csv, json};

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// JSON array of objects, single object, or newline-delimited objects.
    Json,
    /// YAML sequence of mappings or single mapping.
    Yaml,
    /// Delimited text with a header line.
    Csv,
    /// Spreadsheet workbooks (feature-gated behind `excel`).
    Excel,
}

impl SourceFormat {
    /// Resolve a format tag (case-insensitive).
    pub fn from_tag(tag: &str) -> PipelineResult<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "json" | "ndjson" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "csv" => Ok(Self::Csv),
            "xlsx" | "xls" | "xsl" | "excel" => Ok(Self::Excel),
            _ => Err(PipelineError::UnsupportedFormat(tag.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Csv => "csv",
            Self::Excel => "xlsx",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoder settings resolved from a source spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// CSV field delimiter.
    pub separator: u8,
    /// Workbook sheets to read, in order. Empty means the workbook's first sheet.
    pub sheets: Vec<String>,
    /// CSV fields to keep; `None` keeps every header field.
    pub fields: Option<Vec<String>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            separator: b',',
            sheets: Vec::new(),
            fields: None,
        }
    }
}

/// Counters produced by a decoder run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Rows handed to the visitor.
    pub rows_read: u64,
    /// Malformed rows skipped by the decoder (CSV lines shorter than the header).
    pub rows_dropped: u64,
}

/// Decode `path` as `format`, calling `visit` once per row in source order.
pub fn read_rows(
    path: &Path,
    format: SourceFormat,
    options: &ReadOptions,
    visit: &mut dyn FnMut(Row) -> PipelineResult<()>,
) -> PipelineResult<ReadStats> {
    debug!(file = %path.display(), %format, "reading source");
    match format {
        SourceFormat::Json => json::read_json_rows(path, visit),
        SourceFormat::Yaml => json::read_yaml_rows(path, visit),
        SourceFormat::Csv => csv::read_csv_rows(path, options.separator, options.fields.as_deref(), visit),
        SourceFormat::Excel => read_excel_dispatch(path, &options.sheets, visit),
    }
}

fn read_excel_dispatch(
    path: &Path,
    sheets: &[String],
    visit: &mut dyn FnMut(Row) -> PipelineResult<()>,
) -> PipelineResult<ReadStats> {
    // Avoid unused warnings when the feature is off.
    let _ = (path, sheets, &visit);

    #[cfg(feature = "excel")]
    {
        super::excel::read_excel_rows(path, sheets, visit)
    }

    #[cfg(not(feature = "excel"))]
    {
        Err(PipelineError::UnsupportedFormat(
            "xlsx (enable cargo feature 'excel')".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_case_insensitive() {
        assert_eq!(SourceFormat::from_tag("JSON").unwrap(), SourceFormat::Json);
        assert_eq!(SourceFormat::from_tag("yml").unwrap(), SourceFormat::Yaml);
        assert_eq!(SourceFormat::from_tag(" Csv ").unwrap(), SourceFormat::Csv);
        assert_eq!(SourceFormat::from_tag("xls").unwrap(), SourceFormat::Excel);
        assert_eq!(SourceFormat::from_tag("Excel").unwrap(), SourceFormat::Excel);
    }

    #[test]
    fn unknown_tags_are_unsupported() {
        let err = SourceFormat::from_tag("parquet").unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(ref tag) if tag == "parquet"));
        assert_eq!(err.to_string(), "unsupported format: \"parquet\"");
    }
}
