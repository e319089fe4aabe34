use thiserror::Error;

use crate::transform::TemplateError;

/// Convenience result type for table fetch operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned by schema compilation and table fetches.
///
/// Every variant is fatal for the table being compiled or fetched. Non-fatal conditions
/// (short CSV lines, broken filters, rejected rows) are logged and never show up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel decoding error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// A requested sheet is not part of the workbook.
    #[error("sheet '{sheet}' not found in workbook (available: {available:?})")]
    SheetNotFound { sheet: String, available: Vec<String> },

    /// CSV decoding error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed JSON document.
    #[error("error unmarshalling data from JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed YAML document.
    #[error("error unmarshalling data from YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The source declares a format tag no decoder handles.
    #[error("unsupported format: {0:?}")]
    UnsupportedFormat(String),

    /// The table/column configuration is unusable.
    #[error("invalid spec: {message}")]
    InvalidSpec { message: String },

    /// A column's transform template failed to parse.
    #[error("error parsing transform for column {column:?}: {source}")]
    TransformCompile {
        column: String,
        #[source]
        source: TemplateError,
    },

    /// A column's transform template failed while rendering a row.
    #[error("error applying transform for column {column:?}: {source}")]
    TransformRender {
        column: String,
        #[source]
        source: TemplateError,
    },

    /// A null reached a column declared `notnull`.
    #[error("invalid null value for non-nullable column {column}")]
    NotNullViolation { column: String },

    /// A value could not be represented as the column's declared type.
    #[error("value {raw:?} for column '{column}' is not a valid {expected}")]
    TypeMismatch {
        column: String,
        expected: String,
        raw: String,
    },

    /// The consumer hung up before the fetch completed.
    #[error("row sink closed while fetching table '{table}'")]
    SinkClosed { table: String },

    /// The caller cancelled the fetch.
    #[error("fetch of table '{table}' cancelled")]
    Cancelled { table: String },
}

impl PipelineError {
    pub(crate) fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }
}

