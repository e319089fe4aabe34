//! Fetch outcome reporting.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::PipelineError;

use super::format::SourceFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (cancellation).
    Warning,
    /// Error-level event (fetch failed).
    Error,
    /// Critical error (I/O failures).
    Critical,
}

impl FetchSeverity {
    /// Classify a fetch failure.
    pub fn of(e: &PipelineError) -> Self {
        match e {
            PipelineError::Io(_) => Self::Critical,
            PipelineError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Self::Critical,
                _ => Self::Error,
            },
            PipelineError::Cancelled { .. } => Self::Warning,
            _ => Self::Error,
        }
    }
}

/// Which table fetch an event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchContext {
    pub table: String,
    pub path: PathBuf,
    pub format: SourceFormat,
}

/// Counters for one completed table fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Rows produced by the decoder.
    pub rows_read: u64,
    /// Rows that passed the filter and were emitted.
    pub rows_admitted: u64,
    /// Rows rejected by the filter.
    pub rows_rejected: u64,
    /// Malformed rows skipped by the decoder.
    pub rows_dropped: u64,
    /// Rows emitted for relations.
    pub relation_rows: u64,
}

/// Observer interface for fetch outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait FetchObserver: Send + Sync {
    /// Called when a fetch completes.
    fn on_success(&self, _ctx: &FetchContext, _stats: FetchStats) {}

    /// Called when a fetch fails.
    fn on_failure(&self, _ctx: &FetchContext, _severity: FetchSeverity, _error: &PipelineError) {}

    /// Called when a failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &FetchContext, severity: FetchSeverity, error: &PipelineError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn FetchObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn FetchObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl FetchObserver for CompositeObserver {
    fn on_success(&self, ctx: &FetchContext, stats: FetchStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &FetchContext, severity: FetchSeverity, error: &PipelineError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &FetchContext, severity: FetchSeverity, error: &PipelineError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Reports fetch outcomes through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl FetchObserver for TracingObserver {
    fn on_success(&self, ctx: &FetchContext, stats: FetchStats) {
        info!(
            table = %ctx.table,
            file = %ctx.path.display(),
            format = %ctx.format,
            rows_read = stats.rows_read,
            rows_admitted = stats.rows_admitted,
            rows_rejected = stats.rows_rejected,
            rows_dropped = stats.rows_dropped,
            relation_rows = stats.relation_rows,
            "fetch completed"
        );
    }

    fn on_failure(&self, ctx: &FetchContext, severity: FetchSeverity, error: &PipelineError) {
        match severity {
            FetchSeverity::Info | FetchSeverity::Warning => {
                warn!(table = %ctx.table, file = %ctx.path.display(), ?severity, %error, "fetch stopped")
            }
            FetchSeverity::Error | FetchSeverity::Critical => {
                error!(table = %ctx.table, file = %ctx.path.display(), ?severity, %error, "fetch failed")
            }
        }
    }

    fn on_alert(&self, ctx: &FetchContext, severity: FetchSeverity, error: &PipelineError) {
        error!(
            table = %ctx.table,
            file = %ctx.path.display(),
            format = %ctx.format,
            ?severity,
            %error,
            "ALERT: fetch failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_and_classification() {
        assert!(FetchSeverity::Critical > FetchSeverity::Error);
        let io = PipelineError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(FetchSeverity::of(&io), FetchSeverity::Critical);
        let cancelled = PipelineError::Cancelled { table: "t".into() };
        assert_eq!(FetchSeverity::of(&cancelled), FetchSeverity::Warning);
        let unsupported = PipelineError::UnsupportedFormat("x".into());
        assert_eq!(FetchSeverity::of(&unsupported), FetchSeverity::Error);
    }
}
