//! Row pipeline: decode → filter → transform → coerce → emit.
//!
//! [`fetch_table`] streams every row of a compiled source through its root table and, for
//! each admitted row, through the table's relations ([`resolve_relation`]). Rows reach the
//! consumer through a [`RowSink`] in source order.
//!
//! ```no_run
//! use rust_file_tables::pipeline::{CancellationFlag, CollectingSink, FetchOptions, fetch_table};
//! use rust_file_tables::schema::compile_source;
//! use rust_file_tables::spec::SourceSpec;
//!
//! # fn main() -> Result<(), rust_file_tables::PipelineError> {
//! let source = compile_source(&SourceSpec::from_path("people.yaml")?)?;
//! let sink = CollectingSink::new();
//! let stats = fetch_table(&source, &sink, &CancellationFlag::new(), &FetchOptions::default())?;
//! println!("admitted={} rejected={}", stats.rows_admitted, stats.rows_rejected);
//! for ds in sink.into_datasets() {
//!     println!("{}: {} rows", ds.schema.name, ds.row_count());
//! }
//! # Ok(())
//! # }
//! ```

mod sink;

use std::fmt;
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::{self, FetchContext, FetchObserver, FetchSeverity};
use crate::schema::{CompiledSource, CompiledTable};
use crate::types::{Row, TableRow};

pub use crate::ingestion::FetchStats;
pub use sink::{CancellationFlag, ChannelSink, CollectingSink, RowSink};

/// Options controlling a table fetch.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct FetchOptions {
    /// Capacity of the channel created by [`fetch_to_channel`].
    pub sink_capacity: usize,
    /// Optional observer for fetch outcomes.
    pub observer: Option<Arc<dyn FetchObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: FetchSeverity,
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("sink_capacity", &self.sink_capacity)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            sink_capacity: 1_024,
            observer: None,
            alert_at_or_above: FetchSeverity::Critical,
        }
    }
}

/// Fetch `source`'s table and its relations into `sink`.
///
/// Fatal errors stop the fetch; rows already emitted are not retracted. When an observer is
/// configured it receives `on_success`, `on_failure`, and `on_alert` for failures at or
/// above `options.alert_at_or_above`.
pub fn fetch_table(
    source: &CompiledSource,
    sink: &dyn RowSink,
    cancel: &CancellationFlag,
    options: &FetchOptions,
) -> PipelineResult<FetchStats> {
    let ctx = FetchContext {
        table: source.table.name().to_string(),
        path: source.path.clone(),
        format: source.format,
    };
    debug!(table = %ctx.table, file = %ctx.path.display(), format = %ctx.format, "fetching table");

    let result = run_fetch(source, sink, cancel);

    match &result {
        Ok(stats) => {
            debug!(table = %ctx.table, rows_admitted = stats.rows_admitted, "fetch finished");
        }
        Err(e) => {
            debug!(table = %ctx.table, error = %e, "fetch aborted");
        }
    }

    if let Some(obs) = options.observer.as_ref() {
        match &result {
            Ok(stats) => obs.on_success(&ctx, *stats),
            Err(e) => {
                let sev = FetchSeverity::of(e);
                obs.on_failure(&ctx, sev, e);
                if sev >= options.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
    }

    result
}

fn run_fetch(source: &CompiledSource, sink: &dyn RowSink, cancel: &CancellationFlag) -> PipelineResult<FetchStats> {
    let table = &source.table;
    let cancelled = || PipelineError::Cancelled {
        table: table.name().to_string(),
    };
    if cancel.is_cancelled() {
        return Err(cancelled());
    }

    // a sink may notice cancellation itself while blocked; report it against the fetched table
    let emit = |row: TableRow| match sink.emit(row) {
        Err(PipelineError::Cancelled { .. }) => Err(cancelled()),
        other => other,
    };

    let mut stats = FetchStats::default();
    let read = ingestion::read_rows(&source.path, source.format, &source.read_options, &mut |row| {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        if !table.admit(&row) {
            stats.rows_rejected += 1;
            return Ok(());
        }
        emit(table.resolve_row(&row)?)?;
        stats.rows_admitted += 1;

        for relation in table.relations() {
            if let Some(related) = resolve_relation(relation, &row)? {
                emit(related)?;
                stats.relation_rows += 1;
            }
        }
        Ok(())
    })?;

    stats.rows_read = read.rows_read;
    stats.rows_dropped = read.rows_dropped;
    Ok(stats)
}

/// Resolve `relation` against an admitted parent row.
///
/// The relation's filter runs on the parent's raw row; on admission the same row is resolved
/// through the relation's columns. A relation yields zero or one row per parent row.
pub fn resolve_relation(relation: &CompiledTable, parent: &Row) -> PipelineResult<Option<TableRow>> {
    if !relation.admit(parent) {
        return Ok(None);
    }
    relation.resolve_row(parent).map(Some)
}

/// Run [`fetch_table`] on a dedicated producer thread, streaming rows through a bounded
/// channel of `options.sink_capacity` rows.
///
/// Dropping the receiver makes the producer fail with [`PipelineError::SinkClosed`].
/// Cancelling `cancel` stops the producer even while it is blocked on a full channel.
pub fn fetch_to_channel(
    source: Arc<CompiledSource>,
    cancel: CancellationFlag,
    options: FetchOptions,
) -> (
    flume::Receiver<TableRow>,
    thread::JoinHandle<PipelineResult<FetchStats>>,
) {
    let (sink, rx) = ChannelSink::bounded(options.sink_capacity);
    let sink = sink.with_cancellation(cancel.clone());
    let handle = thread::spawn(move || fetch_table(&source, &sink, &cancel, &options));
    (rx, handle)
}
