//! Row consumers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, TableRow, TableSchema, Value};

/// Destination of emitted rows.
///
/// `emit` may block; that is the pipeline's only backpressure mechanism. An error stops the
/// fetch that produced the row.
pub trait RowSink: Send + Sync {
    fn emit(&self, row: TableRow) -> PipelineResult<()>;
}

/// How often a send blocked on a full channel re-checks its cancellation flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Bounded channel sink: `emit` blocks while the channel is full.
///
/// With a [`CancellationFlag`] attached, a blocked `emit` gives up with
/// [`PipelineError::Cancelled`] once the flag is raised, even if nobody drains the channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: flume::Sender<TableRow>,
    cancel: Option<CancellationFlag>,
}

impl ChannelSink {
    /// Create a sink and the receiver draining it. `capacity` is clamped to at least 1.
    pub fn bounded(capacity: usize) -> (Self, flume::Receiver<TableRow>) {
        let (tx, rx) = flume::bounded(capacity.max(1));
        (Self::from_sender(tx), rx)
    }

    pub fn from_sender(tx: flume::Sender<TableRow>) -> Self {
        Self { tx, cancel: None }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl RowSink for ChannelSink {
    fn emit(&self, row: TableRow) -> PipelineResult<()> {
        let table = row.schema.name.clone();
        let Some(cancel) = self.cancel.as_ref() else {
            return self
                .tx
                .send(row)
                .map_err(|_| PipelineError::SinkClosed { table });
        };

        let mut pending = row;
        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled { table });
            }
            match self.tx.send_timeout(pending, CANCEL_POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(flume::SendTimeoutError::Timeout(row)) => pending = row,
                Err(flume::SendTimeoutError::Disconnected(_)) => {
                    return Err(PipelineError::SinkClosed { table });
                }
            }
        }
    }
}

/// Gathers emitted rows into one [`DataSet`] per table, in first-emission order.
#[derive(Default)]
pub struct CollectingSink {
    tables: Mutex<Vec<(Arc<TableSchema>, Vec<Vec<Value>>)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows collected so far for `table`.
    pub fn dataset(&self, table: &str) -> Option<DataSet> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .iter()
            .find(|(schema, _)| schema.name == table)
            .map(|(schema, rows)| DataSet::new(Arc::clone(schema), rows.clone()))
    }

    pub fn into_datasets(self) -> Vec<DataSet> {
        self.tables
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .map(|(schema, rows)| DataSet::new(schema, rows))
            .collect()
    }
}

impl fmt::Debug for CollectingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CollectingSink")
            .field("tables_len", &tables.len())
            .finish()
    }
}

impl RowSink for CollectingSink {
    fn emit(&self, row: TableRow) -> PipelineResult<()> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        match tables.iter_mut().find(|(schema, _)| schema.name == row.schema.name) {
            Some((_, rows)) => rows.push(row.values),
            None => tables.push((row.schema, vec![row.values])),
        }
        Ok(())
    }
}

/// Cooperative cancellation signal shared between a caller and running fetches.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
