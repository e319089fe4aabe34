use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

/// Execution events emitted by the engine.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted { tables: usize },
    ThrottleWaited { table: String, duration: Duration },
    TableStarted { table: String },
    TableFinished { table: String, rows_emitted: u64 },
    TableFailed { table: String, error: String },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Logs execution events at debug level.
#[derive(Debug, Default)]
pub struct TracingExecutionObserver;

impl ExecutionObserver for TracingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        debug!(?event, "execution event");
    }
}

/// Real-time metrics for an execution run.
///
/// The engine updates these counters during execution; callers can snapshot them at any time.
#[derive(Debug)]
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    rows_emitted: AtomicU64,
    tables_started: AtomicU64,
    tables_finished: AtomicU64,
    tables_failed: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_tables: AtomicUsize,
    max_active_tables: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            rows_emitted: AtomicU64::new(0),
            tables_started: AtomicU64::new(0),
            tables_finished: AtomicU64::new(0),
            tables_failed: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active_tables: AtomicUsize::new(0),
            max_active_tables: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.rows_emitted.store(0, Ordering::SeqCst);
        self.tables_started.store(0, Ordering::SeqCst);
        self.tables_finished.store(0, Ordering::SeqCst);
        self.tables_failed.store(0, Ordering::SeqCst);
        self.throttle_wait_ns.store(0, Ordering::SeqCst);
        self.active_tables.store(0, Ordering::SeqCst);
        self.max_active_tables.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn on_table_start(&self) {
        let _ = self.tables_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_tables.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_tables, now);
    }

    /// Record the end of a table fetch that emitted `rows` rows.
    pub fn on_table_end(&self, rows: u64, failed: bool) {
        let _ = self.rows_emitted.fetch_add(rows, Ordering::SeqCst);
        let counter = if failed { &self.tables_failed } else { &self.tables_finished };
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_tables.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        let add = d.as_nanos().min(u64::MAX as u128) as u64;
        let _ = self.throttle_wait_ns.fetch_add(add, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            rows_emitted: self.rows_emitted.load(Ordering::SeqCst),
            tables_started: self.tables_started.load(Ordering::SeqCst),
            tables_finished: self.tables_finished.load(Ordering::SeqCst),
            tables_failed: self.tables_failed.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_tables: self.max_active_tables.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub rows_emitted: u64,
    pub tables_started: u64,
    pub tables_finished: u64,
    pub tables_failed: u64,
    pub throttle_wait: Duration,
    pub max_active_tables: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows_emitted={}, tables={}/{} (failed {}), max_active_tables={}, throttle_wait={:?}, elapsed={:?}",
            self.run_id,
            self.rows_emitted,
            self.tables_finished,
            self.tables_started,
            self.tables_failed,
            self.max_active_tables,
            self.throttle_wait,
            self.elapsed
        )
    }
}
