//! Execution engine for fetching several sources concurrently.
//!
//! This module sits "above" [`crate::pipeline`] and provides:
//!
//! - One producer per root table on a rayon pool
//! - A bound on concurrently running fetches
//! - Real-time metrics + observer hooks for monitoring

mod observer;
mod semaphore;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{CancellationFlag, CollectingSink, FetchOptions, FetchStats, RowSink, fetch_table};
use crate::schema::CompiledSource;
use crate::types::DataSet;

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, TracingExecutionObserver,
};

use semaphore::Semaphore;

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on concurrently running table fetches.
    ///
    /// This is an additional throttle on top of `num_threads`.
    pub max_in_flight_tables: usize,
    /// Options applied to every fetch.
    pub fetch: FetchOptions,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            max_in_flight_tables: n.max(1),
            fetch: FetchOptions::default(),
        }
    }
}

/// Runs table fetches in parallel.
pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    /// Create a new engine with the given options.
    ///
    /// `max_in_flight_tables == 0` and `num_threads == Some(0)` are rejected.
    pub fn new(opts: ExecutionOptions) -> PipelineResult<Self> {
        if opts.max_in_flight_tables == 0 {
            return Err(PipelineError::invalid_spec("max_in_flight_tables must be > 0"));
        }
        if opts.num_threads == Some(0) {
            return Err(PipelineError::invalid_spec("num_threads must be > 0 when set"));
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|e| PipelineError::invalid_spec(format!("failed to build thread pool: {e}")))?;

        Ok(Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer for execution events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Fetch every source into `sink`, one producer per source.
    ///
    /// Results are returned in the order of `sources`. A failing source does not stop the
    /// others; cancel through `cancel` to stop them all.
    pub fn fetch_all(
        &self,
        sources: &[CompiledSource],
        sink: &dyn RowSink,
        cancel: &CancellationFlag,
    ) -> Vec<PipelineResult<FetchStats>> {
        self.pool.install(|| self.fetch_all_impl(sources, sink, cancel))
    }

    fn fetch_all_impl(
        &self,
        sources: &[CompiledSource],
        sink: &dyn RowSink,
        cancel: &CancellationFlag,
    ) -> Vec<PipelineResult<FetchStats>> {
        let start = Instant::now();
        self.metrics.begin_run();
        self.emit(ExecutionEvent::RunStarted {
            tables: sources.len(),
        });

        let sem = Semaphore::new(self.opts.max_in_flight_tables);

        let results: Vec<PipelineResult<FetchStats>> = sources
            .par_iter()
            .map(|source| {
                let table = source.table.name().to_string();
                let waited = sem.acquire();
                if waited > Duration::ZERO {
                    self.metrics.on_throttle_wait(waited);
                    self.emit(ExecutionEvent::ThrottleWaited {
                        table: table.clone(),
                        duration: waited,
                    });
                }

                self.metrics.on_table_start();
                self.emit(ExecutionEvent::TableStarted { table: table.clone() });

                let result = fetch_table(source, sink, cancel, &self.opts.fetch);

                match &result {
                    Ok(stats) => {
                        let rows = stats.rows_admitted + stats.relation_rows;
                        self.metrics.on_table_end(rows, false);
                        self.emit(ExecutionEvent::TableFinished {
                            table,
                            rows_emitted: rows,
                        });
                    }
                    Err(e) => {
                        self.metrics.on_table_end(0, true);
                        self.emit(ExecutionEvent::TableFailed {
                            table,
                            error: e.to_string(),
                        });
                    }
                }
                sem.release();
                result
            })
            .collect();

        self.metrics.end_run(start.elapsed());
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });

        results
    }

    /// Fetch every source into memory, one [`DataSet`] per emitted table.
    ///
    /// Fails with the first error among the sources (in `sources` order).
    pub fn collect_all(&self, sources: &[CompiledSource]) -> PipelineResult<Vec<DataSet>> {
        let sink = CollectingSink::new();
        for result in self.fetch_all(sources, &sink, &CancellationFlag::new()) {
            result?;
        }
        Ok(sink.into_datasets())
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}
