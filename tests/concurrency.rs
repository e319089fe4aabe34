use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rust_file_tables::PipelineError;
use rust_file_tables::execution::{ExecutionEngine, ExecutionEvent, ExecutionObserver, ExecutionOptions};
use rust_file_tables::pipeline::{CancellationFlag, CollectingSink, FetchOptions, fetch_to_channel};
use rust_file_tables::schema::{CompiledSource, compile_source};
use rust_file_tables::spec::{ColumnSpec, SourceSpec, TableSpec};
use rust_file_tables::types::Value;

fn numbers_csv(rows: usize) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(f, "id,label").unwrap();
    for i in 0..rows {
        writeln!(f, "{i},row-{i}").unwrap();
    }
    f
}

fn numbers_source(table: &str, file: &tempfile::NamedTempFile) -> CompiledSource {
    let spec = TableSpec::new(
        table,
        vec![ColumnSpec::new("id", "int").not_null(), ColumnSpec::new("label", "string")],
    )
    .with_relation(TableSpec::new("evens", vec![ColumnSpec::new("id", "int").not_null()]).with_filter("int(_.id) % 2 == 0"));
    compile_source(&SourceSpec::new(file.path(), "csv", spec)).unwrap()
}

#[derive(Default)]
struct RecordingExecutionObserver {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl ExecutionObserver for RecordingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[test]
fn engine_fetches_every_source_and_records_metrics() {
    let files: Vec<_> = (0..4).map(|_| numbers_csv(50)).collect();
    let sources: Vec<_> = files
        .iter()
        .enumerate()
        .map(|(i, f)| numbers_source(&format!("numbers_{i}"), f))
        .collect();

    let obs = Arc::new(RecordingExecutionObserver::default());
    let engine = ExecutionEngine::new(ExecutionOptions {
        num_threads: Some(4),
        max_in_flight_tables: 2,
        ..Default::default()
    })
    .unwrap()
    .with_observer(obs.clone());

    let sink = CollectingSink::new();
    let results = engine.fetch_all(&sources, &sink, &CancellationFlag::new());
    assert_eq!(results.len(), 4);
    for result in &results {
        let stats = result.as_ref().unwrap();
        assert_eq!(stats.rows_admitted, 50);
        assert_eq!(stats.relation_rows, 25);
    }

    let snap = engine.metrics().snapshot();
    assert_eq!(snap.tables_started, 4);
    assert_eq!(snap.tables_finished, 4);
    assert_eq!(snap.tables_failed, 0);
    assert_eq!(snap.rows_emitted, 4 * 75);
    assert!(snap.max_active_tables <= 2);
    assert!(snap.elapsed.is_some());

    // every table's rows arrive in source order, relations share one dataset
    let datasets = sink.into_datasets();
    assert_eq!(datasets.len(), 5);
    for ds in &datasets {
        let ids: Vec<i64> = ds
            .column("id")
            .unwrap()
            .into_iter()
            .map(|v| match v {
                Value::Int(i) => *i,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        if ds.schema.name == "evens" {
            assert_eq!(ids.len(), 100);
        } else {
            assert_eq!(ids, sorted);
            assert_eq!(ids.len(), 50);
        }
    }

    let events = obs.events.lock().unwrap();
    assert!(matches!(events.first(), Some(ExecutionEvent::RunStarted { tables: 4 })));
    assert!(matches!(events.last(), Some(ExecutionEvent::RunFinished { .. })));
    let finished = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::TableFinished { .. }))
        .count();
    assert_eq!(finished, 4);
}

#[test]
fn single_permit_runs_tables_one_at_a_time() {
    let files: Vec<_> = (0..3).map(|_| numbers_csv(10)).collect();
    let sources: Vec<_> = files.iter().map(|f| numbers_source("numbers", f)).collect();
    let engine = ExecutionEngine::new(ExecutionOptions {
        num_threads: Some(3),
        max_in_flight_tables: 1,
        ..Default::default()
    })
    .unwrap();

    let datasets = engine.collect_all(&sources).unwrap();
    assert_eq!(engine.metrics().snapshot().max_active_tables, 1);
    let numbers = datasets.iter().find(|d| d.schema.name == "numbers").unwrap();
    assert_eq!(numbers.row_count(), 30);
}

#[test]
fn failing_source_does_not_stop_the_others() {
    let good = numbers_csv(5);
    let sources = vec![
        numbers_source("good", &good),
        compile_source(&SourceSpec::new(
            "tests/fixtures/does_not_exist.csv",
            "csv",
            TableSpec::new("missing", vec![ColumnSpec::new("id", "int")]),
        ))
        .unwrap(),
    ];
    let engine = ExecutionEngine::new(ExecutionOptions::default()).unwrap();

    let results = engine.fetch_all(&sources, &CollectingSink::new(), &CancellationFlag::new());
    assert_eq!(results[0].as_ref().unwrap().rows_admitted, 5);
    assert!(matches!(results[1], Err(PipelineError::Io(_))));
    let snap = engine.metrics().snapshot();
    assert_eq!((snap.tables_finished, snap.tables_failed), (1, 1));

    assert!(matches!(engine.collect_all(&sources), Err(PipelineError::Io(_))));
}

#[test]
fn cancelled_run_fails_every_table() {
    let file = numbers_csv(5);
    let sources = vec![numbers_source("a", &file), numbers_source("b", &file)];
    let engine = ExecutionEngine::new(ExecutionOptions::default()).unwrap();
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let results = engine.fetch_all(&sources, &CollectingSink::new(), &cancel);
    assert!(
        results
            .iter()
            .all(|r| matches!(r, Err(PipelineError::Cancelled { .. })))
    );
}

#[test]
fn channel_streams_rows_in_source_order() {
    let file = numbers_csv(20);
    let source = Arc::new(numbers_source("numbers", &file));
    let options = FetchOptions {
        sink_capacity: 2,
        ..Default::default()
    };

    let (rx, handle) = fetch_to_channel(source, CancellationFlag::new(), options);
    let rows: Vec<_> = rx.iter().collect();
    let stats = handle.join().unwrap().unwrap();

    assert_eq!(stats.rows_admitted, 20);
    assert_eq!(rows.len(), 30);
    // each even parent row is immediately followed by its relation row
    assert_eq!(rows[0].table(), "numbers");
    assert_eq!(rows[1].table(), "evens");
    assert_eq!(rows[1].get("id"), Some(&Value::Int(0)));
    assert_eq!(rows[2].table(), "numbers");
    assert_eq!(rows[2].get("id"), Some(&Value::Int(1)));
}

#[test]
fn dropping_the_receiver_stops_the_producer() {
    let file = numbers_csv(100);
    let source = Arc::new(numbers_source("numbers", &file));
    let options = FetchOptions {
        sink_capacity: 1,
        ..Default::default()
    };

    let (rx, handle) = fetch_to_channel(source, CancellationFlag::new(), options);
    let first = rx.recv().unwrap();
    assert_eq!(first.get("id"), Some(&Value::Int(0)));
    drop(rx);

    let err = handle.join().unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::SinkClosed { .. }));
}

#[test]
fn cancelling_mid_stream_stops_the_producer() {
    let file = numbers_csv(1_000);
    let source = Arc::new(numbers_source("numbers", &file));
    let cancel = CancellationFlag::new();
    let options = FetchOptions {
        sink_capacity: 1,
        ..Default::default()
    };

    let (rx, handle) = fetch_to_channel(source, cancel.clone(), options);
    let _ = rx.recv().unwrap();
    cancel.cancel();
    // keep draining so a blocked send can complete and observe the flag
    let drained = rx.iter().count();

    let err = handle.join().unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { ref table } if table == "numbers"));
    assert!(drained < 1_499);
}

#[test]
fn cancelling_stops_a_producer_blocked_on_a_full_channel() {
    let file = numbers_csv(10);
    let source = Arc::new(numbers_source("numbers", &file));
    let cancel = CancellationFlag::new();
    let options = FetchOptions {
        sink_capacity: 1,
        ..Default::default()
    };

    // the receiver stays alive but is never drained
    let (rx, handle) = fetch_to_channel(source, cancel.clone(), options);
    thread::sleep(Duration::from_millis(100));
    assert!(!handle.is_finished());
    cancel.cancel();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(handle.is_finished());
    let err = handle.join().unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { ref table } if table == "numbers"));
    assert_eq!(rx.len(), 1);
}
