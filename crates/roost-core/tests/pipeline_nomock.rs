//! No-mock end-to-end tests for the staging/commit/batch pipeline.
//!
//! Drives a real `Store` through:
//! - Two-cycle staging with sparse keys
//! - Row buffer promotion on batch
//! - Observer isolation when a sink fails
//! - Textual selectors on views

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use roost_core::{
    record, ColumnSelector, HookError, Record, Selection, StageSink, StorageSink, Store,
    StoreError, Value,
};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct RecordingStageSink {
    seen: Mutex<Vec<(String, Record)>>,
}

impl StageSink for RecordingStageSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn save(&self, _store: &Store, key: &str, record: &Record) -> Result<(), HookError> {
        self.seen
            .lock()
            .map_err(|_| "poisoned")?
            .push((key.to_string(), record.clone()));
        Ok(())
    }
}

struct FailingSink;

impl StorageSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn save(&self, _store: &Store) -> Result<(), HookError> {
        Err("disk full".into())
    }
}

#[derive(Default)]
struct RowCountSink {
    observed: Mutex<Vec<usize>>,
    calls: AtomicUsize,
}

impl StorageSink for RowCountSink {
    fn name(&self) -> &str {
        "row_count"
    }

    fn save(&self, store: &Store) -> Result<(), HookError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rows = store.view(&Selection::all())?.num_rows();
        self.observed.lock().map_err(|_| "poisoned")?.push(rows);
        Ok(())
    }
}

fn scenario_a_store() -> Store {
    let store = Store::new();
    store.stage("k1", record! { "a" => 1 }).unwrap();
    store.stage("k2", record! { "b" => 2 }).unwrap();
    store.commit().unwrap();
    store.stage("k1", record! { "a" => 3 }).unwrap();
    store.commit().unwrap();
    store
}

// ============================================================================
// Ledger
// ============================================================================

#[test]
fn test_scenario_a_two_cycles() {
    let store = scenario_a_store();
    let cols = store.view(&Selection::all()).unwrap().columns().unwrap();

    assert_eq!(cols["index"], vec![Value::from(0), Value::from(1)]);
    assert_eq!(cols["a"], vec![Value::from(1), Value::from(3)]);
    assert_eq!(cols["b"], vec![Value::from(2), Value::Null]);
    assert_eq!(store.row_count().unwrap(), 2);
}

#[test]
fn test_frame_presentation() {
    let store = scenario_a_store();
    let frame = store.view(&Selection::all()).unwrap().frame().unwrap();

    assert_eq!(frame.index().to_vec(), vec![0i64, 1]);
    assert!(!frame.columns().contains_key("index"));
    let rendered = frame.to_string();
    assert!(rendered.contains("index"));
    assert!(rendered.contains('a'));
}

#[test]
fn test_stage_many_then_commit() {
    let store = Store::new();
    store
        .stage_many(vec![
            ("k1", record! { "x" => 1.5 }),
            ("k2", record! { "y" => "s" }),
        ])
        .unwrap();
    store.commit().unwrap();
    let cols = store.view(&Selection::all()).unwrap().columns().unwrap();
    assert_eq!(cols["x"], vec![Value::from(1.5)]);
    assert_eq!(cols["y"], vec![Value::from("s")]);
}

// ============================================================================
// Batch store
// ============================================================================

#[test]
fn test_scenario_b_buffer_promotion() {
    let store = Store::new();
    store.add("src", record! { "x" => 1 }).unwrap();
    store.add("src", record! { "x" => 1.5 }).unwrap();
    store.add("src", record! { "x" => 2, "y" => "s" }).unwrap();
    assert_eq!(store.batch("src").unwrap(), 3);

    let view = store.view(&Selection::all()).unwrap();
    let table = view.table();
    let x = table.column_by_name("x").unwrap();
    assert_eq!(x.data_type(), &DataType::Float64);
    assert_eq!(
        x.as_primitive::<Float64Type>().values().to_vec(),
        vec![1.0, 1.5, 2.0]
    );
    let y = table.column_by_name("y").unwrap().as_string::<i32>();
    assert!(y.is_null(0) && y.is_null(1));
    assert_eq!(y.value(2), "s");
}

#[test]
fn test_batch_unknown_key_is_reported() {
    let store = Store::new();
    let err = store.batch("never-added").unwrap_err();
    assert!(matches!(err, StoreError::UnknownKey(_)));
    assert_eq!(err.code(), 30);
}

#[test]
fn test_schema_drift_across_batches() {
    let store = Store::new();
    store.add("k", record! { "v" => 1, "n" => 10 }).unwrap();
    store.batch("k").unwrap();
    store.add("k", record! { "v" => "text" }).unwrap();
    store.batch("k").unwrap();

    let table = store.view(&Selection::all()).unwrap().into_table();
    assert_eq!(table.num_rows(), 2);
    let v = table.column_by_name("v").unwrap().as_string::<i32>();
    assert_eq!(v.value(0), "1");
    assert_eq!(v.value(1), "text");
    let n = table.column_by_name("n").unwrap().as_primitive::<Int64Type>();
    assert!(n.is_null(1));
}

// ============================================================================
// Observers
// ============================================================================

#[test]
fn test_stage_sinks_see_each_record() {
    let store = Store::new();
    let sink = Arc::new(RecordingStageSink::default());
    store.on_stage(sink.clone()).unwrap();
    store.on_add(sink.clone()).unwrap();

    store.stage("k1", record! { "a" => 1 }).unwrap();
    store.add("k2", record! { "b" => 2 }).unwrap();

    let seen = sink.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "k1");
    assert_eq!(seen[1].1["b"], Value::from(2));
}

#[test]
fn test_failing_sink_does_not_abort_commit() {
    let store = Store::new();
    let counter = Arc::new(RowCountSink::default());
    store.on_commit(Arc::new(FailingSink)).unwrap();
    store.on_commit(counter.clone()).unwrap();

    for i in 0..3 {
        store.stage("k", record! { "i" => i }).unwrap();
        assert_eq!(store.commit().unwrap(), i as usize);
    }

    assert_eq!(store.hook_failures(), 3);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 3);
    assert_eq!(*counter.observed.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(store.row_count().unwrap(), 3);
}

// ============================================================================
// Selectors
// ============================================================================

#[test]
fn test_row_and_column_selection() {
    let store = Store::new();
    for i in 0..6 {
        store
            .stage("k", record! { "i" => i, "sq" => i * i, "s" => i.to_string() })
            .unwrap();
        store.commit().unwrap();
    }

    let view = store.select("1:6:2, [sq]").unwrap();
    let cols = view.columns().unwrap();
    let names: Vec<&str> = cols.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["index", "sq"]);
    assert_eq!(
        cols["sq"],
        vec![Value::from(1), Value::from(9), Value::from(25)]
    );

    let view = store
        .view(&Selection::rows(vec![5, 0]).with_columns(ColumnSelector::Name("s".into())))
        .unwrap();
    let cols = view.columns().unwrap();
    assert_eq!(cols["index"], vec![Value::from(5), Value::from(0)]);
    assert_eq!(cols["s"], vec![Value::from("5"), Value::from("0")]);

    let view = store.select("::-1, 0:2").unwrap();
    let names: Vec<String> = view
        .table()
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(names, vec!["index", "i", "sq"]);
    assert_eq!(view.num_rows(), 6);
}

#[test]
fn test_unknown_column_names_are_ignored() {
    let store = scenario_a_store();
    let view = store
        .view(&Selection::all().with_columns(ColumnSelector::Names(vec![
            "missing".into(),
            "b".into(),
        ])))
        .unwrap();
    assert_eq!(view.table().num_columns(), 2);
}

#[test]
fn test_invalid_selector() {
    let store = scenario_a_store();
    assert!(matches!(
        store.select("a, b, c"),
        Err(StoreError::InvalidSelector(_))
    ));
    assert!(matches!(
        store.select("[0, 9]"),
        Err(StoreError::InvalidSelector(_))
    ));
}

#[test]
fn test_huge_step_selects_start_row_only() {
    let store = scenario_a_store();
    let view = store.select("1::9223372036854775807").unwrap();
    assert_eq!(view.columns().unwrap()["index"], vec![Value::from(1)]);

    let view = store.select("::-9223372036854775807").unwrap();
    assert_eq!(view.columns().unwrap()["index"], vec![Value::from(1)]);
}

#[test]
fn test_view_does_not_mutate_state() {
    let store = scenario_a_store();
    store.add("k", record! { "a" => 9 }).unwrap();
    store.view(&Selection::all()).unwrap();
    assert_eq!(store.row_count().unwrap(), 2);
    assert_eq!(store.buffered_rows("k").unwrap(), 1);
    assert_eq!(store.stored_rows("k").unwrap(), 0);
}

#[test]
fn test_concurrent_staging_keeps_rows_aligned() {
    let store = Arc::new(Store::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("k{}", t);
                    store.stage(&key, record! { key.clone() => i }).unwrap();
                    store.commit().unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.row_count().unwrap(), 100);
    let cols = store.view(&Selection::all()).unwrap().columns().unwrap();
    for column in cols.values() {
        assert_eq!(column.len(), 100);
    }
}
