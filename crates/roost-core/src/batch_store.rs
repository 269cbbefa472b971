//! Per-key history of materialized, reconciled tables.

use std::collections::{BTreeMap, HashMap};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use roost_common::Record;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::materialize::with_index;
use crate::reconcile::Reconciler;
use crate::row_buffer::RowBuffer;

/// Row buffers and their accumulated tables, keyed by source.
///
/// Stored tables carry a leading `index` column with each row's per-key
/// label, so labels survive buffer rotation.
#[derive(Debug, Default)]
pub struct BatchStore {
    buffers: BTreeMap<String, RowBuffer>,
    tables: BTreeMap<String, RecordBatch>,
    declared: HashMap<String, SchemaRef>,
    threshold: Option<usize>,
}

impl BatchStore {
    pub fn new(declared: HashMap<String, SchemaRef>, threshold: Option<usize>) -> Self {
        BatchStore {
            declared,
            threshold,
            ..Self::default()
        }
    }

    /// Append `record` to `key`'s buffer, creating it on first use.
    ///
    /// Returns true when the buffer has reached the batch threshold.
    pub fn add(&mut self, key: &str, record: Record) -> bool {
        let declared = &self.declared;
        let buffer = self.buffers.entry(key.to_string()).or_insert_with(|| {
            let buffer = match declared.get(key) {
                Some(schema) => RowBuffer::with_schema(schema.clone()),
                None => RowBuffer::new(),
            };
            debug!(key, declared = buffer.declared_schema().is_some(), "created row buffer");
            buffer
        });
        buffer.add(record);
        self.threshold.is_some_and(|t| buffer.len() >= t)
    }

    /// Materialize `key`'s buffer and fold it into the stored table.
    ///
    /// Returns the number of rows moved; an empty buffer is a no-op. The
    /// buffer is only rotated once the new stored table is in place.
    pub fn batch(&mut self, key: &str, reconciler: &Reconciler) -> Result<usize> {
        let buffer = self
            .buffers
            .get_mut(key)
            .ok_or_else(|| StoreError::UnknownKey(key.to_string()))?;
        if buffer.is_empty() {
            return Ok(0);
        }

        let rows = buffer.len();
        let fresh = with_index(&buffer.to_table()?, buffer.starting_index())?;
        let combined = match self.tables.get(key) {
            Some(existing) => reconciler.reconcile_and_concat(&[existing.clone(), fresh])?,
            None => fresh,
        };

        buffer.rotate();
        info!(
            key,
            rows,
            total_rows = combined.num_rows(),
            columns = combined.num_columns(),
            "batched rows"
        );
        self.tables.insert(key.to_string(), combined);
        Ok(rows)
    }

    /// Batch every known key in sorted key order; returns rows moved.
    pub fn batch_all(&mut self, reconciler: &Reconciler) -> Result<usize> {
        let keys: Vec<String> = self.buffers.keys().cloned().collect();
        let mut moved = 0;
        for key in keys {
            moved += self.batch(&key, reconciler)?;
        }
        Ok(moved)
    }

    pub fn table(&self, key: &str) -> Option<&RecordBatch> {
        self.tables.get(key)
    }

    /// Stored tables in sorted key order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &RecordBatch)> {
        self.tables.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn buffer(&self, key: &str) -> Option<&RowBuffer> {
        self.buffers.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    /// Rows already moved into the stored table for `key`.
    pub fn stored_rows(&self, key: &str) -> usize {
        self.tables.get(key).map_or(0, RecordBatch::num_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{DataType, Int64Type};
    use roost_common::record;

    fn index_of(table: &RecordBatch) -> Vec<i64> {
        table
            .column_by_name("index")
            .unwrap()
            .as_primitive::<Int64Type>()
            .values()
            .to_vec()
    }

    #[test]
    fn test_batch_unknown_key_is_error() {
        let mut store = BatchStore::default();
        let err = store.batch("nope", &Reconciler::default()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownKey(ref k) if k == "nope"));
    }

    #[test]
    fn test_batch_empty_buffer_is_noop() {
        let mut store = BatchStore::default();
        let reconciler = Reconciler::default();
        store.add("k", record! { "a" => 1 });
        assert_eq!(store.batch("k", &reconciler).unwrap(), 1);
        assert_eq!(store.batch("k", &reconciler).unwrap(), 0);
        assert_eq!(store.stored_rows("k"), 1);
    }

    #[test]
    fn test_batches_accumulate_in_order_with_promotion() {
        let mut store = BatchStore::default();
        let reconciler = Reconciler::default();

        store.add("k", record! { "a" => 1 });
        store.add("k", record! { "a" => 2 });
        store.batch("k", &reconciler).unwrap();

        store.add("k", record! { "a" => 2.5, "b" => "new" });
        store.batch("k", &reconciler).unwrap();

        let table = store.table("k").unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(index_of(table), vec![0, 1, 2]);
        assert_eq!(table.column_by_name("a").unwrap().data_type(), &DataType::Float64);
        let b = table.column_by_name("b").unwrap().as_string::<i32>();
        assert_eq!(b.null_count(), 2);
        assert_eq!(b.value(2), "new");
    }

    #[test]
    fn test_batch_all_in_key_order() {
        let mut store = BatchStore::default();
        store.add("b", record! { "x" => 1 });
        store.add("a", record! { "y" => 1 });
        store.add("a", record! { "y" => 2 });
        assert_eq!(store.batch_all(&Reconciler::default()).unwrap(), 3);
        let keys: Vec<&str> = store.tables().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_threshold_signals_batch() {
        let mut store = BatchStore::new(HashMap::new(), Some(2));
        assert!(!store.add("k", record! { "a" => 1 }));
        assert!(store.add("k", record! { "a" => 2 }));
    }

    #[test]
    fn test_rotation_follows_reconciled_batch() {
        let mut store = BatchStore::default();
        let reconciler = Reconciler::default();
        store.add("k", record! { "a" => u64::MAX });
        store.batch("k", &reconciler).unwrap();

        // uint64 + int64 promote to float64.
        store.add("k", record! { "a" => -1 });
        assert_eq!(store.batch("k", &reconciler).unwrap(), 1);
        assert!(store.buffer("k").unwrap().is_empty());
        assert_eq!(store.buffer("k").unwrap().starting_index(), 2);
    }
}
