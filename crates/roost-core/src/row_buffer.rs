//! Per-key accumulator aligning sparse records into equal-length columns.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use roost_common::{Columns, Record, Value};

use crate::error::{Result, StoreError};
use crate::materialize::materialize_rows;

/// Append-only buffer of raw records for one source key.
///
/// Every column always holds exactly [`RowBuffer::len`] values; fields a
/// record omits are null-filled, and fields first seen late are back-filled.
#[derive(Debug, Clone, Default)]
pub struct RowBuffer {
    starting_index: usize,
    len: usize,
    columns: Columns,
    schema: Option<SchemaRef>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer carrying a declared schema. The schema is advisory: records
    /// are not checked against it.
    pub fn with_schema(schema: SchemaRef) -> Self {
        RowBuffer {
            schema: Some(schema),
            ..Self::default()
        }
    }

    /// Append one record.
    pub fn add(&mut self, record: Record) {
        let len = self.len;
        for (name, value) in record {
            self.columns
                .entry(name)
                .or_insert_with(|| vec![Value::Null; len])
                .push(value);
        }
        for column in self.columns.values_mut() {
            if column.len() == len {
                column.push(Value::Null);
            }
        }
        self.len += 1;
    }

    /// Start a fresh window, carrying the global row offset forward.
    pub fn rotate(&mut self) {
        self.starting_index += self.len;
        self.len = 0;
        self.columns.clear();
    }

    /// Materialize the current window.
    pub fn to_table(&self) -> Result<RecordBatch> {
        materialize_rows(&self.columns, self.len)
    }

    /// In-flight buffers cannot be sliced; batch them and query the store.
    pub fn slice(&self, _start: usize, _stop: usize) -> Result<RecordBatch> {
        Err(StoreError::NotImplemented(
            "slicing an unbatched row buffer".to_string(),
        ))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Global row label of the first row in the current window.
    pub fn starting_index(&self) -> usize {
        self.starting_index
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn declared_schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{DataType, Float64Type};
    use roost_common::record;

    #[test]
    fn test_sparse_records_stay_aligned() {
        let mut buf = RowBuffer::new();
        buf.add(record! { "a" => 1 });
        buf.add(record! { "b" => "x" });
        buf.add(record! { "a" => 3, "c" => true });

        assert_eq!(buf.len(), 3);
        for column in buf.columns().values() {
            assert_eq!(column.len(), 3);
        }
        assert_eq!(buf.columns()["a"], vec![Value::from(1), Value::Null, Value::from(3)]);
        assert_eq!(buf.columns()["b"], vec![Value::Null, Value::from("x"), Value::Null]);
        assert_eq!(buf.columns()["c"], vec![Value::Null, Value::Null, Value::from(true)]);
    }

    #[test]
    fn test_int_then_float_promotes() {
        let mut buf = RowBuffer::new();
        buf.add(record! { "x" => 1 });
        buf.add(record! { "x" => 1.5 });
        buf.add(record! { "x" => 2, "y" => "s" });

        let table = buf.to_table().unwrap();
        assert_eq!(table.num_rows(), 3);
        let x = table.column_by_name("x").unwrap();
        assert_eq!(x.data_type(), &DataType::Float64);
        assert_eq!(x.as_primitive::<Float64Type>().values().to_vec(), vec![1.0, 1.5, 2.0]);
        let y = table.column_by_name("y").unwrap().as_string::<i32>();
        assert!(y.is_null(0) && y.is_null(1));
        assert_eq!(y.value(2), "s");
    }

    #[test]
    fn test_rotate_keeps_offset() {
        let mut buf = RowBuffer::new();
        buf.add(record! { "a" => 1 });
        buf.add(record! { "a" => 2 });
        buf.rotate();
        assert!(buf.is_empty());
        assert!(buf.columns().is_empty());
        assert_eq!(buf.starting_index(), 2);

        buf.add(record! { "a" => 3 });
        buf.rotate();
        assert_eq!(buf.starting_index(), 3);
    }

    #[test]
    fn test_empty_records_still_count_rows() {
        let mut buf = RowBuffer::new();
        buf.add(Record::new());
        buf.add(Record::new());
        assert_eq!(buf.to_table().unwrap().num_rows(), 2);
    }

    #[test]
    fn test_slice_is_not_implemented() {
        let buf = RowBuffer::new();
        assert!(matches!(buf.slice(0, 1), Err(StoreError::NotImplemented(_))));
    }
}
