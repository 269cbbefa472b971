//! Staging ledger: one time-aligned row per commit cycle.

use arrow::array::RecordBatch;
use indexmap::IndexMap;
use roost_common::{Columns, Record, Value};

use crate::error::Result;
use crate::materialize::{materialize_rows, with_index};

/// Cross-source merged row store. Every column holds exactly `len` values.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    columns: Columns,
    len: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row built from `staged` and return its index.
    ///
    /// Keys are merged in iteration order, so when two keys carry the same
    /// field the later one wins. Fields seen for the first time are
    /// back-filled with nulls; untouched columns receive a null.
    pub fn commit(&mut self, staged: &IndexMap<String, Record>) -> usize {
        let idx = self.len;

        let mut row: IndexMap<&str, &Value> = IndexMap::new();
        for record in staged.values() {
            for (name, value) in record {
                row.insert(name.as_str(), value);
            }
        }

        for (name, value) in row {
            if let Some(column) = self.columns.get_mut(name) {
                column.push(value.clone());
            } else {
                let mut column = vec![Value::Null; idx];
                column.push(value.clone());
                self.columns.insert(name.to_string(), column);
            }
        }
        for column in self.columns.values_mut() {
            if column.len() == idx {
                column.push(Value::Null);
            }
        }

        self.len += 1;
        idx
    }

    /// Number of committed rows.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// Materialize the ledger with the `index` column (0..len) first.
    pub fn to_table(&self) -> Result<RecordBatch> {
        with_index(&materialize_rows(&self.columns, self.len)?, 0)
    }
}
