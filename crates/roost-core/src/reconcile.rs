//! Schema reconciliation.
//!
//! Tables whose schemas drifted apart are brought to one promoted schema
//! before concatenation. Promotion results are memoized per [`Reconciler`]
//! in a bounded FIFO cache; there is no process-wide state.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use arrow::array::{new_null_array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::compute::{can_cast_types, cast_with_options, concat_batches, CastOptions};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use tracing::trace;

use crate::arrays::stringify_array;
use crate::error::{Result, StoreError};
use crate::lattice::{promote, promote_schema_with};
use crate::types::ColumnType;

/// Default number of memoized promotion results.
pub const DEFAULT_PROMOTION_CACHE_CAPACITY: usize = 256;

/// Hit/miss counters of a [`PromotionCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Bounded memo table for [`promote`], keyed by the sorted, de-duplicated
/// type list. Oldest entries are evicted first.
#[derive(Debug)]
pub struct PromotionCache {
    capacity: usize,
    entries: HashMap<Vec<ColumnType>, ColumnType>,
    order: VecDeque<Vec<ColumnType>>,
    hits: u64,
    misses: u64,
}

impl PromotionCache {
    pub fn new(capacity: usize) -> Self {
        PromotionCache {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    fn key(types: &[ColumnType]) -> Vec<ColumnType> {
        let mut key = types.to_vec();
        key.sort();
        key.dedup();
        key
    }

    /// Promote `types`, consulting and filling the cache.
    pub fn promote(&mut self, types: &[ColumnType]) -> Result<ColumnType> {
        let key = Self::key(types);
        if let Some(ty) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(ty.clone());
        }
        self.misses += 1;

        let ty = promote(&key)?;
        if self.capacity > 0 {
            if self.order.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
            self.order.push_back(key.clone());
            self.entries.insert(key, ty.clone());
        }
        Ok(ty)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

/// Promotes schemas and concatenates drifted tables.
#[derive(Debug)]
pub struct Reconciler {
    cache: Mutex<PromotionCache>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_PROMOTION_CACHE_CAPACITY)
    }
}

impl Reconciler {
    pub fn new(cache_capacity: usize) -> Self {
        Reconciler {
            cache: Mutex::new(PromotionCache::new(cache_capacity)),
        }
    }

    /// Memoized [`promote`].
    pub fn promote(&self, types: &[ColumnType]) -> Result<ColumnType> {
        self.cache
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .promote(types)
    }

    /// Memoized [`crate::lattice::promote_schema`].
    pub fn promote_schema(&self, schemas: &[SchemaRef]) -> Result<Schema> {
        promote_schema_with(schemas, |types| self.promote(types))
    }

    /// Promote the schemas of `tables`, cast each table to the result and
    /// concatenate the rows in input order.
    ///
    /// Columns a table never declared are null-filled. An empty input gives
    /// an empty table with an empty schema.
    pub fn reconcile_and_concat(&self, tables: &[RecordBatch]) -> Result<RecordBatch> {
        if tables.is_empty() {
            return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
        }

        let schemas: Vec<SchemaRef> = tables.iter().map(RecordBatch::schema).collect();
        let target = Arc::new(self.promote_schema(&schemas)?);
        let aligned = tables
            .iter()
            .map(|table| align(&cast(table, &target)?, &target))
            .collect::<Result<Vec<_>>>()?;

        trace!(
            tables = tables.len(),
            columns = target.fields().len(),
            "reconciled tables"
        );
        Ok(concat_batches(&target, &aligned)?)
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self
            .cache
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .stats())
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.cache
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

/// Cast `table` to `target`, restricted to the fields `table` has.
///
/// Columns keep the table's own order; target-only fields are not added.
/// Columns `target` does not name are kept unchanged.
pub fn cast(table: &RecordBatch, target: &Schema) -> Result<RecordBatch> {
    let schema = table.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut arrays = Vec::with_capacity(schema.fields().len());

    for (field, column) in schema.fields().iter().zip(table.columns()) {
        match target.field_with_name(field.name()) {
            Ok(to) => {
                arrays.push(cast_column(field.name(), column, to.data_type())?);
                fields.push(Field::new(field.name(), to.data_type().clone(), true));
            }
            Err(_) => {
                arrays.push(column.clone());
                fields.push(field.as_ref().clone());
            }
        }
    }

    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    let cast = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
    Ok(cast)
}

fn cast_column(name: &str, column: &ArrayRef, to: &DataType) -> Result<ArrayRef> {
    let from = column.data_type();
    if from == to {
        return Ok(column.clone());
    }

    let cast_error = |reason: String| StoreError::Cast {
        field: name.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        reason,
    };

    if can_cast_types(from, to) {
        let options = CastOptions {
            safe: false,
            ..Default::default()
        };
        return cast_with_options(column, to, &options).map_err(|e| cast_error(e.to_string()));
    }
    if to == &DataType::Utf8 {
        return stringify_array(column.as_ref());
    }
    Err(cast_error("no cast kernel".to_string()))
}

/// Reorder `table`'s columns to `target` and null-fill the missing ones.
fn align(table: &RecordBatch, target: &SchemaRef) -> Result<RecordBatch> {
    let num_rows = table.num_rows();
    let arrays = target
        .fields()
        .iter()
        .map(|field| match table.column_by_name(field.name()) {
            Some(column) => column.clone(),
            None => new_null_array(field.data_type(), num_rows),
        })
        .collect();

    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    let aligned = RecordBatch::try_new_with_options(target.clone(), arrays, &options)?;
    Ok(aligned)
}
