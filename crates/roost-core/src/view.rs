//! Slicing view over the ledger and every stored table.
//!
//! A view is computed fresh for every query: the ledger is materialized,
//! reconciled with the stored tables, then rows are extracted by explicit
//! index and columns projected. Stored state is never touched.

use std::fmt;
use std::str::FromStr;

use arrow::array::{AsArray, RecordBatch, RecordBatchOptions, UInt64Array};
use arrow::compute::take;
use arrow::datatypes::Int64Type;
use arrow::util::pretty::pretty_format_batches;
use roost_common::{Columns, INDEX_COLUMN};

use crate::arrays::array_to_values;
use crate::error::{Result, StoreError};
use crate::ledger::Ledger;
use crate::reconcile::Reconciler;

/// A `start:stop:step` range resolved against a length, with the usual
/// slice conventions: negative bounds count from the end, missing bounds
/// cover everything in the step's direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowRange {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl RowRange {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        RowRange { start, stop, step }
    }

    /// The whole range, front to back.
    pub fn full() -> Self {
        Self::default()
    }

    /// Resolve to concrete positions in `0..len`.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(StoreError::InvalidSelector(
                "slice step cannot be zero".to_string(),
            ));
        }

        let len = len as i64;
        let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
        let clamp = |bound: Option<i64>, default: i64| match bound {
            None => default,
            Some(b) if b < 0 => (b + len).max(lower),
            Some(b) => b.min(upper),
        };
        let start = clamp(self.start, if step > 0 { lower } else { upper });
        let stop = clamp(self.stop, if step > 0 { upper } else { lower });

        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
        Ok(out)
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |b: Option<i64>| b.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}:{}", part(self.start), part(self.stop))?;
        if let Some(step) = self.step {
            write!(f, ":{}", step)?;
        }
        Ok(())
    }
}

impl FromStr for RowRange {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(StoreError::InvalidSelector(s.to_string()));
        }
        let bound = |p: &str| -> Result<Option<i64>> {
            if p.is_empty() {
                Ok(None)
            } else {
                p.parse()
                    .map(Some)
                    .map_err(|_| StoreError::InvalidSelector(s.to_string()))
            }
        };
        Ok(RowRange {
            start: bound(parts[0])?,
            stop: bound(parts[1])?,
            step: match parts.get(2) {
                Some(p) => bound(p)?,
                None => None,
            },
        })
    }
}

/// Which rows a view includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSelector {
    Range(RowRange),
    Indices(Vec<usize>),
}

impl RowSelector {
    pub fn resolve(&self, len: usize) -> Result<Vec<usize>> {
        match self {
            RowSelector::Range(range) => range.indices(len),
            RowSelector::Indices(indices) => {
                if let Some(bad) = indices.iter().find(|&&i| i >= len) {
                    return Err(StoreError::InvalidSelector(format!(
                        "row {} out of range for {} rows",
                        bad, len
                    )));
                }
                Ok(indices.clone())
            }
        }
    }
}

/// Which data columns a view includes. `index` is always kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    All,
    Name(String),
    Names(Vec<String>),
    Positions(RowRange),
}

/// A row selector plus a column selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub rows: RowSelector,
    pub columns: ColumnSelector,
}

impl Default for Selection {
    fn default() -> Self {
        Self::all()
    }
}

impl Selection {
    /// Every row and column.
    pub fn all() -> Self {
        Selection {
            rows: RowSelector::Range(RowRange::full()),
            columns: ColumnSelector::All,
        }
    }

    pub fn range(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Selection {
            rows: RowSelector::Range(RowRange::new(start, stop, step)),
            columns: ColumnSelector::All,
        }
    }

    pub fn rows(indices: Vec<usize>) -> Self {
        Selection {
            rows: RowSelector::Indices(indices),
            columns: ColumnSelector::All,
        }
    }

    pub fn with_columns(mut self, columns: ColumnSelector) -> Self {
        self.columns = columns;
        self
    }
}

/// Split on commas outside brackets.
fn split_top_level(s: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        if depth < 0 {
            return Err(StoreError::InvalidSelector(s.to_string()));
        }
    }
    if depth != 0 {
        return Err(StoreError::InvalidSelector(s.to_string()));
    }
    parts.push(s[start..].trim());
    Ok(parts)
}

fn bracketed(s: &str) -> Option<Vec<&str>> {
    let inner = s.strip_prefix('[')?.strip_suffix(']')?.trim();
    if inner.is_empty() {
        return Some(Vec::new());
    }
    Some(inner.split(',').map(str::trim).collect())
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

fn parse_rows(s: &str) -> Result<RowSelector> {
    if let Some(items) = bracketed(s) {
        let indices = items
            .into_iter()
            .map(|i| {
                i.parse::<usize>()
                    .map_err(|_| StoreError::InvalidSelector(s.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(RowSelector::Indices(indices));
    }
    if s.contains(':') {
        return Ok(RowSelector::Range(s.parse()?));
    }
    Err(StoreError::InvalidSelector(s.to_string()))
}

fn parse_columns(s: &str) -> Result<ColumnSelector> {
    if let Some(items) = bracketed(s) {
        return Ok(ColumnSelector::Names(
            items.into_iter().map(|n| unquote(n).to_string()).collect(),
        ));
    }
    if s.contains(':') {
        return Ok(ColumnSelector::Positions(s.parse()?));
    }
    let name = unquote(s);
    if name.is_empty() {
        return Err(StoreError::InvalidSelector(s.to_string()));
    }
    Ok(ColumnSelector::Name(name.to_string()))
}

impl FromStr for Selection {
    type Err = StoreError;

    /// Parses `"start:stop:step"`, `"[i, j]"`, or `"rows, cols"` where
    /// `cols` is a name, `[a, b]`, or a position range.
    fn from_str(s: &str) -> Result<Self> {
        let parts = split_top_level(s.trim())?;
        match parts.as_slice() {
            [rows] => Ok(Selection {
                rows: parse_rows(rows)?,
                columns: ColumnSelector::All,
            }),
            [rows, columns] => Ok(Selection {
                rows: parse_rows(rows)?,
                columns: parse_columns(columns)?,
            }),
            _ => Err(StoreError::InvalidSelector(s.to_string())),
        }
    }
}

/// The reconciled result of one query.
#[derive(Debug, Clone)]
pub struct View {
    table: RecordBatch,
}

impl View {
    /// Build a view from a ledger snapshot and stored tables, in order.
    pub(crate) fn build(
        ledger: &Ledger,
        stored: &[RecordBatch],
        selection: &Selection,
        reconciler: &Reconciler,
    ) -> Result<Self> {
        let mut tables = Vec::with_capacity(stored.len() + 1);
        tables.push(ledger.to_table()?);
        tables.extend(stored.iter().cloned());

        let full = reconciler.reconcile_and_concat(&tables)?;
        let rows = select_rows(&full, &selection.rows)?;
        let table = project(&rows, &selection.columns)?;
        Ok(View { table })
    }

    /// The reconciled table.
    pub fn table(&self) -> &RecordBatch {
        &self.table
    }

    pub fn into_table(self) -> RecordBatch {
        self.table
    }

    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    /// Column-oriented raw values, `index` included.
    pub fn columns(&self) -> Result<Columns> {
        let schema = self.table.schema();
        let mut columns = Columns::with_capacity(schema.fields().len());
        for (field, array) in schema.fields().iter().zip(self.table.columns()) {
            columns.insert(field.name().clone(), array_to_values(array.as_ref())?);
        }
        Ok(columns)
    }

    /// Labeled frame keyed by the `index` column.
    pub fn frame(&self) -> Result<Frame> {
        let mut columns = self.columns()?;
        columns.shift_remove(INDEX_COLUMN);
        let index = match self.table.column_by_name(INDEX_COLUMN) {
            Some(array) => array
                .as_primitive_opt::<Int64Type>()
                .ok_or_else(|| StoreError::UnsupportedType(array.data_type().to_string()))?
                .iter()
                .map(|v| v.unwrap_or_default())
                .collect(),
            None => Vec::new(),
        };
        Ok(Frame {
            index,
            columns,
            table: self.table.clone(),
        })
    }
}

fn select_rows(table: &RecordBatch, rows: &RowSelector) -> Result<RecordBatch> {
    let indices = rows.resolve(table.num_rows())?;
    let indices = UInt64Array::from_iter_values(indices.iter().map(|&i| i as u64));
    let columns = table
        .columns()
        .iter()
        .map(|column| take(column.as_ref(), &indices, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(indices.len()));
    Ok(RecordBatch::try_new_with_options(
        table.schema(),
        columns,
        &options,
    )?)
}

fn project(table: &RecordBatch, columns: &ColumnSelector) -> Result<RecordBatch> {
    let schema = table.schema();
    let index_pos = schema.index_of(INDEX_COLUMN).ok();
    let data: Vec<usize> = (0..schema.fields().len())
        .filter(|&i| Some(i) != index_pos)
        .collect();

    let mut keep: Vec<usize> = match columns {
        ColumnSelector::All => return Ok(table.clone()),
        ColumnSelector::Name(name) => schema.index_of(name).ok().into_iter().collect(),
        ColumnSelector::Names(names) => names
            .iter()
            .filter_map(|n| schema.index_of(n).ok())
            .collect(),
        ColumnSelector::Positions(range) => range
            .indices(data.len())?
            .into_iter()
            .map(|p| data[p])
            .collect(),
    };
    keep.retain(|&i| Some(i) != index_pos);
    keep.sort_unstable();
    keep.dedup();
    if let Some(pos) = index_pos {
        keep.insert(0, pos);
    }
    Ok(table.project(&keep)?)
}

/// Tabular presentation of a view, rows labeled by `index`.
#[derive(Debug, Clone)]
pub struct Frame {
    index: Vec<i64>,
    columns: Columns,
    table: RecordBatch,
}

impl Frame {
    pub fn index(&self) -> &[i64] {
        &self.index
    }

    /// Data columns, without `index`.
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered =
            pretty_format_batches(std::slice::from_ref(&self.table)).map_err(|_| fmt::Error)?;
        write!(f, "{}", rendered)
    }
}
