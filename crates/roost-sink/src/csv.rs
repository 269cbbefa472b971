//! Incremental CSV sink over the committed ledger.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use roost_core::{array_to_values, HookError, Selection, Store, StorageSink};
use tracing::{info, warn};

use crate::ensure_parent;
use crate::error::{SinkError, SinkResult};

#[derive(Debug, Default)]
struct CsvState {
    watermark: usize,
    header: Option<Vec<String>>,
}

/// Appends committed rows to a CSV file, writing the header once.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    state: Mutex<CsvState>,
}

/// Whether the CSV writer needs `data_type` rendered to text first.
fn needs_text(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Dictionary(_, _)
            | DataType::List(_)
            | DataType::LargeList(_)
            | DataType::Struct(_)
            | DataType::Map(_, _)
    )
}

/// Render dictionary and nested columns as text.
fn flatten_for_csv(table: &RecordBatch) -> SinkResult<RecordBatch> {
    let schema = table.schema();
    if !schema.fields().iter().any(|f| needs_text(f.data_type())) {
        return Ok(table.clone());
    }

    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for (field, array) in schema.fields().iter().zip(table.columns()) {
        if needs_text(field.data_type()) {
            let text: StringArray = array_to_values(array.as_ref())?
                .iter()
                .map(|v| v.to_text())
                .collect();
            fields.push(Field::new(field.name(), DataType::Utf8, true));
            columns.push(Arc::new(text));
        } else {
            fields.push(field.as_ref().clone());
            columns.push(array.clone());
        }
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSink {
            path: path.into(),
            state: Mutex::new(CsvState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> SinkResult<MutexGuard<'_, CsvState>> {
        self.state.lock().map_err(|_| SinkError::LockPoisoned)
    }

    /// Committed rows from `from` onwards, with CSV-safe column types.
    fn committed_from(store: &Store, from: usize) -> SinkResult<RecordBatch> {
        let table = store
            .committed(&Selection::range(Some(from as i64), None, None))?
            .into_table();
        flatten_for_csv(&table)
    }

    /// Append committed rows past the watermark. Returns the rows written.
    ///
    /// When the committed columns no longer match the header, the file is
    /// rewritten from row 0 under the new header.
    pub fn write(&self, store: &Store) -> SinkResult<usize> {
        let mut state = self.lock()?;
        let mut tail = Self::committed_from(store, state.watermark)?;
        if tail.num_rows() == 0 {
            return Ok(0);
        }
        let names: Vec<String> = tail
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();

        if let Some(header) = state.header.as_ref().filter(|h| **h != names) {
            warn!(
                path = %self.path.display(),
                header = %header.join(","),
                columns = %names.join(","),
                "csv columns drifted, rewriting file"
            );
            state.header = None;
            state.watermark = 0;
            tail = Self::committed_from(store, 0)?;
        }

        let file = if state.header.is_none() {
            ensure_parent(&self.path)?;
            File::create(&self.path)?
        } else {
            OpenOptions::new().append(true).open(&self.path)?
        };

        let mut writer = WriterBuilder::new()
            .with_header(state.header.is_none())
            .build(file);
        writer.write(&tail)?;

        state.header = Some(names);
        state.watermark += tail.num_rows();
        info!(
            path = %self.path.display(),
            rows = tail.num_rows(),
            watermark = state.watermark,
            "appended csv rows"
        );
        Ok(tail.num_rows())
    }
}

impl StorageSink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    fn save(&self, store: &Store) -> Result<(), HookError> {
        self.write(store)?;
        Ok(())
    }
}
