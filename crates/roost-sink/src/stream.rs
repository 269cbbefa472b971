//! Incremental Arrow IPC stream sink.
//!
//! Appends committed rows the sink has not written yet. Rows whose schema
//! differs from the open stream's start a new partition file `<path>_<n>`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use arrow::datatypes::SchemaRef;
use arrow::ipc::writer::StreamWriter;
use roost_core::{HookError, Selection, Store, StorageSink};
use tracing::{debug, info, warn};

use crate::error::{SinkError, SinkResult};
use crate::{ensure_parent, suffixed};

#[derive(Default)]
struct StreamState {
    /// Committed rows already written.
    watermark: usize,
    /// Partition number of the open stream.
    partition: Option<usize>,
    schema: Option<SchemaRef>,
    writer: Option<StreamWriter<File>>,
}

/// Streams committed ledger rows into partitioned Arrow IPC files.
pub struct ArrowStreamSink {
    path: PathBuf,
    state: Mutex<StreamState>,
}

impl ArrowStreamSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ArrowStreamSink {
            path: path.into(),
            state: Mutex::new(StreamState::default()),
        }
    }

    /// Path of partition `n`.
    pub fn partition_path(&self, n: usize) -> PathBuf {
        suffixed(&self.path, &format!("_{}", n))
    }

    /// Partitions opened so far.
    pub fn partitions(&self) -> SinkResult<usize> {
        Ok(self.lock()?.partition.map_or(0, |n| n + 1))
    }

    fn lock(&self) -> SinkResult<MutexGuard<'_, StreamState>> {
        self.state.lock().map_err(|_| SinkError::LockPoisoned)
    }

    /// Append committed rows past the watermark. Returns the rows written.
    pub fn write(&self, store: &Store) -> SinkResult<usize> {
        let mut state = self.lock()?;
        let tail = store
            .committed(&Selection::range(Some(state.watermark as i64), None, None))?
            .into_table();
        if tail.num_rows() == 0 {
            return Ok(0);
        }

        let schema = tail.schema();
        if state.schema.as_ref() != Some(&schema) {
            if let Some(mut old) = state.writer.take() {
                old.finish()?;
            }
            let n = state.partition.map_or(0, |n| n + 1);
            let path = self.partition_path(n);
            ensure_parent(&path)?;
            let writer = StreamWriter::try_new(File::create(&path)?, &schema)?;
            debug!(path = %path.display(), partition = n, "opened stream partition");

            state.writer = Some(writer);
            state.partition = Some(n);
            state.schema = Some(schema);
        }

        state
            .writer
            .as_mut()
            .ok_or(SinkError::NotInitialized)?
            .write(&tail)?;
        state.watermark += tail.num_rows();

        info!(
            path = %self.path.display(),
            rows = tail.num_rows(),
            watermark = state.watermark,
            "appended stream rows"
        );
        Ok(tail.num_rows())
    }

    /// Finish the open stream, writing its end-of-stream marker.
    pub fn close(&self) -> SinkResult<()> {
        let mut state = self.lock()?;
        if let Some(mut writer) = state.writer.take() {
            writer.finish()?;
        }
        state.schema = None;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageSink for ArrowStreamSink {
    fn name(&self) -> &str {
        "arrow_stream"
    }

    fn save(&self, store: &Store) -> Result<(), HookError> {
        self.write(store)?;
        Ok(())
    }
}

impl Drop for ArrowStreamSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "failed to finish stream");
        }
    }
}
