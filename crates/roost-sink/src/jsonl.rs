//! JSON-lines mirror of staged and added records.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use roost_core::{HookError, Record, StageSink, Store};
use serde::Serialize;
use tracing::trace;

use crate::ensure_parent;
use crate::error::{SinkError, SinkResult};

#[derive(Serialize)]
struct Line<'a> {
    key: &'a str,
    record: &'a Record,
}

/// Writes one `{"key": …, "record": {…}}` line per record.
///
/// The file is truncated on the first record and flushed after every line.
#[derive(Debug)]
pub struct JsonlStageSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl JsonlStageSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlStageSink {
            path: path.into(),
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub fn write(&self, key: &str, record: &Record) -> SinkResult<()> {
        let mut guard = self.writer.lock().map_err(|_| SinkError::LockPoisoned)?;
        if guard.is_none() {
            ensure_parent(&self.path)?;
            *guard = Some(BufWriter::new(File::create(&self.path)?));
        }
        let writer = guard.as_mut().ok_or(SinkError::NotInitialized)?;

        serde_json::to_writer(&mut *writer, &Line { key, record })?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        trace!(key, fields = record.len(), "mirrored record");
        Ok(())
    }
}

impl StageSink for JsonlStageSink {
    fn name(&self) -> &str {
        "jsonl_stage"
    }

    fn save(&self, _store: &Store, key: &str, record: &Record) -> Result<(), HookError> {
        self.write(key, record)?;
        Ok(())
    }
}
