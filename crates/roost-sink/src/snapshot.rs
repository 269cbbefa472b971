//! Full-snapshot sinks: Parquet and Feather (Arrow IPC file).
//!
//! Each save writes the complete reconciled view to a temp file next to the
//! target and renames it into place, so readers never see a partial file.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use arrow::array::RecordBatch;
use arrow::ipc::writer::FileWriter;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use roost_config::CompressionSpec;
use roost_core::{HookError, Selection, Store, StorageSink};
use tracing::info;

use crate::error::{SinkError, SinkResult};
use crate::{ensure_parent, suffixed};

/// Default zstd level for Parquet output.
const ZSTD_LEVEL: i32 = 3;

/// Row group size in rows.
const ROW_GROUP_SIZE: usize = 64 * 1024;

/// Run `write` against a temp file next to `path`, then rename it into place.
fn write_atomically<F>(path: &Path, write: F) -> SinkResult<()>
where
    F: FnOnce(File) -> SinkResult<()>,
{
    ensure_parent(path)?;
    let temp_path = suffixed(path, ".tmp");
    let file = File::create(&temp_path)?;
    if let Err(e) = write(file) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn snapshot(store: &Store) -> SinkResult<RecordBatch> {
    Ok(store.view(&Selection::all())?.into_table())
}

/// Writes the whole store to one Parquet file.
#[derive(Debug)]
pub struct ParquetSink {
    path: PathBuf,
    compression: CompressionSpec,
    // Serializes concurrent saves onto the same temp file.
    write_lock: Mutex<()>,
}

impl ParquetSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ParquetSink {
            path: path.into(),
            compression: CompressionSpec::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_compression(mut self, compression: CompressionSpec) -> Self {
        self.compression = compression;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn properties(&self) -> SinkResult<WriterProperties> {
        let compression = match self.compression {
            CompressionSpec::Zstd => Compression::ZSTD(ZstdLevel::try_new(ZSTD_LEVEL)?),
            CompressionSpec::Snappy => Compression::SNAPPY,
            CompressionSpec::Uncompressed => Compression::UNCOMPRESSED,
        };
        Ok(WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(compression)
            .set_max_row_group_size(ROW_GROUP_SIZE)
            .set_dictionary_enabled(true)
            .build())
    }

    /// Write the current snapshot.
    pub fn write(&self, store: &Store) -> SinkResult<usize> {
        let _guard = self.write_lock.lock().map_err(|_| SinkError::LockPoisoned)?;
        let table = snapshot(store)?;
        let props = self.properties()?;

        write_atomically(&self.path, |file| {
            let mut writer = ArrowWriter::try_new(file, table.schema(), Some(props))?;
            writer.write(&table)?;
            writer.close()?;
            Ok(())
        })?;

        info!(
            path = %self.path.display(),
            rows = table.num_rows(),
            columns = table.num_columns(),
            "wrote parquet snapshot"
        );
        Ok(table.num_rows())
    }
}

impl StorageSink for ParquetSink {
    fn name(&self) -> &str {
        "parquet"
    }

    fn save(&self, store: &Store) -> Result<(), HookError> {
        self.write(store)?;
        Ok(())
    }
}

/// Writes the whole store to one Arrow IPC file.
#[derive(Debug)]
pub struct FeatherSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FeatherSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FeatherSink {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current snapshot.
    pub fn write(&self, store: &Store) -> SinkResult<usize> {
        let _guard = self.write_lock.lock().map_err(|_| SinkError::LockPoisoned)?;
        let table = snapshot(store)?;

        write_atomically(&self.path, |file| {
            let mut writer = FileWriter::try_new(BufWriter::new(file), &table.schema())?;
            writer.write(&table)?;
            writer.finish()?;
            Ok(())
        })?;

        info!(
            path = %self.path.display(),
            rows = table.num_rows(),
            "wrote feather snapshot"
        );
        Ok(table.num_rows())
    }
}

impl StorageSink for FeatherSink {
    fn name(&self) -> &str {
        "feather"
    }

    fn save(&self, store: &Store) -> Result<(), HookError> {
        self.write(store)?;
        Ok(())
    }
}
