//! Export sinks for the roost store.
//!
//! Snapshot sinks (Parquet, Feather) rewrite the full reconciled view;
//! incremental sinks (Arrow IPC stream, CSV) append committed rows past a
//! watermark; the JSONL stage sink mirrors individual records.

pub mod csv;
pub mod error;
pub mod jsonl;
pub mod snapshot;
pub mod stream;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use roost_config::{SinkKind, SinkSpec};
use roost_core::{HookEvent, StageSink, Store, StorageSink};
use tracing::debug;

pub use csv::CsvSink;
pub use error::{SinkError, SinkResult};
pub use jsonl::JsonlStageSink;
pub use snapshot::{FeatherSink, ParquetSink};
pub use stream::ArrowStreamSink;

/// `path` with `suffix` appended to its final component.
pub(crate) fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

enum Built {
    Stage(Arc<dyn StageSink>),
    Storage(Arc<dyn StorageSink>),
}

fn build(spec: &SinkSpec) -> Built {
    match spec.kind {
        SinkKind::Parquet => Built::Storage(Arc::new(
            ParquetSink::new(&spec.path).with_compression(spec.compression),
        )),
        SinkKind::Feather => Built::Storage(Arc::new(FeatherSink::new(&spec.path))),
        SinkKind::ArrowStream => Built::Storage(Arc::new(ArrowStreamSink::new(&spec.path))),
        SinkKind::Csv => Built::Storage(Arc::new(CsvSink::new(&spec.path))),
        SinkKind::JsonlStage => Built::Stage(Arc::new(JsonlStageSink::new(&spec.path))),
    }
}

/// Build every configured sink and register it on its trigger.
///
/// Fails without registering anything if a sink's kind does not match its
/// trigger.
pub fn install(store: &Store, specs: &[SinkSpec]) -> SinkResult<usize> {
    let mismatch = specs.iter().find(|spec| {
        spec.kind.is_stage_sink() != spec.effective_trigger().event().is_record_event()
    });
    if let Some(spec) = mismatch {
        return Err(SinkError::Trigger {
            sink: spec.kind.to_string(),
            event: spec.effective_trigger().event(),
        });
    }

    for spec in specs {
        let event = spec.effective_trigger().event();
        match (build(spec), event) {
            (Built::Stage(sink), HookEvent::Stage) => store.on_stage(sink)?,
            (Built::Stage(sink), HookEvent::Add) => store.on_add(sink)?,
            (Built::Storage(sink), HookEvent::Commit) => store.on_commit(sink)?,
            (Built::Storage(sink), HookEvent::Batch) => store.on_batch(sink)?,
            (Built::Storage(sink), HookEvent::Finalize) => store.on_finalize(sink)?,
            _ => {
                return Err(SinkError::Trigger {
                    sink: spec.kind.to_string(),
                    event,
                });
            }
        }
        debug!(
            kind = %spec.kind,
            path = %spec.path.display(),
            trigger = %event,
            "installed sink"
        );
    }
    Ok(specs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_config::SinkTrigger;

    #[test]
    fn test_suffixed_keeps_extension() {
        assert_eq!(
            suffixed(Path::new("out/data.parquet"), ".tmp"),
            PathBuf::from("out/data.parquet.tmp")
        );
    }

    #[test]
    fn test_install_rejects_mismatched_trigger() {
        let store = Store::new();
        let specs = vec![
            SinkSpec::new(SinkKind::Csv, "a.csv"),
            SinkSpec::new(SinkKind::Parquet, "a.parquet").with_trigger(SinkTrigger::Add),
        ];
        let err = install(&store, &specs).unwrap_err();
        assert!(matches!(err, SinkError::Trigger { event: HookEvent::Add, .. }));
        assert_eq!(err.code(), 84);
    }
}
