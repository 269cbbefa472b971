//! Lifecycle hooks and sink capability contracts.
//!
//! Sinks register against one lifecycle event each. The store dispatches
//! them only after its state lock has been released, so a slow or failing
//! sink never blocks writers or leaves a transition half-applied.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use roost_common::Record;

use crate::store::Store;

/// Error type returned by sinks.
pub type HookError = Box<dyn Error + Send + Sync>;

/// Consumer of the reconciled store state.
pub trait StorageSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn save(&self, store: &Store) -> Result<(), HookError>;
}

/// Consumer of individual records as they are staged or added.
pub trait StageSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn save(&self, store: &Store, key: &str, record: &Record) -> Result<(), HookError>;
}

/// Lifecycle events sinks can be registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    Stage,
    Add,
    Commit,
    Batch,
    Finalize,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Stage => "stage",
            HookEvent::Add => "add",
            HookEvent::Commit => "commit",
            HookEvent::Batch => "batch",
            HookEvent::Finalize => "finalize",
        }
    }

    /// Whether sinks on this event receive individual records.
    pub fn is_record_event(&self) -> bool {
        matches!(self, HookEvent::Stage | HookEvent::Add)
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered sink lists, one per lifecycle event.
#[derive(Default)]
pub struct HookRegistry {
    stage: Vec<Arc<dyn StageSink>>,
    add: Vec<Arc<dyn StageSink>>,
    commit: Vec<Arc<dyn StorageSink>>,
    batch: Vec<Arc<dyn StorageSink>>,
    finalize: Vec<Arc<dyn StorageSink>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_stage(&mut self, sink: Arc<dyn StageSink>) {
        self.stage.push(sink);
    }

    pub fn on_add(&mut self, sink: Arc<dyn StageSink>) {
        self.add.push(sink);
    }

    pub fn on_commit(&mut self, sink: Arc<dyn StorageSink>) {
        self.commit.push(sink);
    }

    pub fn on_batch(&mut self, sink: Arc<dyn StorageSink>) {
        self.batch.push(sink);
    }

    pub fn on_finalize(&mut self, sink: Arc<dyn StorageSink>) {
        self.finalize.push(sink);
    }

    /// Snapshot of the record sinks registered on `event`.
    pub fn stage_sinks(&self, event: HookEvent) -> Vec<Arc<dyn StageSink>> {
        match event {
            HookEvent::Stage => self.stage.clone(),
            HookEvent::Add => self.add.clone(),
            _ => Vec::new(),
        }
    }

    /// Snapshot of the storage sinks registered on `event`.
    pub fn storage_sinks(&self, event: HookEvent) -> Vec<Arc<dyn StorageSink>> {
        match event {
            HookEvent::Commit => self.commit.clone(),
            HookEvent::Batch => self.batch.clone(),
            HookEvent::Finalize => self.finalize.clone(),
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.stage.len()
            + self.add.len()
            + self.commit.len()
            + self.batch.len()
            + self.finalize.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |sinks: Vec<&str>| sinks.join(",");
        f.debug_struct("HookRegistry")
            .field("stage", &names(self.stage.iter().map(|s| s.name()).collect()))
            .field("add", &names(self.add.iter().map(|s| s.name()).collect()))
            .field("commit", &names(self.commit.iter().map(|s| s.name()).collect()))
            .field("batch", &names(self.batch.iter().map(|s| s.name()).collect()))
            .field("finalize", &names(self.finalize.iter().map(|s| s.name()).collect()))
            .finish()
    }
}
