//! The store: staging ledger, batch store and hooks behind one lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use indexmap::IndexMap;
use roost_common::{Record, INDEX_COLUMN};
use tracing::{debug, trace, warn};

use crate::batch_store::BatchStore;
use crate::error::{Result, StoreError};
use crate::hooks::{HookEvent, HookRegistry, StageSink, StorageSink};
use crate::ledger::Ledger;
use crate::reconcile::{Reconciler, DEFAULT_PROMOTION_CACHE_CAPACITY};
use crate::view::{Selection, View};

/// Construction options for a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Declared schemas per source key. Advisory only.
    pub schemas: HashMap<String, SchemaRef>,
    /// Capacity of the promotion memo table; 0 disables it.
    pub promotion_cache_capacity: usize,
    /// Batch a key automatically once its buffer holds this many rows.
    pub batch_threshold: Option<usize>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            schemas: HashMap::new(),
            promotion_cache_capacity: DEFAULT_PROMOTION_CACHE_CAPACITY,
            batch_threshold: None,
        }
    }
}

impl StoreOptions {
    pub fn with_schema(mut self, key: impl Into<String>, schema: SchemaRef) -> Self {
        self.schemas.insert(key.into(), schema);
        self
    }

    pub fn with_promotion_cache_capacity(mut self, capacity: usize) -> Self {
        self.promotion_cache_capacity = capacity;
        self
    }

    pub fn with_batch_threshold(mut self, rows: usize) -> Self {
        self.batch_threshold = Some(rows);
        self
    }
}

#[derive(Debug, Default)]
struct StoreState {
    staged: IndexMap<String, Record>,
    ledger: Ledger,
    batches: BatchStore,
}

/// Thread-safe staging/commit/batch pipeline.
///
/// One mutex guards the ledger, the staged set and every row buffer and
/// stored table. Sinks run after that mutex is released; their failures are
/// logged and counted but never undo the transition that triggered them.
#[derive(Debug)]
pub struct Store {
    state: Mutex<StoreState>,
    hooks: RwLock<HookRegistry>,
    reconciler: Reconciler,
    hook_failures: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn check_reserved(record: &Record) -> Result<()> {
    if record.contains_key(INDEX_COLUMN) {
        return Err(StoreError::ReservedField(INDEX_COLUMN.to_string()));
    }
    Ok(())
}

impl Store {
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        Store {
            state: Mutex::new(StoreState {
                batches: BatchStore::new(options.schemas, options.batch_threshold),
                ..StoreState::default()
            }),
            hooks: RwLock::new(HookRegistry::new()),
            reconciler: Reconciler::new(options.promotion_cache_capacity),
            hook_failures: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // ---- staging ----

    /// Stage `record` for `key` in the current cycle, replacing any record
    /// already staged for that key.
    pub fn stage(&self, key: &str, record: Record) -> Result<()> {
        check_reserved(&record)?;
        let sinks = self.stage_sinks(HookEvent::Stage)?;
        let mirrored = (!sinks.is_empty()).then(|| record.clone());

        {
            let mut state = self.lock()?;
            state.staged.shift_remove(key);
            state.staged.insert(key.to_string(), record);
            trace!(key, staged = state.staged.len(), "staged record");
        }

        if let Some(record) = mirrored {
            self.dispatch_record(HookEvent::Stage, &sinks, key, &record);
        }
        Ok(())
    }

    /// Stage several records in one step. Nothing is staged if any record
    /// is rejected.
    pub fn stage_many<I, K>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Record)>,
        K: Into<String>,
    {
        let entries: Vec<(String, Record)> =
            entries.into_iter().map(|(k, r)| (k.into(), r)).collect();
        for (_, record) in &entries {
            check_reserved(record)?;
        }
        let sinks = self.stage_sinks(HookEvent::Stage)?;
        let mirrored = (!sinks.is_empty()).then(|| entries.clone());

        {
            let mut state = self.lock()?;
            for (key, record) in entries {
                state.staged.shift_remove(&key);
                state.staged.insert(key, record);
            }
            trace!(staged = state.staged.len(), "staged records");
        }

        for (key, record) in mirrored.into_iter().flatten() {
            self.dispatch_record(HookEvent::Stage, &sinks, &key, &record);
        }
        Ok(())
    }

    /// Merge the staged records into one ledger row; returns its index.
    pub fn commit(&self) -> Result<usize> {
        let idx = {
            let mut state = self.lock()?;
            let staged = std::mem::take(&mut state.staged);
            let idx = state.ledger.commit(&staged);
            debug!(
                row = idx,
                keys = staged.len(),
                columns = state.ledger.columns().len(),
                "committed row"
            );
            idx
        };

        self.dispatch_storage(HookEvent::Commit)?;
        Ok(idx)
    }

    // ---- batching ----

    /// Append `record` to `key`'s row buffer.
    ///
    /// With a batch threshold configured, the buffer is batched as soon as
    /// it holds that many rows.
    pub fn add(&self, key: &str, record: Record) -> Result<()> {
        check_reserved(&record)?;
        let sinks = self.stage_sinks(HookEvent::Add)?;
        let mirrored = (!sinks.is_empty()).then(|| record.clone());

        let batched = {
            let mut state = self.lock()?;
            if state.batches.add(key, record) {
                state.batches.batch(key, &self.reconciler)?
            } else {
                0
            }
        };

        if let Some(record) = mirrored {
            self.dispatch_record(HookEvent::Add, &sinks, key, &record);
        }
        if batched > 0 {
            self.dispatch_storage(HookEvent::Batch)?;
        }
        Ok(())
    }

    /// Move `key`'s buffered rows into its stored table; returns rows moved.
    ///
    /// Fails with `UnknownKey` if `key` never received an [`Store::add`].
    pub fn batch(&self, key: &str) -> Result<usize> {
        let moved = self.lock()?.batches.batch(key, &self.reconciler)?;
        if moved > 0 {
            self.dispatch_storage(HookEvent::Batch)?;
        }
        Ok(moved)
    }

    /// Batch every known key; returns rows moved.
    pub fn batch_all(&self) -> Result<usize> {
        let moved = self.lock()?.batches.batch_all(&self.reconciler)?;
        if moved > 0 {
            self.dispatch_storage(HookEvent::Batch)?;
        }
        Ok(moved)
    }

    /// Run the finalize hooks.
    pub fn finalize(&self) -> Result<()> {
        debug!("finalizing store");
        self.dispatch_storage(HookEvent::Finalize)
    }

    // ---- queries ----

    /// Reconciled view over the ledger and every stored table.
    ///
    /// Only the ledger and table handles are copied under the lock.
    pub fn view(&self, selection: &Selection) -> Result<View> {
        let (ledger, stored) = {
            let state = self.lock()?;
            let stored: Vec<RecordBatch> =
                state.batches.tables().map(|(_, t)| t.clone()).collect();
            (state.ledger.clone(), stored)
        };

        let view = View::build(&ledger, &stored, selection, &self.reconciler)?;
        debug!(
            rows = view.num_rows(),
            columns = view.table().num_columns(),
            tables = stored.len() + 1,
            "built view"
        );
        Ok(view)
    }

    /// View over the committed ledger rows alone.
    ///
    /// Ledger rows only ever grow at the end, so incremental exporters can
    /// track a row watermark against this view.
    pub fn committed(&self, selection: &Selection) -> Result<View> {
        let ledger = self.lock()?.ledger.clone();
        View::build(&ledger, &[], selection, &self.reconciler)
    }

    /// [`Store::view`] over a textual selector such as `"0:10, [a, b]"`.
    pub fn select(&self, selector: &str) -> Result<View> {
        self.view(&selector.parse()?)
    }

    /// Committed ledger rows.
    pub fn row_count(&self) -> Result<usize> {
        Ok(self.lock()?.ledger.len())
    }

    /// Keys staged in the current cycle, in staging order.
    pub fn staged_keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.staged.keys().cloned().collect())
    }

    /// Keys that have a row buffer, in sorted order.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.batches.keys().map(str::to_string).collect())
    }

    /// Rows waiting in `key`'s buffer.
    pub fn buffered_rows(&self, key: &str) -> Result<usize> {
        let state = self.lock()?;
        state
            .batches
            .buffer(key)
            .map(|b| b.len())
            .ok_or_else(|| StoreError::UnknownKey(key.to_string()))
    }

    /// Rows already moved into `key`'s stored table.
    pub fn stored_rows(&self, key: &str) -> Result<usize> {
        Ok(self.lock()?.batches.stored_rows(key))
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    // ---- hooks ----

    pub fn on_stage(&self, sink: Arc<dyn StageSink>) -> Result<()> {
        self.hooks_mut()?.on_stage(sink);
        Ok(())
    }

    pub fn on_add(&self, sink: Arc<dyn StageSink>) -> Result<()> {
        self.hooks_mut()?.on_add(sink);
        Ok(())
    }

    pub fn on_commit(&self, sink: Arc<dyn StorageSink>) -> Result<()> {
        self.hooks_mut()?.on_commit(sink);
        Ok(())
    }

    pub fn on_batch(&self, sink: Arc<dyn StorageSink>) -> Result<()> {
        self.hooks_mut()?.on_batch(sink);
        Ok(())
    }

    pub fn on_finalize(&self, sink: Arc<dyn StorageSink>) -> Result<()> {
        self.hooks_mut()?.on_finalize(sink);
        Ok(())
    }

    /// Number of sink invocations that returned an error.
    pub fn hook_failures(&self) -> u64 {
        self.hook_failures.load(Ordering::Relaxed)
    }

    fn hooks_mut(&self) -> Result<std::sync::RwLockWriteGuard<'_, HookRegistry>> {
        self.hooks.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn stage_sinks(&self, event: HookEvent) -> Result<Vec<Arc<dyn StageSink>>> {
        let hooks = self.hooks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(hooks.stage_sinks(event))
    }

    fn dispatch_record(
        &self,
        event: HookEvent,
        sinks: &[Arc<dyn StageSink>],
        key: &str,
        record: &Record,
    ) {
        for sink in sinks {
            if let Err(e) = sink.save(self, key, record) {
                self.hook_failures.fetch_add(1, Ordering::Relaxed);
                warn!(event = %event, sink = sink.name(), key, error = %e, "record sink failed");
            }
        }
    }

    fn dispatch_storage(&self, event: HookEvent) -> Result<()> {
        let sinks = self
            .hooks
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .storage_sinks(event);
        for sink in &sinks {
            if let Err(e) = sink.save(self) {
                self.hook_failures.fetch_add(1, Ordering::Relaxed);
                warn!(event = %event, sink = sink.name(), error = %e, "storage sink failed");
            }
        }
        Ok(())
    }
}
