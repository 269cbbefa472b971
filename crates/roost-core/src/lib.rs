//! Roost core library.
//!
//! Turns a stream of sparse, heterogeneously typed keyed records into dense,
//! schema-consistent Arrow tables:
//! - Staging ledger: stage/commit merges many sources into one row per cycle
//! - Row buffers and the batch store: per-key append, materialize, rotate
//! - Type promotion lattice and schema reconciliation across drifted tables
//! - Slicing views over the ledger and every stored table
//! - Hook registration for export sinks

pub mod arrays;
pub mod batch_store;
pub mod error;
pub mod hooks;
pub mod lattice;
pub mod ledger;
pub mod materialize;
pub mod reconcile;
pub mod row_buffer;
pub mod store;
pub mod types;
pub mod view;

pub use arrays::array_to_values;
pub use batch_store::BatchStore;
pub use error::{Result, StoreError};
pub use hooks::{HookError, HookEvent, HookRegistry, StageSink, StorageSink};
pub use lattice::{promote, promote_schema, promotion_targets};
pub use ledger::Ledger;
pub use materialize::materialize;
pub use reconcile::{
    cast, CacheStats, PromotionCache, Reconciler, DEFAULT_PROMOTION_CACHE_CAPACITY,
};
pub use row_buffer::RowBuffer;
pub use store::{Store, StoreOptions};
pub use types::{ColumnType, TimestampUnit};
pub use view::{ColumnSelector, Frame, RowRange, RowSelector, Selection, View};

// Re-export the value model so callers need only one crate.
pub use roost_common::{record, Columns, EnumTag, NestedTable, Record, Value};
