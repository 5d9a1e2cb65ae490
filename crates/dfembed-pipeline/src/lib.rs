//! Table → chunks → worker pool → bounded write buffer → LanceDB.
//!
//! [`index`] and [`analyze`] are the whole public surface most callers need;
//! [`Indexer`] exposes the run state and summary for callers that want them.

pub mod buffer;
pub mod context;
pub mod indexer;
pub mod pool;

use std::sync::Arc;

pub use dfembed_core::analyze::{analyze, ColumnInfo, SchemaReport};
pub use dfembed_core::config::IndexConfig;
pub use dfembed_core::error::{Error, Result};
pub use dfembed_core::table::Table;
pub use dfembed_core::traits::Embedder;
pub use indexer::{IndexSummary, Indexer, RunState};

/// Embed every row of `table` and append the vectors to
/// `(config.database_name, config.table_name)`.
///
/// A zero-row table succeeds without touching the store. Nothing is retried:
/// on error, batches committed before the failure stay in the table.
pub async fn index(table: impl Into<Arc<Table>>, config: IndexConfig, embedder: Arc<dyn Embedder>) -> Result<()> {
    Indexer::new(config, embedder).run(table).await.map(|_| ())
}

/// [`index`] for callers without a tokio runtime. Called from inside a
/// runtime it returns `InvalidConfig` instead of blocking that runtime.
pub fn index_blocking(table: impl Into<Arc<Table>>, config: IndexConfig, embedder: Arc<dyn Embedder>) -> Result<()> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::InvalidConfig("index_blocking called from within a tokio runtime; use index().await".into()));
    }
    let rt = tokio::runtime::Runtime::new().map_err(|e| Error::StorageError(format!("starting runtime: {}", e)))?;
    rt.block_on(index(table, config, embedder))
}
