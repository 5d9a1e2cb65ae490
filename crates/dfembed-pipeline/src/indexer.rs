use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use tracing::{debug, error, info, warn};

use dfembed_core::config::IndexConfig;
use dfembed_core::error::{Error, Result};
use dfembed_core::table::Table;
use dfembed_core::traits::Embedder;
use dfembed_store::StoreWriter;

use crate::buffer::write_buffer;
use crate::context::RunContext;
use crate::pool::{ChunkQueue, WorkerPool, WorkerSpec};

/// Lifecycle of one indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Chunking,
    Dispatching,
    AwaitingCompletion,
    Flushing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSummary {
    pub chunks: usize,
    pub rows_written: usize,
    pub batches_committed: usize,
}

/// Drives chunking, the worker pool, the write buffer and the store writer
/// for one table at a time.
pub struct Indexer {
    config: IndexConfig,
    embedder: Arc<dyn Embedder>,
    progress: ProgressBar,
    state: RunState,
}

impl Indexer {
    pub fn new(config: IndexConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self { config, embedder, progress: ProgressBar::hidden(), state: RunState::Idle }
    }

    /// Progress bar advanced by every committed batch.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self { self.progress = progress; self }

    pub fn config(&self) -> &IndexConfig { &self.config }

    /// State reached by the most recent run.
    pub fn state(&self) -> RunState { self.state }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "indexer state");
        self.state = next;
    }

    /// Index every row of `table`. Rows are appended; re-running on the same
    /// table name adds the rows again.
    pub async fn run(&mut self, table: impl Into<Arc<Table>>) -> Result<IndexSummary> {
        self.state = RunState::Idle;
        let result = self.run_inner(table.into()).await;
        match &result {
            Ok(summary) => {
                self.transition(RunState::Done);
                info!(rows = summary.rows_written, batches = summary.batches_committed, chunks = summary.chunks, "indexing done");
            }
            Err(e) => {
                self.transition(RunState::Failed);
                error!(kind = e.kind(), "indexing failed: {}", e);
            }
        }
        result
    }

    async fn run_inner(&mut self, table: Arc<Table>) -> Result<IndexSummary> {
        self.config.validate()?;
        let started = Instant::now();

        self.transition(RunState::Chunking);
        let chunks = table.chunks(self.config.embedding_chunk_size)?;
        let text_column = table.text_column_index(self.config.text_column.as_deref())?;
        if chunks.is_empty() {
            info!("input table has no rows, nothing to index");
            return Ok(IndexSummary::default());
        }
        let total_chunks = chunks.len();
        info!(
            rows = table.num_rows(),
            chunks = total_chunks,
            workers = self.config.num_threads,
            chunk_size = self.config.embedding_chunk_size,
            write_buffer = self.config.write_buffer_size,
            "starting indexer"
        );

        self.transition(RunState::Dispatching);
        self.progress.set_length(table.num_rows() as u64);
        let mut writer = StoreWriter::open(&self.config.database_path(), &self.config.table_name, self.config.vector_dim)
            .await?
            .with_progress(self.progress.clone());
        let ctx = Arc::new(RunContext::new());
        let (producer, mut drain) = write_buffer(self.config.write_buffer_size);
        let spec = WorkerSpec {
            table: table.clone(),
            embedder: self.embedder.clone(),
            text_column,
            vector_dim: self.config.vector_dim,
        };
        let pool = WorkerPool::spawn(self.config.num_threads, spec, Arc::new(ChunkQueue::new(chunks)), producer, ctx.clone());

        self.transition(RunState::AwaitingCompletion);
        loop {
            let drained = drain.next_batch().await;
            if ctx.is_cancelled() {
                break;
            }
            let Some(batch) = drained else {
                // Every producer finished and the last batch was exactly full.
                self.enter_flush(&ctx, total_chunks);
                break;
            };
            if batch.last {
                self.enter_flush(&ctx, total_chunks);
                if ctx.is_cancelled() { break; }
            }
            if let Err(e) = writer.write_batch(&batch.records).await {
                ctx.fail(e);
                break;
            }
        }

        if ctx.is_cancelled() {
            let discarded = drain.close();
            if discarded > 0 {
                warn!(discarded, "discarded buffered records after failure");
            }
        }
        let stats = tokio::task::spawn_blocking(move || pool.join())
            .await
            .map_err(|e| Error::StorageError(format!("joining workers: {}", e)))?;
        debug!(?stats, "workers joined");

        if let Some(e) = ctx.take_error() {
            return Err(e);
        }
        writer.finish();
        info!(elapsed = ?started.elapsed(), "all chunks committed");
        Ok(IndexSummary { chunks: total_chunks, rows_written: writer.rows_written(), batches_committed: writer.batches_committed() })
    }

    /// All producers are gone; only flush if every chunk made it into the buffer.
    fn enter_flush(&mut self, ctx: &RunContext, total_chunks: usize) {
        let completed = ctx.chunks_completed();
        if completed != total_chunks {
            // A worker died without recording an error (e.g. a panic outside the embedder).
            ctx.fail(Error::StorageError(format!(
                "workers stopped after {} of {} chunks, final batch not flushed",
                completed, total_chunks
            )));
            return;
        }
        self.transition(RunState::Flushing);
    }
}
