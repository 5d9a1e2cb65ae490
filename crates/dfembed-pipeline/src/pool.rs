//! Fixed set of worker threads embedding chunks of the input table.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use dfembed_core::error::{Error, Result};
use dfembed_core::table::{Chunk, Table};
use dfembed_core::traits::Embedder;
use dfembed_core::types::EmbeddingRecord;

use crate::buffer::BufferProducer;
use crate::context::RunContext;

/// Chunks waiting for a worker. Each chunk is handed out exactly once.
#[derive(Debug)]
pub struct ChunkQueue {
    chunks: Vec<Chunk>,
    next: AtomicUsize,
}

impl ChunkQueue {
    pub fn new(chunks: Vec<Chunk>) -> Self { Self { chunks, next: AtomicUsize::new(0) } }

    pub fn claim(&self) -> Option<Chunk> {
        let idx = self.next.fetch_add(1, Ordering::AcqRel);
        self.chunks.get(idx).copied()
    }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }
}

/// What a worker needs to turn a chunk into records.
#[derive(Clone)]
pub struct WorkerSpec {
    pub table: Arc<Table>,
    pub embedder: Arc<dyn Embedder>,
    pub text_column: Option<usize>,
    pub vector_dim: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub chunks: usize,
    pub rows: usize,
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    /// Start `num_threads` workers pulling from `queue`. The pool owns the only
    /// producers of the buffer: once every worker returns, the drain sees the end.
    pub fn spawn(
        num_threads: usize,
        spec: WorkerSpec,
        queue: Arc<ChunkQueue>,
        producer: BufferProducer,
        ctx: Arc<RunContext>,
    ) -> Self {
        let handles = (0..num_threads.max(1))
            .map(|worker_id| {
                let spec = spec.clone();
                let queue = queue.clone();
                let producer = producer.clone();
                let ctx = ctx.clone();
                thread::spawn(move || worker_loop(worker_id, &spec, &queue, &producer, &ctx))
            })
            .collect();
        Self { handles }
    }

    /// Wait for every worker; a panicked worker contributes empty stats.
    pub fn join(self) -> Vec<WorkerStats> {
        self.handles
            .into_iter()
            .enumerate()
            .map(|(worker_id, h)| {
                h.join().unwrap_or_else(|_| {
                    warn!(worker_id, "embedding worker panicked");
                    WorkerStats::default()
                })
            })
            .collect()
    }
}

fn worker_loop(
    worker_id: usize,
    spec: &WorkerSpec,
    queue: &ChunkQueue,
    producer: &BufferProducer,
    ctx: &RunContext,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    debug!(worker_id, "embedding worker started");
    while !ctx.is_cancelled() {
        let Some(chunk) = queue.claim() else { break };
        let records = match embed_chunk(spec, &chunk) {
            Ok(records) => records,
            Err(e) => {
                if ctx.fail(e) {
                    warn!(worker_id, chunk = chunk.index, "chunk failed, cancelling run");
                }
                break;
            }
        };
        let n = records.len();
        if records.into_iter().any(|r| producer.push(r).is_err()) {
            debug!(worker_id, chunk = chunk.index, "write buffer closed");
            break;
        }
        ctx.chunk_completed();
        stats.chunks += 1;
        stats.rows += n;
        debug!(worker_id, chunk = chunk.index, rows = n, "chunk embedded");
    }
    debug!(worker_id, chunks = stats.chunks, rows = stats.rows, "embedding worker finished");
    stats
}

/// Embed every row of `chunk` in row order. Nothing is emitted for a chunk
/// that fails part-way.
pub fn embed_chunk(spec: &WorkerSpec, chunk: &Chunk) -> Result<Vec<EmbeddingRecord>> {
    let mut records = Vec::with_capacity(chunk.len());
    for row in chunk.rows() {
        let text = spec.table.render_row(row, spec.text_column)?;
        let failure = |message: String| Error::EmbeddingFailure { chunk: chunk.index, row: row as u64, message };
        let vector = panic::catch_unwind(AssertUnwindSafe(|| spec.embedder.embed(&text)))
            .map_err(|_| failure("embedder panicked".to_string()))?
            .map_err(|e| failure(format!("{:#}", e)))?;
        if vector.len() != spec.vector_dim {
            return Err(Error::DimensionMismatch { expected: spec.vector_dim, actual: vector.len(), row: Some(row as u64) });
        }
        records.push(EmbeddingRecord::new(row as u64, vector, Some(text)));
    }
    Ok(records)
}
