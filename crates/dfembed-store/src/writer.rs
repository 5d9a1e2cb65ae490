use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use indicatif::ProgressBar;
use lancedb::Table;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use dfembed_core::error::{Error, Result};
use dfembed_core::types::EmbeddingRecord;

use crate::schema::{build_embeddings_schema, vector_dim_of};
use crate::table::{ensure_embeddings_table, open_db, storage_err};

/// Single writer of one embeddings table for the duration of a run.
///
/// Every [`StoreWriter::write_batch`] call is one LanceDB append, i.e. one new
/// fragment: readers see the whole batch or none of it.
pub struct StoreWriter {
	table: Table,
	table_name: String,
	vector_dim: usize,
	schema: Arc<arrow_schema::Schema>,
	progress: ProgressBar,
	rows_written: usize,
	batches_committed: usize,
}

impl StoreWriter {
	/// Open `table_name` under `db_path`, creating an empty table if absent.
	pub async fn open(db_path: &Path, table_name: &str, vector_dim: usize) -> Result<Self> {
		let dim = i32::try_from(vector_dim).map_err(|_| Error::InvalidConfig(format!("vector_dim {} out of range", vector_dim)))?;
		let uri = db_path.to_string_lossy();
		let conn = open_db(uri.as_ref()).await?;
		if ensure_embeddings_table(&conn, table_name, dim).await? {
			info!(table = table_name, db = %uri, vector_dim, "created embeddings table");
		}
		let table = conn.open_table(table_name).execute().await.map_err(storage_err(table_name))?;
		let existing = table.schema().await.map_err(storage_err(table_name))?;
		match vector_dim_of(&existing) {
			Some(d) if d == vector_dim => {}
			Some(d) => return Err(Error::DimensionMismatch { expected: vector_dim, actual: d, row: None }),
			None => return Err(Error::StorageError(format!("table '{}' has no fixed-size vector column", table_name))),
		}
		info!(table = table_name, db = %uri, "opened embeddings table");
		Ok(Self {
			table,
			table_name: table_name.to_string(),
			vector_dim,
			schema: build_embeddings_schema(dim),
			progress: ProgressBar::hidden(),
			rows_written: 0,
			batches_committed: 0,
		})
	}

	pub fn with_progress(mut self, progress: ProgressBar) -> Self { self.progress = progress; self }

	pub fn rows_written(&self) -> usize { self.rows_written }

	pub fn batches_committed(&self) -> usize { self.batches_committed }

	/// Validate and append one batch as a single fragment.
	pub async fn write_batch(&mut self, records: &[EmbeddingRecord]) -> Result<usize> {
		if records.is_empty() { return Ok(0); }
		self.validate(records)?;
		let record_batch = self.records_to_record_batch(records)?;
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), self.schema.clone()));
		self.table.add(reader).execute().await.map_err(storage_err(&self.table_name))?;
		self.rows_written += records.len();
		self.batches_committed += 1;
		self.progress.inc(records.len() as u64);
		debug!(table = %self.table_name, rows = records.len(), total = self.rows_written, "committed fragment");
		Ok(records.len())
	}

	/// Rows currently visible in the table, including earlier runs.
	pub async fn count_rows(&self) -> Result<usize> {
		self.table.count_rows(None).await.map_err(storage_err(&self.table_name))
	}

	pub fn finish(&self) {
		self.progress.finish_with_message("indexing completed");
	}

	fn validate(&self, records: &[EmbeddingRecord]) -> Result<()> {
		match records.iter().find(|r| r.vector.len() != self.vector_dim) {
			Some(bad) => Err(Error::DimensionMismatch { expected: self.vector_dim, actual: bad.vector.len(), row: Some(bad.row_id) }),
			None => Ok(()),
		}
	}

	fn records_to_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch> {
		let now = Utc::now().timestamp_millis();
		let mut row_ids = Vec::with_capacity(records.len()); let mut texts = Vec::with_capacity(records.len()); let mut times = Vec::with_capacity(records.len()); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
		for r in records {
			row_ids.push(i64::try_from(r.row_id).map_err(|_| Error::StorageError(format!("row_id {} exceeds Int64", r.row_id)))?);
			texts.push(r.text.as_deref());
			times.push(now);
			vectors.push(Some(r.vector.iter().map(|&x| Some(x)).collect()));
		}
		let record_batch = RecordBatch::try_new(self.schema.clone(), vec![
			Arc::new(Int64Array::from(row_ids)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), self.vector_dim as i32)),
			Arc::new(StringArray::from(texts)),
			Arc::new(TimestampMillisecondArray::from(times)),
		]).map_err(|e| Error::StorageError(format!("building record batch: {}", e)))?;
		Ok(record_batch)
	}
}
