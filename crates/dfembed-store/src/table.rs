//! LanceDB connection and housekeeping helpers.
//!
//! Provides database open, an ensure-* helper that creates an empty table on
//! first use, and read-back helpers used to inspect what a run persisted.

use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Int64Type};
use arrow_array::{Array, RecordBatchIterator};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};
use std::sync::Arc;

use dfembed_core::error::{Error, Result};
use dfembed_core::types::EmbeddingRecord;

use crate::schema::{build_embeddings_schema, ROW_ID, TEXT, VECTOR};

pub(crate) fn storage_err<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> Error + '_ {
    move |e| Error::StorageError(format!("{}: {}", context, e))
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(storage_err(uri))
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(storage_err("list tables"))?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<bool> {
    if table_exists(conn, name).await? {
        return Ok(false);
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await.map_err(storage_err(name))?;
    Ok(true)
}

/// Returns true when the table was created by this call.
pub async fn ensure_embeddings_table(conn: &Connection, name: &str, vector_dim: i32) -> Result<bool> {
    ensure_table(conn, name, build_embeddings_schema(vector_dim)).await
}

pub async fn count_rows(conn: &Connection, name: &str) -> Result<usize> {
    let t = conn.open_table(name).execute().await.map_err(storage_err(name))?;
    t.count_rows(None).await.map_err(storage_err(name))
}

/// Scan every persisted record. Order follows the table's fragments.
pub async fn read_records(conn: &Connection, name: &str) -> Result<Vec<EmbeddingRecord>> {
    let t = conn.open_table(name).execute().await.map_err(storage_err(name))?;
    let mut stream = t.query().execute().await.map_err(storage_err(name))?;
    let mut out = Vec::new();
    while let Some(batch) = stream.try_next().await.map_err(storage_err(name))? {
        let missing = |col: &str| Error::StorageError(format!("{}: column '{}' missing", name, col));
        let ids = batch.column_by_name(ROW_ID).ok_or_else(|| missing(ROW_ID))?.as_primitive_opt::<Int64Type>().ok_or_else(|| missing(ROW_ID))?;
        let vectors = batch.column_by_name(VECTOR).ok_or_else(|| missing(VECTOR))?.as_fixed_size_list_opt().ok_or_else(|| missing(VECTOR))?;
        let texts = batch.column_by_name(TEXT).and_then(|c| c.as_string_opt::<i32>());
        for i in 0..batch.num_rows() {
            let list = vectors.value(i);
            let vector = list.as_primitive::<Float32Type>().values().to_vec();
            let text = texts.filter(|t| t.is_valid(i)).map(|t| t.value(i).to_string());
            out.push(EmbeddingRecord::new(ids.value(i) as u64, vector, text));
        }
    }
    Ok(out)
}
