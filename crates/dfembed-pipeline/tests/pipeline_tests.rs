use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow_array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use tempfile::TempDir;

use dfembed_embed::HashEmbedder;
use dfembed_pipeline::{analyze, index, index_blocking, Embedder, Error, IndexConfig, Indexer, RunState, Table};
use dfembed_store::table::{count_rows, open_db, read_records, table_exists};

const DIM: usize = 16;

fn people(rows: i64, per_batch: i64) -> Table {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("age", DataType::Int64, true),
        Field::new("score", DataType::Float64, true),
    ]));
    let mut batches = Vec::new();
    let mut start = 0;
    while start < rows {
        let end = (start + per_batch).min(rows);
        let ids: Vec<i64> = (start..end).collect();
        let names: Vec<String> = ids.iter().map(|i| format!("person-{}", i)).collect();
        let ages: Vec<i64> = ids.iter().map(|i| 20 + i % 50).collect();
        let scores: Vec<f64> = ids.iter().map(|i| *i as f64 / 4.0).collect();
        batches.push(
            RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(Int64Array::from(ids)),
                    Arc::new(StringArray::from(names)),
                    Arc::new(Int64Array::from(ages)),
                    Arc::new(Float64Array::from(scores)),
                ],
            )
            .unwrap(),
        );
        start = end;
    }
    Table::with_schema(schema, batches).unwrap()
}

fn config(tmp: &TempDir, threads: usize, chunk: usize, buffer: usize) -> IndexConfig {
    IndexConfig {
        table_name: "people".into(),
        database_name: tmp.path().join("lance_db").to_string_lossy().into_owned(),
        num_threads: threads,
        embedding_chunk_size: chunk,
        write_buffer_size: buffer,
        vector_dim: DIM,
        text_column: None,
    }
}

fn hash_embedder() -> Arc<dyn Embedder> { Arc::new(HashEmbedder::new(DIM).unwrap()) }

async fn persisted_ids(cfg: &IndexConfig) -> Vec<u64> {
    let conn = open_db(&cfg.database_name).await.unwrap();
    let mut ids: Vec<u64> = read_records(&conn, &cfg.table_name).await.unwrap().into_iter().map(|r| r.row_id).collect();
    ids.sort_unstable();
    ids
}

struct WrongDim;
impl Embedder for WrongDim {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> { Ok(vec![0.5; DIM + 1]) }
}

/// Fails once `fail_after` calls have succeeded.
struct FlakyEmbedder {
    calls: AtomicUsize,
    fail_after: usize,
}
impl Embedder for FlakyEmbedder {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
            anyhow::bail!("model unavailable");
        }
        Ok(vec![0.25; DIM])
    }
}

#[tokio::test]
async fn every_row_is_written_exactly_once() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 4, 7, 10);
    let mut indexer = Indexer::new(cfg.clone(), hash_embedder());
    let summary = indexer.run(people(103, 25)).await.unwrap();

    assert_eq!(indexer.state(), RunState::Done);
    assert_eq!(summary.rows_written, 103);
    assert_eq!(summary.chunks, 15);
    assert_eq!(persisted_ids(&cfg).await, (0..103).collect::<Vec<_>>());
}

#[tokio::test]
async fn thread_count_does_not_change_the_result() {
    let one = TempDir::new().unwrap();
    let eight = TempDir::new().unwrap();
    let cfg_one = config(&one, 1, 5, 8);
    let cfg_eight = config(&eight, 8, 5, 8);
    index(people(60, 60), cfg_one.clone(), hash_embedder()).await.unwrap();
    index(people(60, 60), cfg_eight.clone(), hash_embedder()).await.unwrap();

    let conn_one = open_db(&cfg_one.database_name).await.unwrap();
    let conn_eight = open_db(&cfg_eight.database_name).await.unwrap();
    let mut a = read_records(&conn_one, "people").await.unwrap();
    let mut b = read_records(&conn_eight, "people").await.unwrap();
    a.sort_by_key(|r| r.row_id);
    b.sort_by_key(|r| r.row_id);
    assert_eq!(a, b);
}

#[tokio::test]
async fn single_slot_buffer_completes() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 3, 4, 1);
    let mut indexer = Indexer::new(cfg.clone(), hash_embedder());
    let summary = indexer.run(people(21, 8)).await.unwrap();
    assert_eq!(summary.rows_written, 21);
    assert_eq!(summary.batches_committed, 21);
    assert_eq!(persisted_ids(&cfg).await.len(), 21);
}

#[tokio::test]
async fn wrong_vector_length_fails_without_committing() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 2, 5, 4);
    let mut indexer = Indexer::new(cfg.clone(), Arc::new(WrongDim));
    let err = indexer.run(people(30, 30)).await.unwrap_err();

    assert!(matches!(err, Error::DimensionMismatch { expected: DIM, actual, .. } if actual == DIM + 1));
    assert_eq!(indexer.state(), RunState::Failed);
    let conn = open_db(&cfg.database_name).await.unwrap();
    assert_eq!(count_rows(&conn, "people").await.unwrap(), 0);
}

#[tokio::test]
async fn embedder_failure_is_reported() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 2, 10, 1000);
    let embedder = Arc::new(FlakyEmbedder { calls: AtomicUsize::new(0), fail_after: 12 });
    let mut indexer = Indexer::new(cfg.clone(), embedder);
    let err = indexer.run(people(50, 50)).await.unwrap_err();

    match err {
        Error::EmbeddingFailure { message, .. } => assert!(message.contains("model unavailable")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(indexer.state(), RunState::Failed);
    // The buffer never filled, so nothing reached the store.
    let conn = open_db(&cfg.database_name).await.unwrap();
    assert_eq!(count_rows(&conn, "people").await.unwrap(), 0);
}

#[tokio::test]
async fn committed_batches_survive_a_later_failure() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 1, 5, 5);
    let embedder = Arc::new(FlakyEmbedder { calls: AtomicUsize::new(0), fail_after: 42 });
    let mut indexer = Indexer::new(cfg.clone(), embedder.clone());
    let err = indexer.run(people(1000, 100)).await.unwrap_err();

    assert_eq!(err.kind(), "EmbeddingFailure");
    assert_eq!(indexer.state(), RunState::Failed);
    let conn = open_db(&cfg.database_name).await.unwrap();
    let committed = count_rows(&conn, "people").await.unwrap();
    assert!(committed > 0 && committed <= 40, "committed {committed}");
    assert_eq!(committed % 5, 0, "only whole batches are committed");
    // The worker stopped at the failing chunk instead of claiming the rest.
    assert!(embedder.calls.load(Ordering::SeqCst) < 50);
}

#[tokio::test]
async fn unusable_database_path_is_storage_error() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(&tmp, 2, 5, 5);
    let file = tmp.path().join("not_a_dir");
    std::fs::write(&file, b"plain file").unwrap();
    cfg.database_name = file.to_string_lossy().into_owned();

    let mut indexer = Indexer::new(cfg, hash_embedder());
    let err = indexer.run(people(10, 10)).await.unwrap_err();
    assert_eq!(err.kind(), "StorageError");
    assert_eq!(indexer.state(), RunState::Failed);
}

#[tokio::test]
async fn second_run_appends() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 2, 6, 9);
    index(people(20, 7), cfg.clone(), hash_embedder()).await.unwrap();
    index(people(20, 7), cfg.clone(), hash_embedder()).await.unwrap();

    let ids = persisted_ids(&cfg).await;
    assert_eq!(ids.len(), 40);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 20);
}

#[tokio::test]
async fn empty_table_leaves_store_untouched() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 4, 10, 10);
    let mut indexer = Indexer::new(cfg.clone(), hash_embedder());
    let summary = indexer.run(people(0, 10)).await.unwrap();

    assert_eq!(summary.rows_written, 0);
    assert_eq!(indexer.state(), RunState::Done);
    let conn = open_db(&cfg.database_name).await.unwrap();
    assert!(!table_exists(&conn, "people").await.unwrap());
}

#[tokio::test]
async fn invalid_config_is_rejected_before_any_work() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(&tmp, 4, 10, 10);
    cfg.write_buffer_size = 0;
    let mut indexer = Indexer::new(cfg, hash_embedder());
    let err = indexer.run(people(5, 5)).await.unwrap_err();
    assert_eq!(err.kind(), "InvalidConfig");
    assert_eq!(indexer.state(), RunState::Failed);
}

#[tokio::test]
async fn unknown_text_column_is_invalid_config() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(&tmp, 1, 10, 10);
    cfg.text_column = Some("missing".into());
    let err = index(people(5, 5), cfg, hash_embedder()).await.unwrap_err();
    assert_eq!(err.kind(), "InvalidConfig");
}

#[tokio::test]
async fn text_column_is_embedded_verbatim() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(&tmp, 2, 3, 4);
    cfg.text_column = Some("name".into());
    index(people(6, 6), cfg.clone(), hash_embedder()).await.unwrap();

    let conn = open_db(&cfg.database_name).await.unwrap();
    let mut records = read_records(&conn, "people").await.unwrap();
    records.sort_by_key(|r| r.row_id);
    assert_eq!(records[2].text.as_deref(), Some("person-2"));
    let expected = HashEmbedder::new(DIM).unwrap().embed("person-2").unwrap();
    assert_eq!(records[2].vector, expected);
}

#[tokio::test]
async fn rows_render_as_column_value_pairs() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 1, 10, 10);
    index(people(3, 3), cfg.clone(), hash_embedder()).await.unwrap();

    let conn = open_db(&cfg.database_name).await.unwrap();
    let mut records = read_records(&conn, "people").await.unwrap();
    records.sort_by_key(|r| r.row_id);
    assert_eq!(records[1].text.as_deref(), Some("id is 1; name is person-1; age is 21; score is 0.25"));
}

#[test]
fn blocking_entry_point_runs_without_a_runtime() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 2, 4, 4);
    index_blocking(people(9, 9), cfg.clone(), hash_embedder()).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    assert_eq!(rt.block_on(persisted_ids(&cfg)).len(), 9);
}

#[tokio::test]
async fn blocking_entry_point_refuses_to_nest_runtimes() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, 1, 4, 4);
    let err = index_blocking(people(3, 3), cfg.clone(), hash_embedder()).unwrap_err();
    assert_eq!(err.kind(), "InvalidConfig");
    let conn = open_db(&cfg.database_name).await.unwrap();
    assert!(!table_exists(&conn, "people").await.unwrap());
}

#[test]
fn analyze_reports_columns_and_rows() {
    let report = analyze(&people(12, 5));
    assert_eq!(report.num_rows, 12);
    assert_eq!(report.num_batches, 3);
    let names: Vec<&str> = report.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "age", "score"]);
    assert_eq!(report.column("score").map(|c| c.data_type.as_str()), Some("Float64"));
}
