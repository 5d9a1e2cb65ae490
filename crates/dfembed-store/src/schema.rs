use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const ROW_ID: &str = "row_id";
pub const VECTOR: &str = "vector";
pub const TEXT: &str = "text";
pub const INDEXED_AT: &str = "indexed_at";

/// Schema of the embeddings table for a given vector dimension.
pub fn build_embeddings_schema(vector_dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ROW_ID, DataType::Int64, false),
		Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), vector_dim), true),
		Field::new(TEXT, DataType::Utf8, true),
		Field::new(INDEXED_AT, DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}

/// Vector width of an existing table, if it has a fixed-size `vector` column.
pub fn vector_dim_of(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}
