//! Read-only columnar input and its partition into embedding chunks.
//!
//! A [`Table`] is a list of Arrow record batches sharing one schema. Rows are
//! addressed by a global ordinal that runs across batch boundaries, so a
//! [`Chunk`] may span several batches.

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{Array, RecordBatch};
use arrow_schema::{DataType, SchemaRef};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    /// `offsets[i]` is the global ordinal of the first row of `batches[i]`.
    offsets: Vec<usize>,
    num_rows: usize,
}

impl Table {
    /// Build a table from record batches; the schema is taken from the first batch.
    pub fn try_new(batches: Vec<RecordBatch>) -> Result<Self> {
        let schema = batches
            .first()
            .map(|b| b.schema())
            .ok_or_else(|| Error::InputTypeError("table has no record batches and no schema".into()))?;
        Self::with_schema(schema, batches)
    }

    /// Build a table with an explicit schema. Zero batches is a valid, empty table.
    pub fn with_schema(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        let mut offsets = Vec::with_capacity(batches.len());
        let mut num_rows = 0usize;
        for (i, batch) in batches.iter().enumerate() {
            if batch.schema().fields() != schema.fields() {
                return Err(Error::InputTypeError(format!(
                    "record batch {} does not match the table schema",
                    i
                )));
            }
            offsets.push(num_rows);
            num_rows += batch.num_rows();
        }
        Ok(Self { schema, batches, offsets, num_rows })
    }

    pub fn schema(&self) -> SchemaRef { self.schema.clone() }

    pub fn batches(&self) -> &[RecordBatch] { &self.batches }

    pub fn num_rows(&self) -> usize { self.num_rows }

    pub fn is_empty(&self) -> bool { self.num_rows == 0 }

    /// Split into contiguous chunks of at most `chunk_size` rows, in row order.
    pub fn chunks(&self, chunk_size: usize) -> Result<Vec<Chunk>> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("embedding_chunk_size must be > 0".into()));
        }
        let chunks = (0..self.num_rows)
            .step_by(chunk_size)
            .enumerate()
            .map(|(index, start)| Chunk { index, start, end: (start + chunk_size).min(self.num_rows) })
            .collect();
        Ok(chunks)
    }

    /// Resolve the column used as embedder input. `None` means the whole row.
    pub fn text_column_index(&self, text_column: Option<&str>) -> Result<Option<usize>> {
        match text_column {
            None => Ok(None),
            Some(name) => self
                .schema
                .index_of(name)
                .map(Some)
                .map_err(|_| Error::InvalidConfig(format!("text_column '{}' not found in table", name))),
        }
    }

    /// Render a row as embedder input text.
    ///
    /// With `column` set only that value is used; otherwise every column is
    /// rendered as `"<name> is <value>"` and joined with `"; "`.
    pub fn render_row(&self, row: usize, column: Option<usize>) -> Result<String> {
        let (batch, local) = self.locate(row)?;
        if let Some(col) = column {
            return Ok(render_value(batch.column(col).as_ref(), local));
        }
        let fields = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| format!("{} is {}", field.name(), render_value(batch.column(i).as_ref(), local)))
            .collect::<Vec<_>>();
        Ok(fields.join("; "))
    }

    fn locate(&self, row: usize) -> Result<(&RecordBatch, usize)> {
        if row >= self.num_rows {
            return Err(Error::InputTypeError(format!("row {} out of range ({} rows)", row, self.num_rows)));
        }
        // Last batch whose first row is <= row; empty batches are skipped by the bound.
        let mut idx = self.offsets.partition_point(|&start| start <= row) - 1;
        while self.batches[idx].num_rows() == 0 {
            idx -= 1;
        }
        Ok((&self.batches[idx], row - self.offsets[idx]))
    }
}

/// Contiguous row range `[start, end)` dispatched to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn len(&self) -> usize { self.end - self.start }

    pub fn is_empty(&self) -> bool { self.start == self.end }

    pub fn rows(&self) -> std::ops::Range<usize> { self.start..self.end }
}

pub fn render_value(array: &dyn Array, row: usize) -> String {
    if array.is_null(row) {
        return "null".to_string();
    }
    match array.data_type() {
        DataType::Utf8 => array.as_string::<i32>().value(row).to_string(),
        DataType::LargeUtf8 => array.as_string::<i64>().value(row).to_string(),
        DataType::Boolean => array.as_boolean().value(row).to_string(),
        DataType::Int8 => array.as_primitive::<Int8Type>().value(row).to_string(),
        DataType::Int16 => array.as_primitive::<Int16Type>().value(row).to_string(),
        DataType::Int32 => array.as_primitive::<Int32Type>().value(row).to_string(),
        DataType::Int64 => array.as_primitive::<Int64Type>().value(row).to_string(),
        DataType::UInt8 => array.as_primitive::<UInt8Type>().value(row).to_string(),
        DataType::UInt16 => array.as_primitive::<UInt16Type>().value(row).to_string(),
        DataType::UInt32 => array.as_primitive::<UInt32Type>().value(row).to_string(),
        DataType::UInt64 => array.as_primitive::<UInt64Type>().value(row).to_string(),
        DataType::Float32 => array.as_primitive::<Float32Type>().value(row).to_string(),
        DataType::Float64 => array.as_primitive::<Float64Type>().value(row).to_string(),
        DataType::Date32 => array
            .as_primitive::<Date32Type>()
            .value_as_date(row)
            .map(|d| d.to_string())
            .unwrap_or_else(|| "null".to_string()),
        dt => format!("[unhandled type: {}]", dt),
    }
}
