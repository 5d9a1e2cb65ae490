//! Input loading for the `dfembed` binary.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use dfembed_core::table::Table;

/// Read a whole Parquet file into memory as one [`Table`].
pub fn read_parquet(path: &Path) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).with_context(|| format!("reading parquet footer of {}", path.display()))?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let batches = reader.collect::<Result<Vec<_>, _>>().with_context(|| format!("decoding {}", path.display()))?;
    Ok(Table::with_schema(schema, batches)?)
}

pub fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%) {msg}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
