//! Read-only schema report for an input table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub columns: Vec<ColumnInfo>,
    pub num_batches: usize,
    pub num_rows: usize,
}

pub fn analyze(table: &Table) -> SchemaReport {
    let columns = table
        .schema()
        .fields()
        .iter()
        .map(|f| ColumnInfo { name: f.name().clone(), data_type: f.data_type().to_string(), nullable: f.is_nullable() })
        .collect();
    SchemaReport { columns, num_batches: table.batches().len(), num_rows: table.num_rows() }
}

impl SchemaReport {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for SchemaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema ({} columns):", self.columns.len())?;
        for c in &self.columns {
            writeln!(f, "  - {}: {}{}", c.name, c.data_type, if c.nullable { " (nullable)" } else { "" })?;
        }
        write!(f, "{} record batches, {} rows", self.num_batches, self.num_rows)
    }
}
