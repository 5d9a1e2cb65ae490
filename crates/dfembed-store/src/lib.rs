//! Append-only LanceDB persistence for embedding records.

pub mod schema;
pub mod table;
pub mod writer;

pub use writer::StoreWriter;
