//! Table (C7) storage and the `Database` that owns a named set of tables.

pub mod database;
pub mod table;

pub use database::Database;
pub use table::{ColumnDef, Schema, Table};
