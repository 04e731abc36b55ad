//! Database: owns every table by name plus any attached sibling databases.
//!
//! Grounded on the storage core's schema registry pattern: a flat
//! name-to-resource map with explicit attach/detach rather than nested
//! namespacing.

use std::collections::HashMap;

use grizzly_error::{GrizzlyError, Result};
use tracing::info;

use crate::table::{Schema, Table};

/// Owns a set of named tables and any databases attached under an alias.
///
/// Table creation order is preserved separately from the lookup map: the
/// snapshot writer iterates tables in that order so a checkpoint's
/// "resume after table T" pointer means the same thing on every run.
#[derive(Default)]
pub struct Database {
    tables: HashMap<String, Table>,
    order: Vec<String>,
    attached: HashMap<String, Box<Database>>,
}

impl Database {
    /// Construct an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new table. Fails [`GrizzlyError::DuplicateTable`] if the
    /// name is already in use.
    pub fn create_table(&mut self, name: impl Into<String>, schema: Schema) -> Result<()> {
        let name = name.into();
        if self.tables.contains_key(&name) {
            return Err(GrizzlyError::DuplicateTable(name));
        }
        info!(table = %name, "creating table");
        self.order.push(name.clone());
        self.tables.insert(name.clone(), Table::new(name, schema));
        Ok(())
    }

    /// Insert an already-built table (the snapshot loader's path, which
    /// decodes a table's columns before it has a `Database` to live in).
    /// Fails [`GrizzlyError::DuplicateTable`] if the name is taken.
    pub fn insert_table(&mut self, table: Table) -> Result<()> {
        let name = table.name().to_owned();
        if self.tables.contains_key(&name) {
            return Err(GrizzlyError::DuplicateTable(name));
        }
        self.order.push(name.clone());
        self.tables.insert(name, table);
        Ok(())
    }

    /// Tables in creation order, as used by the snapshot writer.
    pub fn tables_in_order(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.order.iter().map(|name| (name.as_str(), &self.tables[name]))
    }

    /// Borrow a table by name.
    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| GrizzlyError::TableNotFound(name.to_owned()))
    }

    /// Mutably borrow a table by name.
    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables.get_mut(name).ok_or_else(|| GrizzlyError::TableNotFound(name.to_owned()))
    }

    /// Remove a table, returning an error if it does not exist.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables
            .remove(name)
            .map(|_| self.order.retain(|n| n != name))
            .ok_or_else(|| GrizzlyError::TableNotFound(name.to_owned()))
    }

    /// Every table name currently present, unordered.
    #[must_use]
    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Build a B-tree index on `table.column`.
    pub fn create_index(&mut self, table: &str, index_name: &str, column: &str) -> Result<()> {
        self.get_table_mut(table)?.create_index(index_name, column)
    }

    /// Build a composite hash index over `table.columns`.
    pub fn create_composite_index(&mut self, table: &str, index_name: &str, columns: &[String]) -> Result<()> {
        self.get_table_mut(table)?.create_composite_index(index_name, columns)
    }

    /// Attach `other` under `alias`, giving its tables a namespaced path
    /// (`alias.table`) for the surrounding SQL engine to resolve. Fails
    /// [`GrizzlyError::DuplicateTable`] if the alias is already attached.
    pub fn attach_database(&mut self, alias: impl Into<String>, other: Database) -> Result<()> {
        let alias = alias.into();
        if self.attached.contains_key(&alias) {
            return Err(GrizzlyError::DuplicateTable(alias));
        }
        self.attached.insert(alias, Box::new(other));
        Ok(())
    }

    /// Detach and return the database previously attached under `alias`.
    pub fn detach_database(&mut self, alias: &str) -> Result<Database> {
        self.attached
            .remove(alias)
            .map(|boxed| *boxed)
            .ok_or_else(|| GrizzlyError::TableNotFound(alias.to_owned()))
    }

    /// Borrow an attached database by alias.
    pub fn attached_database(&self, alias: &str) -> Result<&Database> {
        self.attached.get(alias).map(Box::as_ref).ok_or_else(|| GrizzlyError::TableNotFound(alias.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnDef;
    use grizzly_types::DataType;

    fn sample_schema() -> Schema {
        vec![ColumnDef { name: "id".to_owned(), data_type: DataType::Int32 }]
    }

    #[test]
    fn create_table_rejects_duplicates() {
        let mut db = Database::new();
        db.create_table("t", sample_schema()).unwrap();
        let err = db.create_table("t", sample_schema()).unwrap_err();
        assert!(matches!(err, GrizzlyError::DuplicateTable(_)));
    }

    #[test]
    fn drop_table_then_get_fails() {
        let mut db = Database::new();
        db.create_table("t", sample_schema()).unwrap();
        db.drop_table("t").unwrap();
        assert!(matches!(db.get_table("t").unwrap_err(), GrizzlyError::TableNotFound(_)));
    }

    #[test]
    fn attach_then_detach_roundtrips() {
        let mut outer = Database::new();
        let mut inner = Database::new();
        inner.create_table("analytics", sample_schema()).unwrap();
        outer.attach_database("reporting", inner).unwrap();
        assert!(outer.attached_database("reporting").unwrap().get_table("analytics").is_ok());
        let detached = outer.detach_database("reporting").unwrap();
        assert!(detached.get_table("analytics").is_ok());
        assert!(outer.attached_database("reporting").is_err());
    }

    #[test]
    fn list_tables_reflects_current_set() {
        let mut db = Database::new();
        db.create_table("a", sample_schema()).unwrap();
        db.create_table("b", sample_schema()).unwrap();
        let mut names = db.list_tables();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);
    }
}
