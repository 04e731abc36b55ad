//! Table (C7): schema, columns, row count, and owned secondary indexes.

use std::collections::HashMap;

use grizzly_column::Column;
use grizzly_error::{GrizzlyError, Result};
use grizzly_index::{BTreeIndex, CompositeHashIndex, OwnedKey};
use grizzly_types::{DataType, RowId, Value};

/// One column's declared name and type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name, unique within a table.
    pub name: String,
    /// Declared storage type.
    pub data_type: DataType,
}

/// Ordered column declarations for a table.
pub type Schema = Vec<ColumnDef>;

struct BTreeEntry {
    column: String,
    index: BTreeIndex,
}

struct CompositeEntry {
    columns: Vec<String>,
    index: CompositeHashIndex,
}

/// A single table: schema, parallel column storage, row count, and every
/// index registered against it.
pub struct Table {
    name: String,
    schema: Schema,
    columns: Vec<Column>,
    row_count: u64,
    btree_indexes: HashMap<String, BTreeEntry>,
    composite_indexes: HashMap<String, CompositeEntry>,
    composite_signatures: HashMap<String, String>,
}

impl Table {
    /// Create an empty table with the given schema.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        let columns = schema.iter().map(|def| Column::new(def.data_type)).collect();
        Self {
            name: name.into(),
            schema,
            columns,
            row_count: 0,
            btree_indexes: HashMap::new(),
            composite_indexes: HashMap::new(),
            composite_signatures: HashMap::new(),
        }
    }

    /// Rebuild a table directly from decoded columns, as the snapshot
    /// loader does. Bypasses `insertRow`'s staging validation since every
    /// column was already decoded against the declared schema.
    #[must_use]
    pub fn from_parts(name: impl Into<String>, schema: Schema, columns: Vec<Column>, row_count: u64) -> Self {
        Self {
            name: name.into(),
            schema,
            columns,
            row_count,
            btree_indexes: HashMap::new(),
            composite_indexes: HashMap::new(),
            composite_signatures: HashMap::new(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared schema, in column order.
    #[must_use]
    pub fn schema(&self) -> &[ColumnDef] {
        &self.schema
    }

    /// Number of rows currently stored.
    #[must_use]
    pub const fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Borrow a column by position.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Borrow a column by name.
    pub fn column_by_name(&self, name: &str) -> Result<&Column> {
        let idx = self.column_index(name)?;
        Ok(&self.columns[idx])
    }

    /// `(index_name, column_name)` for every registered B-tree index, used
    /// by the snapshot writer to emit index descriptors.
    pub fn btree_index_descriptors(&self) -> Vec<(String, String)> {
        self.btree_indexes
            .iter()
            .map(|(name, entry)| (name.clone(), entry.column.clone()))
            .collect()
    }

    /// `(index_name, column_names)` for every registered composite index.
    pub fn composite_index_descriptors(&self) -> Vec<(String, Vec<String>)> {
        self.composite_indexes
            .iter()
            .map(|(name, entry)| (name.clone(), entry.columns.clone()))
            .collect()
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.schema
            .iter()
            .position(|def| def.name == name)
            .ok_or_else(|| GrizzlyError::ColumnNotFound(name.to_owned()))
    }

    /// Insert one row. `values.len()` must equal the schema's column count.
    ///
    /// Commits atomically via a staging pass: every value is checked
    /// against its column *before* any column is mutated, so a failure
    /// partway through never leaves earlier columns appended without
    /// their siblings (spec §4.6, documented choice: "commit atomically
    /// (staging)"). The variant check compares only the outer
    /// `DataType`/`Value` tag (`std::mem::discriminant`), not full
    /// `DataType` equality, because a `Vector` column's `dim` lives on
    /// `DataType` itself — a wrong-length vector has the same variant but
    /// a different `dim`, and gets its own dedicated check below so it
    /// surfaces `VectorDimensionMismatch` rather than a generic
    /// `TypeMismatch`, matching `Column::append`'s own error for the same
    /// condition.
    pub fn insert_row(&mut self, values: &[Value<'_>]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(GrizzlyError::internal(format!(
                "insertRow expects {} values, got {}",
                self.columns.len(),
                values.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(values) {
            let (column_type, value_type) = (column.data_type(), value.data_type());
            if std::mem::discriminant(&column_type) != std::mem::discriminant(&value_type) {
                return Err(GrizzlyError::TypeMismatch {
                    expected: column_type.name().to_owned(),
                    found: value_type.name().to_owned(),
                });
            }
            if let (DataType::Vector { dim: expected }, DataType::Vector { dim: found }) = (column_type, value_type) {
                if expected != found {
                    return Err(GrizzlyError::VectorDimensionMismatch {
                        expected: expected as usize,
                        found: found as usize,
                    });
                }
            }
        }

        for (column, value) in self.columns.iter_mut().zip(values) {
            column.append(value)?;
        }
        let row_id = self.row_count;
        self.row_count += 1;

        for entry in self.btree_indexes.values_mut() {
            let col_idx = self
                .schema
                .iter()
                .position(|def| def.name == entry.column)
                .expect("btree index column always exists");
            let key = OwnedKey::from_value(&values[col_idx])?;
            entry.index.insert(key, row_id);
        }
        for entry in self.composite_indexes.values_mut() {
            let row_values: Vec<Value<'_>> = entry
                .columns
                .iter()
                .map(|name| {
                    let idx = self.schema.iter().position(|def| &def.name == name).expect("composite index column always exists");
                    values[idx].clone()
                })
                .collect();
            entry.index.insert_row(&row_values, row_id)?;
        }
        Ok(())
    }

    /// Build a B-tree index named `name` over `column` by scanning existing
    /// rows. Fails [`GrizzlyError::IndexAlreadyExists`] if `name` is taken
    /// or `column` already has a registered B-tree index.
    pub fn create_index(&mut self, name: impl Into<String>, column: &str) -> Result<()> {
        let name = name.into();
        if self.btree_indexes.contains_key(&name) {
            return Err(GrizzlyError::IndexAlreadyExists(name));
        }
        if self.btree_indexes.values().any(|e| e.column == column) {
            return Err(GrizzlyError::IndexAlreadyExists(format!(
                "column {column} already indexed"
            )));
        }
        let col_idx = self.column_index(column)?;
        let mut index = BTreeIndex::new();
        for row_id in 0..self.row_count {
            let value = self.columns[col_idx].get(row_id as usize)?;
            let key = OwnedKey::from_value(&value)?;
            index.insert(key, row_id);
        }
        self.btree_indexes.insert(
            name,
            BTreeEntry {
                column: column.to_owned(),
                index,
            },
        );
        Ok(())
    }

    /// Build a composite hash index named `name` over `columns` (at least
    /// two). Fails [`GrizzlyError::IndexAlreadyExists`] if `name` is taken
    /// or another index already covers the same column set.
    pub fn create_composite_index(&mut self, name: impl Into<String>, columns: &[String]) -> Result<()> {
        let name = name.into();
        if columns.len() < 2 {
            return Err(GrizzlyError::internal(
                "createCompositeIndex requires at least 2 columns",
            ));
        }
        if self.composite_indexes.contains_key(&name) {
            return Err(GrizzlyError::IndexAlreadyExists(name));
        }
        let signature = columns.join("|");
        if self.composite_signatures.contains_key(&signature) {
            return Err(GrizzlyError::IndexAlreadyExists(signature));
        }
        let col_indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>>>()?;

        let mut index = CompositeHashIndex::new(columns.len());
        for row_id in 0..self.row_count {
            let values = col_indices
                .iter()
                .map(|&idx| self.columns[idx].get(row_id as usize))
                .collect::<Result<Vec<_>>>()?;
            index.insert_row(&values, row_id)?;
        }
        self.composite_signatures.insert(signature, name.clone());
        self.composite_indexes.insert(
            name,
            CompositeEntry {
                columns: columns.to_vec(),
                index,
            },
        );
        Ok(())
    }

    /// Look up row-ids via a named B-tree index.
    pub fn lookup_index(&self, name: &str, value: &Value<'_>) -> Result<&[RowId]> {
        let entry = self
            .btree_indexes
            .get(name)
            .ok_or_else(|| GrizzlyError::IndexNotFound(name.to_owned()))?;
        Ok(entry.index.search(value))
    }

    /// Look up row-ids via a named composite hash index.
    pub fn lookup_composite_index(&self, name: &str, values: &[Value<'_>]) -> Result<Vec<RowId>> {
        let entry = self
            .composite_indexes
            .get(name)
            .ok_or_else(|| GrizzlyError::IndexNotFound(name.to_owned()))?;
        entry.index.lookup(values)
    }

    /// Sort all rows by `column`, ascending or descending. Every index is
    /// dropped and rebuilt from scratch afterward — the naive
    /// drop-and-rebuild approach is the storage core's documented
    /// behavior (spec §4.6), not an oversight.
    pub fn sort_by(&mut self, column: &str, ascending: bool) -> Result<()> {
        let col_idx = self.column_index(column)?;
        let len = self.row_count as usize;
        let mut permutation: Vec<usize> = (0..len).collect();
        let sort_column = &self.columns[col_idx];
        let mut err = None;
        permutation.sort_by(|&a, &b| {
            if err.is_some() {
                return std::cmp::Ordering::Equal;
            }
            let (va, vb) = match (sort_column.get(a), sort_column.get(b)) {
                (Ok(va), Ok(vb)) => (va, vb),
                (Err(e), _) | (_, Err(e)) => {
                    err = Some(e);
                    return std::cmp::Ordering::Equal;
                }
            };
            let ordering = va.partial_compare(&vb).unwrap_or(std::cmp::Ordering::Equal);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        if let Some(e) = err {
            return Err(e);
        }

        let mut rebuilt = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let mut fresh = Column::new(column.data_type());
            for &row in &permutation {
                fresh.append(&column.get(row)?)?;
            }
            rebuilt.push(fresh);
        }
        self.columns = rebuilt;

        let btree_names: Vec<(String, String)> = self
            .btree_indexes
            .drain()
            .map(|(name, entry)| (name, entry.column))
            .collect();
        for (name, column) in btree_names {
            self.create_index(name, &column)?;
        }

        let composite_names: Vec<(String, Vec<String>)> = self
            .composite_indexes
            .drain()
            .map(|(name, entry)| (name, entry.columns))
            .collect();
        self.composite_signatures.clear();
        for (name, columns) in composite_names {
            self.create_composite_index(name, &columns)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_table() -> Table {
        Table::new(
            "metrics",
            vec![
                ColumnDef { name: "id".to_owned(), data_type: DataType::Int32 },
                ColumnDef { name: "value".to_owned(), data_type: DataType::String },
            ],
        )
    }

    #[test]
    fn insert_row_rejects_wrong_arity_without_mutating() {
        let mut table = metrics_table();
        let err = table.insert_row(&[Value::Int32(1)]).unwrap_err();
        assert!(matches!(err, GrizzlyError::InternalError(_)));
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn insert_row_type_mismatch_leaves_no_partial_row() {
        let mut table = metrics_table();
        let err = table
            .insert_row(&[Value::Int32(1), Value::Int32(2)])
            .unwrap_err();
        assert!(matches!(err, GrizzlyError::TypeMismatch { .. }));
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.column(0).unwrap().len(), 0);
    }

    #[test]
    fn insert_row_wrong_length_vector_is_dimension_mismatch_not_type_mismatch() {
        let mut table = Table::new(
            "embeddings",
            vec![
                ColumnDef { name: "id".to_owned(), data_type: DataType::Int32 },
                ColumnDef { name: "vec".to_owned(), data_type: DataType::Vector { dim: 3 } },
            ],
        );
        table.insert_row(&[Value::Int32(1), Value::Vector(&[1.0, 2.0, 3.0])]).unwrap();

        let err = table
            .insert_row(&[Value::Int32(2), Value::Vector(&[1.0, 2.0])])
            .unwrap_err();
        assert!(matches!(
            err,
            GrizzlyError::VectorDimensionMismatch { expected: 3, found: 2 }
        ));
        // No partial row: the staging pre-check caught the mismatch before
        // either column was touched.
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.column(0).unwrap().len(), 1);
        assert_eq!(table.column(1).unwrap().len(), 1);
    }

    #[test]
    fn create_index_then_lookup_finds_inserted_rows() {
        let mut table = metrics_table();
        table.insert_row(&[Value::Int32(1), Value::String(b"alpha")]).unwrap();
        table.insert_row(&[Value::Int32(2), Value::String(b"beta")]).unwrap();
        table.create_index("by_id", "id").unwrap();
        assert_eq!(table.lookup_index("by_id", &Value::Int32(2)).unwrap(), &[1]);
        assert!(table.lookup_index("by_id", &Value::Int32(99)).unwrap().is_empty());
    }

    #[test]
    fn create_index_rejects_duplicate_column() {
        let mut table = metrics_table();
        table.create_index("by_id", "id").unwrap();
        let err = table.create_index("by_id_2", "id").unwrap_err();
        assert!(matches!(err, GrizzlyError::IndexAlreadyExists(_)));
    }

    #[test]
    fn composite_index_requires_two_columns() {
        let mut table = metrics_table();
        let err = table
            .create_composite_index("one_col", &["id".to_owned()])
            .unwrap_err();
        assert!(matches!(err, GrizzlyError::InternalError(_)));
    }

    #[test]
    fn sort_by_reorders_rows_and_rebuilds_indexes() {
        let mut table = metrics_table();
        table.insert_row(&[Value::Int32(3), Value::String(b"c")]).unwrap();
        table.insert_row(&[Value::Int32(1), Value::String(b"a")]).unwrap();
        table.insert_row(&[Value::Int32(2), Value::String(b"b")]).unwrap();
        table.create_index("by_id", "id").unwrap();
        table.sort_by("id", true).unwrap();
        assert_eq!(table.column(0).unwrap().get(0).unwrap(), Value::Int32(1));
        assert_eq!(table.column(0).unwrap().get(2).unwrap(), Value::Int32(3));
        // Indexes were rebuilt against the new row order.
        assert_eq!(table.lookup_index("by_id", &Value::Int32(3)).unwrap(), &[2]);
    }
}
