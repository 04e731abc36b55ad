//! CompositeHashIndex (C6): a multi-column equality index, hashed on the
//! concatenation of each indexed column's value hash.

use std::collections::HashMap;

use grizzly_error::{GrizzlyError, Result};
use grizzly_types::{RowId, Value};
use tracing::trace;
use xxhash_rust::xxh3::Xxh3;

use crate::key::OwnedKey;

/// Bucket hashmap keyed by the combined hash of an indexed row's values.
/// Lookup verifies every candidate with full value equality to eliminate
/// hash collisions (spec §4.5).
pub struct CompositeHashIndex {
    column_count: usize,
    buckets: HashMap<u64, Vec<(Vec<OwnedKey>, Vec<RowId>)>>,
}

impl CompositeHashIndex {
    /// Build an empty composite index over `column_count` columns.
    /// `createCompositeIndex` requires `column_count >= 2` (spec §4.6); that
    /// check lives in `grizzly-table`, which is the only caller.
    #[must_use]
    pub fn new(column_count: usize) -> Self {
        Self {
            column_count,
            buckets: HashMap::new(),
        }
    }

    fn combined_hash(values: &[Value<'_>]) -> u64 {
        let mut hasher = Xxh3::with_seed(0);
        for value in values {
            hasher.update(&value.stable_hash().to_le_bytes());
        }
        hasher.digest()
    }

    /// Register one row's values under this index. Fails
    /// [`GrizzlyError::InternalError`] if `values.len()` does not match the
    /// index's declared column count.
    pub fn insert_row(&mut self, values: &[Value<'_>], row_id: RowId) -> Result<()> {
        if values.len() != self.column_count {
            return Err(GrizzlyError::internal(format!(
                "composite index expects {} values, got {}",
                self.column_count,
                values.len()
            )));
        }
        let keys = values
            .iter()
            .map(OwnedKey::from_value)
            .collect::<Result<Vec<_>>>()?;
        let hash = Self::combined_hash(values);
        let bucket = self.buckets.entry(hash).or_default();
        if let Some(entry) = bucket.iter_mut().find(|(k, _)| *k == keys) {
            entry.1.push(row_id);
        } else {
            bucket.push((keys, vec![row_id]));
        }
        trace!(row_id, bucket = hash, "composite index row inserted");
        Ok(())
    }

    /// Return the row-ids (in insertion order) whose values match `values`
    /// exactly, or an empty vector if none do.
    pub fn lookup(&self, values: &[Value<'_>]) -> Result<Vec<RowId>> {
        if values.len() != self.column_count {
            return Err(GrizzlyError::internal(format!(
                "composite index expects {} values, got {}",
                self.column_count,
                values.len()
            )));
        }
        let keys = values
            .iter()
            .map(OwnedKey::from_value)
            .collect::<Result<Vec<_>>>()?;
        let hash = Self::combined_hash(values);
        Ok(self
            .buckets
            .get(&hash)
            .and_then(|bucket| bucket.iter().find(|(k, _)| *k == keys))
            .map(|(_, row_ids)| row_ids.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_exact_match() {
        let mut idx = CompositeHashIndex::new(2);
        idx.insert_row(&[Value::Int32(1), Value::String(b"a")], 10).unwrap();
        idx.insert_row(&[Value::Int32(1), Value::String(b"b")], 11).unwrap();
        assert_eq!(idx.lookup(&[Value::Int32(1), Value::String(b"a")]).unwrap(), vec![10]);
        assert_eq!(idx.lookup(&[Value::Int32(1), Value::String(b"b")]).unwrap(), vec![11]);
        assert!(idx.lookup(&[Value::Int32(1), Value::String(b"c")]).unwrap().is_empty());
    }

    #[test]
    fn duplicate_keys_accumulate_row_ids_in_order() {
        let mut idx = CompositeHashIndex::new(1);
        idx.insert_row(&[Value::Int32(7)], 0).unwrap();
        idx.insert_row(&[Value::Int32(7)], 1).unwrap();
        idx.insert_row(&[Value::Int32(7)], 2).unwrap();
        assert_eq!(idx.lookup(&[Value::Int32(7)]).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn wrong_arity_is_internal_error() {
        let idx = CompositeHashIndex::new(2);
        assert!(idx.lookup(&[Value::Int32(1)]).is_err());
    }
}
