//! Column (C2): a dense typed column buffer with append/get and
//! cardinality statistics.
//!
//! Growth doubles capacity and preserves used bytes, following the same
//! copy-into-bigger-buffer shape as the teacher pager's page cache: we
//! never shrink, and we always zero-fill the newly exposed tail.

use std::collections::HashSet;

use grizzly_error::{GrizzlyError, Result};
use grizzly_hll::HyperLogLog;
use grizzly_types::{DataType, Value};

/// Distinct-count statistics for a column, used by the codec chooser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardinalityStats {
    /// Approximate or exact distinct value count (see [`Column::estimate_cardinality`]).
    pub distinct_count: f64,
    /// `distinct_count / length`, in `[0, 1]`.
    pub uniqueness: f64,
}

/// A dense, typed column of row values.
#[derive(Debug)]
pub struct Column {
    data_type: DataType,
    length: usize,
    capacity: usize,
    /// `capacity * data_type.row_stride()` bytes; used prefix is
    /// `length * row_stride()`.
    buffer: Vec<u8>,
    /// Present only for `DataType::String` columns. Indexed by the `u32`
    /// slot value stored in `buffer`.
    string_pool: Option<Vec<Vec<u8>>>,
    /// Present only for `DataType::Vector` columns: `vector_capacity * dim`
    /// floats, contiguous by append order. Indexed by the `u32` slot value
    /// stored in `buffer`.
    vector_storage: Option<Vec<f32>>,
    vector_len: usize,
    vector_capacity: usize,
    vector_dim: Option<u16>,
}

impl Column {
    /// Construct an empty column of the given type. `dim` is required (and
    /// only meaningful) for `DataType::Vector`.
    #[must_use]
    pub fn new(data_type: DataType) -> Self {
        let vector_dim = match data_type {
            DataType::Vector { dim } => Some(dim),
            _ => None,
        };
        Self {
            data_type,
            length: 0,
            capacity: 0,
            buffer: Vec::new(),
            string_pool: matches!(data_type, DataType::String).then(Vec::new),
            vector_storage: vector_dim.map(|_| Vec::new()),
            vector_len: 0,
            vector_capacity: 0,
            vector_dim,
        }
    }

    /// This column's declared type.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Number of rows currently stored.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// True when the column holds no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn stride(&self) -> usize {
        self.data_type.row_stride()
    }

    fn grow_buffer_if_needed(&mut self) {
        if self.length < self.capacity {
            return;
        }
        let new_capacity = (self.capacity * 2).max(4);
        self.buffer.resize(new_capacity * self.stride(), 0);
        self.capacity = new_capacity;
    }

    fn grow_vector_storage_if_needed(&mut self, dim: usize) {
        if self.vector_len < self.vector_capacity {
            return;
        }
        let new_capacity = (self.vector_capacity * 2).max(4);
        self.vector_storage
            .as_mut()
            .expect("vector_storage present for Vector column")
            .resize(new_capacity * dim, 0.0);
        self.vector_capacity = new_capacity;
    }

    fn type_mismatch(&self, found: DataType) -> GrizzlyError {
        GrizzlyError::TypeMismatch {
            expected: self.data_type.name().to_owned(),
            found: found.name().to_owned(),
        }
    }

    /// Append one value. Fails with [`GrizzlyError::TypeMismatch`] if the
    /// value's tag does not match this column's type, or
    /// [`GrizzlyError::VectorDimensionMismatch`] if a vector's length
    /// differs from the column's fixed dimension.
    pub fn append(&mut self, value: &Value<'_>) -> Result<()> {
        match (self.data_type, value) {
            (DataType::Int32, Value::Int32(v)) => {
                self.grow_buffer_if_needed();
                let offset = self.length * 4;
                self.buffer[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
            }
            (DataType::Int64, Value::Int64(v)) => {
                self.grow_buffer_if_needed();
                let offset = self.length * 8;
                self.buffer[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
            }
            (DataType::Float32, Value::Float32(v)) => {
                self.grow_buffer_if_needed();
                let offset = self.length * 4;
                self.buffer[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
            }
            (DataType::Float64, Value::Float64(v)) => {
                self.grow_buffer_if_needed();
                let offset = self.length * 8;
                self.buffer[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
            }
            (DataType::Boolean, Value::Boolean(v)) => {
                self.grow_buffer_if_needed();
                self.buffer[self.length] = u8::from(*v);
            }
            (DataType::Timestamp, Value::Timestamp(v)) => {
                self.grow_buffer_if_needed();
                let offset = self.length * 8;
                self.buffer[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
            }
            (DataType::String, Value::String(bytes)) => {
                self.grow_buffer_if_needed();
                let pool = self
                    .string_pool
                    .as_mut()
                    .expect("string_pool present for String column");
                let index = u32::try_from(pool.len()).map_err(|_| {
                    GrizzlyError::internal("string pool exceeds u32 index space")
                })?;
                pool.push((*bytes).to_vec());
                let offset = self.length * 4;
                self.buffer[offset..offset + 4].copy_from_slice(&index.to_le_bytes());
            }
            (DataType::Vector { dim }, Value::Vector(values)) => {
                if values.len() != dim as usize {
                    return Err(GrizzlyError::VectorDimensionMismatch {
                        expected: dim as usize,
                        found: values.len(),
                    });
                }
                self.grow_buffer_if_needed();
                self.grow_vector_storage_if_needed(dim as usize);
                let row = self.vector_len;
                let storage = self
                    .vector_storage
                    .as_mut()
                    .expect("vector_storage present for Vector column");
                let voffset = row * dim as usize;
                storage[voffset..voffset + dim as usize].copy_from_slice(values);
                self.vector_len += 1;
                let index = u32::try_from(row)
                    .map_err(|_| GrizzlyError::internal("vector storage exceeds u32 index space"))?;
                let offset = self.length * 4;
                self.buffer[offset..offset + 4].copy_from_slice(&index.to_le_bytes());
            }
            (DataType::Custom, Value::Custom(_)) => return Err(GrizzlyError::CustomTypeNotSupported),
            (DataType::Exception, Value::Exception(_)) => {
                return Err(GrizzlyError::ExceptionTypeNotSupported);
            }
            (_, other) => return Err(self.type_mismatch(other.data_type())),
        }
        self.length += 1;
        Ok(())
    }

    /// Borrow the value at `index`. Fails with [`GrizzlyError::IndexOutOfBounds`]
    /// if `index >= len()`.
    pub fn get(&self, index: usize) -> Result<Value<'_>> {
        if index >= self.length {
            return Err(GrizzlyError::IndexOutOfBounds {
                index,
                length: self.length,
            });
        }
        let value = match self.data_type {
            DataType::Int32 => {
                let offset = index * 4;
                Value::Int32(i32::from_le_bytes(
                    self.buffer[offset..offset + 4].try_into().unwrap(),
                ))
            }
            DataType::Int64 => {
                let offset = index * 8;
                Value::Int64(i64::from_le_bytes(
                    self.buffer[offset..offset + 8].try_into().unwrap(),
                ))
            }
            DataType::Float32 => {
                let offset = index * 4;
                Value::Float32(f32::from_le_bytes(
                    self.buffer[offset..offset + 4].try_into().unwrap(),
                ))
            }
            DataType::Float64 => {
                let offset = index * 8;
                Value::Float64(f64::from_le_bytes(
                    self.buffer[offset..offset + 8].try_into().unwrap(),
                ))
            }
            DataType::Boolean => Value::Boolean(self.buffer[index] != 0),
            DataType::Timestamp => {
                let offset = index * 8;
                Value::Timestamp(i64::from_le_bytes(
                    self.buffer[offset..offset + 8].try_into().unwrap(),
                ))
            }
            DataType::String => {
                let offset = index * 4;
                let slot = u32::from_le_bytes(self.buffer[offset..offset + 4].try_into().unwrap());
                let pool = self.string_pool.as_ref().expect("string_pool present");
                Value::String(&pool[slot as usize])
            }
            DataType::Vector { dim } => {
                let offset = index * 4;
                let slot = u32::from_le_bytes(self.buffer[offset..offset + 4].try_into().unwrap());
                let storage = self.vector_storage.as_ref().expect("vector_storage present");
                let voffset = slot as usize * dim as usize;
                Value::Vector(&storage[voffset..voffset + dim as usize])
            }
            DataType::Custom => return Err(GrizzlyError::CustomTypeNotSupported),
            DataType::Exception => return Err(GrizzlyError::ExceptionTypeNotSupported),
        };
        Ok(value)
    }

    /// Iterate borrowed values `[0, len())` in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Value<'_>>> {
        (0..self.length).map(move |i| self.get(i))
    }

    fn require_numeric(&self, op: &str) -> Result<()> {
        if self.data_type.is_numeric() {
            Ok(())
        } else {
            Err(GrizzlyError::UnsupportedOperation {
                op: op.to_owned(),
                data_type: self.data_type.name().to_owned(),
            })
        }
    }

    /// Sum over `[0, len())`. Promotes `int32` to `int64`; returns `0` for
    /// an empty column rather than failing.
    pub fn sum(&self) -> Result<Value<'static>> {
        self.require_numeric("sum")?;
        match self.data_type {
            DataType::Int32 | DataType::Int64 => {
                let mut total: i64 = 0;
                for i in 0..self.length {
                    total += match self.get(i)? {
                        Value::Int32(v) => i64::from(v),
                        Value::Int64(v) => v,
                        _ => unreachable!(),
                    };
                }
                Ok(Value::Int64(total))
            }
            DataType::Float32 | DataType::Float64 => {
                let mut total: f64 = 0.0;
                for i in 0..self.length {
                    total += match self.get(i)? {
                        Value::Float32(v) => f64::from(v),
                        Value::Float64(v) => v,
                        _ => unreachable!(),
                    };
                }
                Ok(Value::Float64(total))
            }
            _ => unreachable!("require_numeric already filtered non-numeric types"),
        }
    }

    fn require_non_empty(&self, op: &str) -> Result<()> {
        if self.length == 0 {
            Err(GrizzlyError::EmptyColumn(op.to_owned()))
        } else {
            Ok(())
        }
    }

    /// Minimum value over `[0, len())`. Fails [`GrizzlyError::EmptyColumn`]
    /// if empty, [`GrizzlyError::UnsupportedOperation`] if non-numeric.
    pub fn min(&self) -> Result<Value<'static>> {
        self.extremum("min", |a, b| a.partial_compare(b) == Some(std::cmp::Ordering::Less))
    }

    /// Maximum value over `[0, len())`.
    pub fn max(&self) -> Result<Value<'static>> {
        self.extremum("max", |a, b| {
            a.partial_compare(b) == Some(std::cmp::Ordering::Greater)
        })
    }

    fn extremum(&self, op: &str, keep_left_if: impl Fn(&Value<'_>, &Value<'_>) -> bool) -> Result<Value<'static>> {
        self.require_numeric(op)?;
        self.require_non_empty(op)?;
        let mut best = self.get(0)?;
        for i in 1..self.length {
            let candidate = self.get(i)?;
            if !keep_left_if(&best, &candidate) {
                best = candidate;
            }
        }
        Ok(owned_scalar(&best))
    }

    /// Arithmetic mean over `[0, len())`, always as `float64`.
    pub fn avg(&self) -> Result<Value<'static>> {
        self.require_numeric("avg")?;
        self.require_non_empty("avg")?;
        let sum = match self.sum()? {
            Value::Int64(v) => v as f64,
            Value::Float64(v) => v,
            _ => unreachable!(),
        };
        Ok(Value::Float64(sum / self.length as f64))
    }

    /// Canonical byte encoding used as an exact-distinct-count key.
    fn exact_key(value: &Value<'_>) -> Vec<u8> {
        let mut buf = vec![value.data_type().tag_byte()];
        match value {
            Value::Int32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Int64(v) | Value::Timestamp(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Float32(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            Value::Float64(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            Value::Boolean(v) => buf.push(u8::from(*v)),
            Value::String(v) => buf.extend_from_slice(v),
            Value::Vector(v) => {
                for f in *v {
                    buf.extend_from_slice(&f.to_bits().to_le_bytes());
                }
            }
            Value::Custom(_) | Value::Exception(_) => {}
        }
        buf
    }

    /// Exact distinct-value count, by full linear scan and a hash set of
    /// canonical byte encodings.
    pub fn count_distinct_exact(&self) -> Result<usize> {
        let mut seen = HashSet::with_capacity(self.length);
        for i in 0..self.length {
            seen.insert(Self::exact_key(&self.get(i)?));
        }
        Ok(seen.len())
    }

    /// Approximate distinct-value count via a fresh HyperLogLog pass.
    pub fn count_distinct_approx(&self) -> Result<f64> {
        let mut hll = HyperLogLog::new();
        for i in 0..self.length {
            hll.add(&self.get(i)?);
        }
        Ok(hll.estimate())
    }

    /// Dispatches to exact or approximate counting based on column length,
    /// per the storage core's cost model:
    /// `len < 10_000` → exact, `10_000..100_000` → HLL,
    /// `>= 100_000` → HLL with a checkpoint callback invoked every 10,000 rows.
    pub fn estimate_cardinality(&self) -> Result<f64> {
        self.estimate_cardinality_with_checkpoint(|_, _| {})
    }

    /// Same as [`Self::estimate_cardinality`], but for columns with at
    /// least 100,000 rows the `on_checkpoint` callback is invoked every
    /// 10,000 rows scanned with the HLL's current register snapshot and
    /// the row index reached so far, letting a caller (the snapshot
    /// writer) persist a resumable checkpoint record mid-scan.
    pub fn estimate_cardinality_with_checkpoint(
        &self,
        mut on_checkpoint: impl FnMut(&HyperLogLog, usize),
    ) -> Result<f64> {
        if self.length < 10_000 {
            return Ok(self.count_distinct_exact()? as f64);
        }
        let mut hll = HyperLogLog::new();
        for i in 0..self.length {
            hll.add(&self.get(i)?);
            if self.length >= 100_000 && i > 0 && i % 10_000 == 0 {
                on_checkpoint(&hll, i);
            }
        }
        Ok(hll.estimate())
    }

    /// Cardinality statistics used by the codec chooser. Fails with
    /// [`GrizzlyError::EmptyColumn`] on an empty column — callers (the
    /// codec chooser) are expected to fall back to a direct sample scan
    /// in that case.
    pub fn cardinality_stats(&self) -> Result<CardinalityStats> {
        if self.length == 0 {
            return Err(GrizzlyError::EmptyColumn("cardinality_stats".to_owned()));
        }
        let distinct_count = self.estimate_cardinality()?;
        Ok(CardinalityStats {
            distinct_count,
            uniqueness: distinct_count / self.length as f64,
        })
    }
}

/// Copy a borrowed scalar `Value` out into an owned, `'static` one. Only
/// valid for the `Copy` scalar variants produced by [`Column::get`] on
/// numeric columns; panics (a programmer error, not a runtime input) if
/// called on a borrowing variant.
fn owned_scalar(value: &Value<'_>) -> Value<'static> {
    match value {
        Value::Int32(v) => Value::Int32(*v),
        Value::Int64(v) => Value::Int64(*v),
        Value::Float32(v) => Value::Float32(*v),
        Value::Float64(v) => Value::Float64(*v),
        Value::Boolean(v) => Value::Boolean(*v),
        Value::Timestamp(v) => Value::Timestamp(*v),
        other => unreachable!("owned_scalar called on non-scalar variant {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int32_column(values: &[i32]) -> Column {
        let mut col = Column::new(DataType::Int32);
        for v in values {
            col.append(&Value::Int32(*v)).unwrap();
        }
        col
    }

    #[test]
    fn append_and_get_roundtrip() {
        let col = int32_column(&[1, 2, 3]);
        assert_eq!(col.len(), 3);
        assert_eq!(col.get(1).unwrap(), Value::Int32(2));
    }

    #[test]
    fn append_wrong_tag_is_type_mismatch() {
        let mut col = Column::new(DataType::Int32);
        let err = col.append(&Value::Boolean(true)).unwrap_err();
        assert!(matches!(err, GrizzlyError::TypeMismatch { .. }));
    }

    #[test]
    fn get_out_of_bounds() {
        let col = int32_column(&[1]);
        let err = col.get(5).unwrap_err();
        assert!(matches!(err, GrizzlyError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn growth_preserves_existing_values() {
        let mut col = Column::new(DataType::Int32);
        for i in 0..100 {
            col.append(&Value::Int32(i)).unwrap();
        }
        for i in 0..100 {
            assert_eq!(col.get(i as usize).unwrap(), Value::Int32(i));
        }
    }

    #[test]
    fn vector_dimension_mismatch_is_rejected() {
        let mut col = Column::new(DataType::Vector { dim: 3 });
        let err = col.append(&Value::Vector(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, GrizzlyError::VectorDimensionMismatch { .. }));
    }

    #[test]
    fn vector_roundtrip() {
        let mut col = Column::new(DataType::Vector { dim: 2 });
        col.append(&Value::Vector(&[1.0, 2.0])).unwrap();
        col.append(&Value::Vector(&[3.0, 4.0])).unwrap();
        assert_eq!(col.get(1).unwrap(), Value::Vector(&[3.0, 4.0]));
    }

    #[test]
    fn string_pool_stores_owned_bytes() {
        let mut col = Column::new(DataType::String);
        col.append(&Value::String(b"apple")).unwrap();
        col.append(&Value::String(b"banana")).unwrap();
        assert_eq!(col.get(0).unwrap(), Value::String(b"apple"));
        assert_eq!(col.get(1).unwrap(), Value::String(b"banana"));
    }

    #[test]
    fn sum_promotes_int32_to_int64() {
        let col = int32_column(&[1, 2, 3]);
        assert_eq!(col.sum().unwrap(), Value::Int64(6));
    }

    #[test]
    fn sum_of_empty_is_zero_not_an_error() {
        let col = Column::new(DataType::Int32);
        assert_eq!(col.sum().unwrap(), Value::Int64(0));
    }

    #[test]
    fn min_max_fail_on_empty() {
        let col = Column::new(DataType::Int32);
        assert!(matches!(col.min().unwrap_err(), GrizzlyError::EmptyColumn(_)));
        assert!(matches!(col.max().unwrap_err(), GrizzlyError::EmptyColumn(_)));
    }

    #[test]
    fn avg_promotes_to_float64() {
        let col = int32_column(&[1, 2, 3, 4]);
        assert_eq!(col.avg().unwrap(), Value::Float64(2.5));
    }

    #[test]
    fn aggregates_reject_non_numeric() {
        let mut col = Column::new(DataType::Boolean);
        col.append(&Value::Boolean(true)).unwrap();
        assert!(matches!(
            col.sum().unwrap_err(),
            GrizzlyError::UnsupportedOperation { .. }
        ));
    }

    #[test]
    fn count_distinct_exact_dedupes() {
        let col = int32_column(&[1, 2, 2, 3, 3, 3]);
        assert_eq!(col.count_distinct_exact().unwrap(), 3);
    }

    #[test]
    fn cardinality_stats_fails_on_empty_column() {
        let col = Column::new(DataType::Int32);
        assert!(matches!(
            col.cardinality_stats().unwrap_err(),
            GrizzlyError::EmptyColumn(_)
        ));
    }

    #[test]
    fn estimate_cardinality_uses_exact_below_ten_thousand() {
        let col = int32_column(&(0..500).collect::<Vec<_>>());
        assert!((col.estimate_cardinality().unwrap() - 500.0).abs() < f64::EPSILON);
    }
}
