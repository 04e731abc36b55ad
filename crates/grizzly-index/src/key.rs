//! [`OwnedKey`]: an owned counterpart of [`Value`] usable as a long-lived
//! index key (indexes outlive the borrow that produced the value being
//! inserted).

use std::cmp::Ordering;

use grizzly_error::{GrizzlyError, Result};
use grizzly_types::Value;

/// An owned, totally-ordered index key. Custom and exception values have no
/// defined ordering (spec §3) and cannot become keys.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedKey {
    /// Signed 32-bit integer key.
    Int32(i32),
    /// Signed 64-bit integer key.
    Int64(i64),
    /// Single-precision float key.
    Float32(f32),
    /// Double-precision float key.
    Float64(f64),
    /// Boolean key.
    Boolean(bool),
    /// Byte-string key.
    String(Vec<u8>),
    /// Timestamp key.
    Timestamp(i64),
    /// Fixed-length vector key.
    Vector(Vec<f32>),
}

impl Eq for OwnedKey {}

impl OwnedKey {
    /// Copy the payload of a borrowed [`Value`] out into an owned key.
    pub fn from_value(value: &Value<'_>) -> Result<Self> {
        match value {
            Value::Int32(v) => Ok(Self::Int32(*v)),
            Value::Int64(v) => Ok(Self::Int64(*v)),
            Value::Float32(v) => Ok(Self::Float32(*v)),
            Value::Float64(v) => Ok(Self::Float64(*v)),
            Value::Boolean(v) => Ok(Self::Boolean(*v)),
            Value::String(v) => Ok(Self::String((*v).to_vec())),
            Value::Timestamp(v) => Ok(Self::Timestamp(*v)),
            Value::Vector(v) => Ok(Self::Vector((*v).to_vec())),
            Value::Custom(_) | Value::Exception(_) => Err(GrizzlyError::UnsupportedOperation {
                op: "index key".to_owned(),
                data_type: value.data_type().name().to_owned(),
            }),
        }
    }

    fn tag_rank(&self) -> u8 {
        match self {
            Self::Int32(_) => 0,
            Self::Int64(_) => 1,
            Self::Float32(_) => 2,
            Self::Float64(_) => 3,
            Self::Boolean(_) => 4,
            Self::String(_) => 5,
            Self::Timestamp(_) => 6,
            Self::Vector(_) => 7,
        }
    }
}

impl PartialOrd for OwnedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OwnedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int32(a), Self::Int32(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) | (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Float32(a), Self::Float32(b)) => a.total_cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.total_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Vector(a), Self::Vector(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.total_cmp(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            // Different tags only arise if a caller mixes key types on one
            // index; order by tag so the tree remains well-formed.
            _ => self.tag_rank().cmp(&other.tag_rank()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_type_orders_numerically() {
        assert!(OwnedKey::Int32(1) < OwnedKey::Int32(2));
    }

    #[test]
    fn floats_order_via_total_cmp() {
        assert!(OwnedKey::Float64(1.0) < OwnedKey::Float64(2.0));
        // total_cmp gives NaN a well-defined slot instead of panicking.
        assert_eq!(
            OwnedKey::Float64(f64::NAN).cmp(&OwnedKey::Float64(f64::NAN)),
            std::cmp::Ordering::Equal
        );
    }

    #[test]
    fn from_value_rejects_custom_and_exception() {
        let custom = Value::Custom(grizzly_types::CustomValue {
            type_name: "x",
            fields: vec![],
        });
        assert!(OwnedKey::from_value(&custom).is_err());
    }
}
