//! [`Value`]: the tagged cell type every column, index, and codec operates on.

use std::cmp::Ordering;

use xxhash_rust::xxh3::Xxh3;

use crate::DataType;

/// An opaque named struct value. Ordering only ever examines `fields.len()`
/// and the sorted field names, never the field values themselves (spec
/// §3: "custom struct ordering compares by field count then by key names
/// sorted").
#[derive(Debug, Clone, PartialEq)]
pub struct CustomValue<'a> {
    /// Declared type name (e.g. `"Money"`).
    pub type_name: &'a str,
    /// Field name/value pairs in declaration order.
    pub fields: Vec<(&'a str, Value<'a>)>,
}

/// An exception payload. Exceptions are never orderable, even against
/// another exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionValue<'a> {
    /// Stable machine-readable exception kind.
    pub kind: &'a str,
    /// Human-readable message.
    pub message: &'a str,
}

/// A tagged cell value.
///
/// `Value` borrows its variable-length payloads (`String`'s bytes,
/// `Vector`'s floats) rather than owning them; the lifetime is bounded by
/// whatever backing store produced it (typically a `Column`'s string pool
/// or vector storage).
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    /// Signed 32-bit integer.
    Int32(i32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// IEEE-754 single precision float.
    Float32(f32),
    /// IEEE-754 double precision float.
    Float64(f64),
    /// Boolean.
    Boolean(bool),
    /// Borrowed string bytes.
    String(&'a [u8]),
    /// Unix-epoch nanosecond timestamp.
    Timestamp(i64),
    /// Borrowed fixed-length float vector.
    Vector(&'a [f32]),
    /// Opaque named struct.
    Custom(CustomValue<'a>),
    /// Exception payload.
    Exception(ExceptionValue<'a>),
}

impl<'a> Value<'a> {
    /// The [`DataType`] this value is tagged with.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Boolean(_) => DataType::Boolean,
            Self::String(_) => DataType::String,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::Vector(v) => DataType::Vector {
                dim: u16::try_from(v.len()).unwrap_or(u16::MAX),
            },
            Self::Custom(_) => DataType::Custom,
            Self::Exception(_) => DataType::Exception,
        }
    }

    /// Partial order, defined only when both values share the same tag.
    /// Cross-tag comparisons and any comparison involving an exception
    /// return `None`.
    #[must_use]
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int32(a), Self::Int32(b)) => a.partial_cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.partial_cmp(b),
            (Self::Float32(a), Self::Float32(b)) => a.partial_cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.partial_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => a.partial_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.partial_cmp(b),
            (Self::Vector(a), Self::Vector(b)) => Some(compare_vectors(a, b)),
            (Self::Custom(a), Self::Custom(b)) => Some(compare_custom(a, b)),
            (Self::Exception(_), Self::Exception(_)) => None,
            _ => None,
        }
    }

    /// Stable-within-process hash (xxh3, seed 0) that folds in the type
    /// tag so that e.g. `Int64(5)` and `Timestamp(5)` hash differently.
    #[must_use]
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = Xxh3::with_seed(0);
        hasher.update(&[self.data_type().tag_byte()]);
        match self {
            Self::Int32(v) => hasher.update(&v.to_le_bytes()),
            Self::Int64(v) | Self::Timestamp(v) => hasher.update(&v.to_le_bytes()),
            Self::Float32(v) => hasher.update(&v.to_le_bytes()),
            Self::Float64(v) => hasher.update(&v.to_le_bytes()),
            Self::Boolean(v) => hasher.update(&[u8::from(*v)]),
            Self::String(v) => hasher.update(v),
            Self::Vector(v) => {
                for f in *v {
                    hasher.update(&f.to_le_bytes());
                }
            }
            Self::Custom(c) => {
                hasher.update(c.type_name.as_bytes());
                for (name, value) in &c.fields {
                    hasher.update(name.as_bytes());
                    let nested = value.stable_hash();
                    hasher.update(&nested.to_le_bytes());
                }
            }
            Self::Exception(e) => {
                hasher.update(e.kind.as_bytes());
                hasher.update(e.message.as_bytes());
            }
        }
        hasher.digest()
    }
}

/// Lexicographic comparison by element, shorter-is-less on a shared prefix.
fn compare_vectors(a: &[f32], b: &[f32]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.partial_cmp(y) {
            Some(Ordering::Equal) | None => continue,
            Some(other) => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn compare_custom(a: &CustomValue<'_>, b: &CustomValue<'_>) -> Ordering {
    match a.fields.len().cmp(&b.fields.len()) {
        Ordering::Equal => {
            let mut a_names: Vec<&str> = a.fields.iter().map(|(n, _)| *n).collect();
            let mut b_names: Vec<&str> = b.fields.iter().map(|(n, _)| *n).collect();
            a_names.sort_unstable();
            b_names.sort_unstable();
            a_names.cmp(&b_names)
        }
        other => other,
    }
}
