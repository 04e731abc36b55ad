//! Shared leaf types: [`DataType`], [`Value`], and the stable hashing used
//! to drive [`grizzly_index`](https://docs.rs/grizzly-index) buckets and
//! [`grizzly_hll`](https://docs.rs/grizzly-hll) registers.
//!
//! `Value` borrows string and vector payloads from whatever owns the bytes
//! (a [`Column`](https://docs.rs/grizzly-column) slot, typically); it never
//! allocates on its own.

pub mod value;

pub use value::{CustomValue, ExceptionValue, Value};

/// The row identifier used by every index and table (0-based, monotonic
/// per table, never reused once a row has been inserted).
pub type RowId = u64;

/// Tagged, fixed-size scalar/compound kind for a [`Value`] or a column.
///
/// Tag byte mapping is part of the stable on-disk snapshot format and must
/// never be renumbered (see `grizzly-persist`'s snapshot header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// IEEE-754 single precision float.
    Float32,
    /// IEEE-754 double precision float.
    Float64,
    /// Boolean.
    Boolean,
    /// UTF-8-agnostic byte string (no encoding is assumed or validated).
    String,
    /// Unix-epoch nanosecond timestamp, represented as `i64`.
    Timestamp,
    /// Fixed-length sequence of `f32`, dimension carried out-of-band.
    Vector {
        /// Number of `f32` lanes per value.
        dim: u16,
    },
    /// Opaque named struct with declared field names.
    Custom,
    /// An error/exception payload; carries no ordering.
    Exception,
}

impl DataType {
    /// The stable on-disk tag byte for this type (spec §6).
    #[must_use]
    pub const fn tag_byte(self) -> u8 {
        match self {
            Self::Int32 => 0,
            Self::Int64 => 1,
            Self::Float32 => 2,
            Self::Float64 => 3,
            Self::Boolean => 4,
            Self::String => 5,
            Self::Timestamp => 6,
            Self::Vector { .. } => 7,
            Self::Custom => 8,
            Self::Exception => 9,
        }
    }

    /// Reconstruct a type from its stable tag byte and (for `Vector`) its
    /// dimension, as read back from a snapshot or delta file.
    pub fn from_tag(tag: u8, dim: u16) -> grizzly_error::Result<Self> {
        match tag {
            0 => Ok(Self::Int32),
            1 => Ok(Self::Int64),
            2 => Ok(Self::Float32),
            3 => Ok(Self::Float64),
            4 => Ok(Self::Boolean),
            5 => Ok(Self::String),
            6 => Ok(Self::Timestamp),
            7 => Ok(Self::Vector { dim }),
            8 => Ok(Self::Custom),
            9 => Ok(Self::Exception),
            other => Err(grizzly_error::GrizzlyError::InvalidFileFormat {
                reason: format!("unknown type tag {other}"),
                offset: 0,
            }),
        }
    }

    /// Human-readable name, used in [`grizzly_error::GrizzlyError`] messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Vector { .. } => "vector",
            Self::Custom => "custom",
            Self::Exception => "exception",
        }
    }

    /// Fixed per-slot byte width in a [`Column`](https://docs.rs/grizzly-column)'s
    /// dense buffer. Strings and vectors store an index/offset here; their
    /// payload bytes live in the column's side storage.
    #[must_use]
    pub const fn row_stride(self) -> usize {
        match self {
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 | Self::Timestamp => 8,
            Self::Boolean => 1,
            // Both store a `u32` index into side storage (string pool slot,
            // or vector_storage row offset).
            Self::String | Self::Vector { .. } => 4,
            Self::Custom | Self::Exception => 8,
        }
    }

    /// True for types over which numeric aggregates (`sum`/`min`/`max`/`avg`) are defined.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Int32 | Self::Int64 | Self::Float32 | Self::Float64
        )
    }
}
