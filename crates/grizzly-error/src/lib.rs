//! Error taxonomy shared by every Grizzly crate.
//!
//! Every fallible public operation in the workspace returns [`Result`].
//! Variants are exhaustive per the error kinds enumerated by the storage
//! core's design; callers may match on `kind_str()` for stable logging
//! without depending on the exact `Display` wording.

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GrizzlyError>;

/// The exhaustive error taxonomy for the Grizzly storage core.
#[derive(Debug, thiserror::Error)]
pub enum GrizzlyError {
    /// A [`crate`]-external caller passed a value whose tag does not match
    /// the declared column/argument type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected type name.
        expected: String,
        /// Actual type name encountered.
        found: String,
    },

    /// A vector value's length did not match the column's fixed dimension.
    #[error("vector dimension mismatch: column expects {expected}, value has {found}")]
    VectorDimensionMismatch {
        /// Column's fixed dimension.
        expected: usize,
        /// Length of the offending vector.
        found: usize,
    },

    /// A row index fell outside `[0, length)`.
    #[error("index {index} out of bounds (length {length})")]
    IndexOutOfBounds {
        /// Offending index.
        index: usize,
        /// Column/collection length at the time of the access.
        length: usize,
    },

    /// Requested column does not exist on the table.
    #[error("no such column: {0}")]
    ColumnNotFound(String),

    /// Requested table does not exist on the database.
    #[error("no such table: {0}")]
    TableNotFound(String),

    /// Requested model does not exist in the dependency graph.
    #[error("no such model: {0}")]
    ModelNotFound(String),

    /// Requested periodic schedule does not exist.
    #[error("no such schedule: {0}")]
    ScheduleNotFound(String),

    /// Requested index does not exist.
    #[error("no such index: {0}")]
    IndexNotFound(String),

    /// An index with this name, or over this column/signature, already exists.
    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    /// `createTable` was called with a name already present in the database.
    #[error("table already exists: {0}")]
    DuplicateTable(String),

    /// The dependency graph contains a cycle reachable from the requested node.
    #[error("circular dependency detected involving: {0}")]
    CircularDependency(String),

    /// A snapshot or delta file's magic bytes or structural framing is invalid.
    #[error("invalid file format at offset {offset}: {reason}")]
    InvalidFileFormat {
        /// Reason the framing was rejected.
        reason: String,
        /// Byte offset at which the problem was detected, if known.
        offset: u64,
    },

    /// A snapshot or delta file declares a version newer than this crate supports.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u16),

    /// A file ended before the declared framing said it should.
    #[error("incomplete read: expected {expected} bytes, got {actual}")]
    IncompleteRead {
        /// Bytes the framing declared.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// A DICTIONARY-encoded column referenced a dictionary slot out of range.
    #[error("invalid dictionary index {index} (dictionary has {dict_len} entries)")]
    InvalidDictionaryIndex {
        /// Offending index.
        index: u32,
        /// Size of the dictionary.
        dict_len: u32,
    },

    /// The requested operation is not defined for the column's data type.
    #[error("unsupported operation {op} on type {data_type}")]
    UnsupportedOperation {
        /// Operation name (e.g. `"sum"`, `"min"`).
        op: String,
        /// Data type it was attempted on.
        data_type: String,
    },

    /// An aggregate was requested over a column with zero rows.
    #[error("operation {0} requires a non-empty column")]
    EmptyColumn(String),

    /// `saveIncremental` found no table with new rows relative to the manifest.
    #[error("no changes to persist since the last snapshot/delta")]
    NoChanges,

    /// A delta's recorded base snapshot path did not match the one supplied.
    #[error("delta base snapshot mismatch: delta expects {expected}, got {actual}")]
    SnapshotMismatch {
        /// Base path recorded in the delta.
        expected: String,
        /// Base path the caller supplied.
        actual: String,
    },

    /// A delta's `start_row` did not match the table's current row count.
    #[error("snapshot out of date: table {table} expected start_row {expected}, has {actual}")]
    SnapshotOutOfDate {
        /// Table name.
        table: String,
        /// `start_row` recorded by the delta.
        expected: u64,
        /// Table's actual current row count.
        actual: u64,
    },

    /// Two schemas that were expected to match did not.
    #[error("schema mismatch for table {table}: {reason}")]
    SchemaMismatch {
        /// Table name.
        table: String,
        /// Human-readable description of the mismatch.
        reason: String,
    },

    /// A `custom` tagged value was used somewhere that does not support it.
    #[error("custom type not supported in this context")]
    CustomTypeNotSupported,

    /// An `exception` tagged value was used somewhere that does not support it.
    #[error("exception type not supported in this context")]
    ExceptionTypeNotSupported,

    /// The surrounding query engine's wall-clock budget elapsed.
    #[error("query timed out")]
    QueryTimeout,

    /// An invariant the implementation relies on was violated; always a bug.
    #[error("internal error: {0}")]
    InternalError(String),

    /// Wraps an I/O failure encountered while reading or writing persistence files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a JSON (de)serialization failure for manifest/checkpoint files.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GrizzlyError {
    /// Build an [`GrizzlyError::InternalError`] from any displayable message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Stable string identifying the error kind, independent of its
    /// formatted message. Used for structured logging.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::VectorDimensionMismatch { .. } => "VectorDimensionMismatch",
            Self::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            Self::ColumnNotFound(_) => "ColumnNotFound",
            Self::TableNotFound(_) => "TableNotFound",
            Self::ModelNotFound(_) => "ModelNotFound",
            Self::ScheduleNotFound(_) => "ScheduleNotFound",
            Self::IndexNotFound(_) => "IndexNotFound",
            Self::IndexAlreadyExists(_) => "IndexAlreadyExists",
            Self::DuplicateTable(_) => "DuplicateTable",
            Self::CircularDependency(_) => "CircularDependency",
            Self::InvalidFileFormat { .. } => "InvalidFileFormat",
            Self::UnsupportedVersion(_) => "UnsupportedVersion",
            Self::IncompleteRead { .. } => "IncompleteRead",
            Self::InvalidDictionaryIndex { .. } => "InvalidDictionaryIndex",
            Self::UnsupportedOperation { .. } => "UnsupportedOperation",
            Self::EmptyColumn(_) => "EmptyColumn",
            Self::NoChanges => "NoChanges",
            Self::SnapshotMismatch { .. } => "SnapshotMismatch",
            Self::SnapshotOutOfDate { .. } => "SnapshotOutOfDate",
            Self::SchemaMismatch { .. } => "SchemaMismatch",
            Self::CustomTypeNotSupported => "CustomTypeNotSupported",
            Self::ExceptionTypeNotSupported => "ExceptionTypeNotSupported",
            Self::QueryTimeout => "QueryTimeout",
            Self::InternalError(_) => "InternalError",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
        }
    }
}
