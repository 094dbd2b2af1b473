//! Error types for schema derivation, type registration and value encoding.
//!
//! Configuration problems ([`SchemaError`]) are raised while registering
//! types and tables or while building a query, before any database access.
//! Value problems ([`CodecError`]) are raised while encoding or decoding a
//! single row, also before any statement executes.

use thiserror::Error;

/// Configuration errors raised at registration or query construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No mapping exists for a domain type.
    #[error("unknown domain type: {0}")]
    UnknownType(String),

    /// A domain type was registered twice with different mappings.
    #[error("domain type '{0}' is already registered with a different mapping")]
    TypeConflict(String),

    /// Storage tag is not a primitive SQLite column type.
    #[error("invalid storage type '{0}': expected INTEGER, REAL, TEXT, BLOB or NUMERIC")]
    InvalidStorageType(String),

    /// A domain type was registered without any storage column.
    #[error("domain type '{0}' must be stored in at least one column")]
    NoColumns(String),

    /// Table or field name is not a plain SQL identifier.
    #[error("invalid identifier '{0}': must contain only alphanumeric characters and underscores")]
    InvalidIdentifier(String),

    /// A referenced record type has not been registered as a table.
    #[error("table is not registered: {0}")]
    UnknownTable(String),

    /// Two different record types claim the same table name.
    #[error("table name already registered: {0}")]
    DuplicateTable(String),

    /// Two fields of one record share a name, or two expanded columns do.
    #[error("duplicate field {table}.{field}")]
    DuplicateField { table: String, field: String },

    /// Field name collides with the implicit identity column.
    #[error("field {table}.{field} collides with the implicit rowid column")]
    ReservedField { table: String, field: String },

    /// A field carries more than one of Primary/Unique/Index.
    #[error("field {table}.{field} has more than one constraint marker")]
    ConflictingConstraints { table: String, field: String },

    /// A `WITHOUT ROWID` table was requested without any Primary field.
    #[error("table {0} opts out of rowid but declares no primary field")]
    WithoutRowidNeedsPrimary(String),

    /// Primary key columns cannot hold NULL.
    #[error("primary field {table}.{field} cannot be nullable")]
    NullablePrimary { table: String, field: String },

    /// Query names a field the table does not have.
    #[error("invalid query: {table}.{field} does not exist")]
    UnknownField { table: String, field: String },

    /// Query constrains the same field twice.
    #[error("invalid query: {table}.{field} is constrained more than once")]
    DuplicateQueryField { table: String, field: String },

    /// Identity shape does not match the table's key.
    #[error("identity does not match the key of table {0}")]
    IdentityMismatch(String),

    /// Child table has no field referencing the parent table.
    #[error("{child} does not have a {parent} field")]
    NoRelation { child: String, parent: String },

    /// Child table has several fields referencing the parent table.
    #[error("{child} has multiple {parent} fields")]
    AmbiguousRelation { child: String, parent: String },

    /// Named relation field does not reference the parent table.
    #[error("{child}.{field} is not {parent}")]
    RelationMismatch {
        child: String,
        field: String,
        parent: String,
    },
}

/// Errors raised while converting between domain and storage values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Value variant does not belong to the field's domain type.
    #[error("type mismatch for {domain}: got {found}")]
    TypeMismatch { domain: String, found: String },

    /// NULL supplied for a non-nullable column.
    #[error("field {0} is not nullable")]
    UnexpectedNull(String),

    /// Record produced a different number of values than it declares fields.
    #[error("{table} expects {expected} values, got {found}")]
    FieldCount {
        table: String,
        expected: usize,
        found: usize,
    },

    /// A type mapping produced or received the wrong number of columns.
    #[error("{domain} spans {expected} columns, got {found}")]
    ColumnCount {
        domain: String,
        expected: usize,
        found: usize,
    },

    /// Record asked for a field missing from the decoded row.
    #[error("missing field: {0}")]
    MissingField(String),

    /// Value lies outside what the domain type can store.
    #[error("value out of domain for {domain}: {reason}")]
    OutOfDomain { domain: String, reason: String },

    /// Stored text could not be parsed back into the domain type.
    #[error("cannot decode {domain} from stored value: {reason}")]
    Malformed { domain: String, reason: String },
}

/// Either kind of error, for operations that can raise both.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
