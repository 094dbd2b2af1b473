//! Schema derivation, type mapping and query compilation for rowbind.
//!
//! This crate is storage-agnostic and performs no I/O:
//!
//! - [`TypeRegistry`]: maps domain types ([`DomainType`]) to a storage
//!   column type plus encode/decode functions. Built-ins cover text, blobs,
//!   integers, reals, booleans, dates, times, datetimes and paths; user types
//!   are registered with [`TypeRegistry::register_type`].
//! - [`RecordDef`] / [`derive`]: turn a typed record definition into a
//!   cached [`TableSchema`] and its `CREATE TABLE` / `CREATE INDEX` DDL.
//! - [`Codec`]: encodes a [`Record`] into a row of [`SqlValue`]s and decodes
//!   rows back, reconstructing the row [`Identity`] separately.
//! - [`Filter`]: a conjunction of per-field [`Comparator`]s compiled into a
//!   parameterized `WHERE` clause.
//!
//! [`Registry`] ties the type registry and the table catalog together. Build
//! it once at startup, then share it read-only.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rowbind_core::*;
//!
//! struct NamedPoint {
//!     x: i64,
//!     y: i64,
//!     name: String,
//! }
//!
//! impl Record for NamedPoint {
//!     fn definition() -> RecordDef {
//!         RecordDef::new("NamedPoint")
//!             .field::<i64>("x")
//!             .field::<i64>("y")
//!             .unique::<String>("name")
//!     }
//!
//!     fn to_values(&self) -> Vec<Value> {
//!         vec![self.x.into(), self.y.into(), self.name.clone().into()]
//!     }
//!
//!     fn from_values(values: &mut FieldValues) -> std::result::Result<Self, CodecError> {
//!         Ok(NamedPoint {
//!             x: values.take("x")?,
//!             y: values.take("y")?,
//!             name: values.take("name")?,
//!         })
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! let schema = registry.register_table::<NamedPoint>().unwrap();
//! assert_eq!(
//!     schema.create_statements()[0],
//!     "CREATE TABLE IF NOT EXISTS \"NamedPoint\" (\"rowid\" INTEGER PRIMARY KEY, \
//!      \"x\" INTEGER NOT NULL, \"y\" INTEGER NOT NULL, \"name\" TEXT NOT NULL)"
//! );
//!
//! let point = NamedPoint { x: 1, y: 0, name: "a".into() };
//! let row = Codec::new(&schema, registry.types()).encode_row(&point).unwrap();
//! assert_eq!(row[2], SqlValue::Text("a".into()));
//!
//! let mut filter = Filter::new(Arc::clone(&schema));
//! filter.push("name", "a", registry.types()).unwrap();
//! assert_eq!(filter.compile().sql, "\"name\" = ?");
//! ```

pub mod codec;
pub mod error;
pub mod filter;
pub mod registry;
pub mod schema;
pub mod sql;
pub mod types;

pub use codec::{Codec, FieldValues, Record, decode_field, encode_field, encode_operand};
pub use error::{CodecError, Error, Result, SchemaError};
pub use filter::{Clause, Comparator, Filter, Op, eq, ge, gt, le, lt, ne};
pub use registry::{
    DATE_FORMAT, DATETIME_FORMAT, Registry, TIME_FORMAT, TypeMapping, TypeRegistry,
};
pub use schema::{
    ColumnSpec, Constraint, FieldDef, FieldDomain, FieldSpec, IndexSpec, ROWID, RecordDef,
    TableSchema, derive,
};
pub use types::{
    CustomType, CustomValue, DomainType, FieldKind, FieldType, FromValue, Identity, Ref, SqlValue,
    StorageType, TableKey, Value,
};
