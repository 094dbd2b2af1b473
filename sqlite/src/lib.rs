//! SQLite storage for rowbind records.
//!
//! This crate binds the storage-agnostic pieces of
//! [`rowbind_core`] to a [`rusqlite::Connection`]: it runs the derived
//! table DDL, executes compiled queries, and manages the insert / commit /
//! delete lifecycle of record instances.
//!
//! # Architecture
//!
//! - **`database`**: [`Database`]: connection + frozen registry, lazy
//!   idempotent DDL, transactional writes, table-level shortcuts.
//! - **`query`**: [`Query`]: typed filter builder with count, iteration,
//!   first/one and bulk delete.
//! - **`record`**: [`Instance`]: record plus lifecycle state.
//! - **`config`**: [`StoreConfig`]: YAML connection settings.
//! - **`convert`**: storage value conversion to and from rusqlite.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use rowbind_core::{CodecError, FieldValues, Record, RecordDef, Registry, Value};
//! use rowbind_sqlite::{Database, Instance};
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
//!     fn to_values(&self) -> Vec<Value> {
//!         vec![self.x.into(), self.y.into(), self.name.clone().into()]
//!     }
//!     fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
//!         Ok(NamedPoint {
//!             x: values.take("x")?,
//!             y: values.take("y")?,
//!             name: values.take("name")?,
//!         })
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register_table::<NamedPoint>().unwrap();
//! let db = Database::open_in_memory(Arc::new(registry)).unwrap();
//!
//! let mut point = Instance::new(NamedPoint { x: 1, y: 0, name: "a".into() });
//! point.insert(&db).unwrap();
//!
//! let duplicate = Instance::new(NamedPoint { x: 2, y: 0, name: "a".into() }).insert(&db);
//! assert!(duplicate.unwrap_err().is_constraint_violation());
//! assert_eq!(db.count::<NamedPoint>().unwrap(), 1);
//!
//! point.x = 2;
//! point.commit(&db).unwrap();
//! let stored = db.query::<NamedPoint>().unwrap().filter("rowid", 1).unwrap().first().unwrap();
//! assert_eq!(stored.x, 2);
//!
//! point.delete(&db).unwrap();
//! assert_eq!(db.count::<NamedPoint>().unwrap(), 0);
//! ```
//!
//! # Transactions
//!
//! Every write runs in its own transaction unless the caller already opened
//! one on the connection, in which case it joins it. Constraint failures are
//! reported as [`StoreError::ConstraintViolation`] and leave no partial row.

mod config;
mod convert;
mod database;
mod error;
mod query;
mod record;

pub use config::StoreConfig;
pub use database::{Database, TableStatus};
pub use error::{Result, StoreError};
pub use query::{Query, Rows, Selection};
pub use record::{Instance, RecordState};
