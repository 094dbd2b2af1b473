//! The database handle: one SQLite connection plus the frozen registry.
//!
//! [`Database`] executes table DDL (once per table and handle), wraps every
//! write in a transaction, and hands out typed [`Query`] builders. The
//! table-level shortcuts ([`count`](Database::count), [`all`](Database::all),
//! [`get`](Database::get), [`delete_by_identity`](Database::delete_by_identity))
//! are thin wrappers over the empty or identity-filtered query.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rowbind_core::{CodecError, FieldValues, Record, RecordDef, Registry, Value};
//! use rowbind_sqlite::{Database, Instance};
//!
//! struct Note {
//!     text: String,
//! }
//!
//! impl Record for Note {
//!     fn definition() -> RecordDef {
//!         RecordDef::new("Note").field::<String>("text")
//!     }
//!     fn to_values(&self) -> Vec<Value> {
//!         vec![self.text.clone().into()]
//!     }
//!     fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
//!         Ok(Note { text: values.take("text")? })
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register_table::<Note>().unwrap();
//! let db = Database::open_in_memory(Arc::new(registry)).unwrap();
//!
//! let mut note = Instance::new(Note { text: "hello".into() });
//! note.insert(&db).unwrap();
//! assert_eq!(db.count::<Note>().unwrap(), 1);
//! assert_eq!(db.get::<Note>(note.rowid().unwrap()).unwrap().unwrap().text, "hello");
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use rowbind_core::{Identity, Record, Ref, Registry, SchemaError, SqlValue, TableSchema, sql};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::convert::{bind, row_count};
use crate::error::{Result, StoreError};
use crate::query::Query;
use crate::record::Instance;

/// A connection bound to a [`Registry`].
///
/// One handle per thread: the connection is not shared across threads.
pub struct Database {
    conn: Connection,
    registry: Arc<Registry>,
    created: RefCell<HashSet<String>>,
}

impl Database {
    /// Wraps an open connection. Tables are created lazily on first use.
    pub fn new(conn: Connection, registry: Arc<Registry>) -> Self {
        Self {
            conn,
            registry,
            created: RefCell::new(HashSet::new()),
        }
    }

    /// Opens the configured database, creating every registered table
    /// unless `create_tables` is off.
    pub fn open(config: &StoreConfig, registry: Arc<Registry>) -> Result<Self> {
        let db = Self::new(config.open()?, registry);
        if config.create_tables {
            db.setup()?;
        }
        Ok(db)
    }

    /// Opens a private in-memory database with every registered table.
    pub fn open_in_memory(registry: Arc<Registry>) -> Result<Self> {
        Self::open(&StoreConfig::in_memory(), registry)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the handle and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Creates every registered table, in registration order.
    pub fn setup(&self) -> Result<()> {
        for schema in self.registry.tables() {
            self.ensure_table(schema)?;
        }
        Ok(())
    }

    /// Executes the DDL of `schema` unless this handle already did.
    ///
    /// The statements use `IF NOT EXISTS`, so a table created by another
    /// handle or process is left as is. DDL that joins a caller's
    /// transaction is not remembered, since a rollback would undo it.
    pub fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        if self.created.borrow().contains(schema.name()) {
            return Ok(());
        }
        let committed = self.conn.is_autocommit();
        let statements = schema.create_statements();
        self.write(schema.name(), |conn| {
            for statement in &statements {
                debug!(table = schema.name(), sql = %statement, "executing DDL");
                conn.execute(statement, [])?;
            }
            Ok(())
        })?;
        info!(
            table = schema.name(),
            indexes = schema.indexes().len(),
            "table ready"
        );
        if committed {
            self.created.borrow_mut().insert(schema.name().to_string());
        } else {
            debug!(table = schema.name(), "DDL inside caller transaction, not cached");
        }
        Ok(())
    }

    /// Looks up the schema of `T` and makes sure its table exists.
    pub fn ensure<T: Record>(&self) -> Result<Arc<TableSchema>> {
        let schema = Arc::clone(self.registry.table::<T>()?);
        self.ensure_table(&schema)?;
        Ok(schema)
    }

    /// Starts an empty query over `T`, matching every row.
    pub fn query<T: Record>(&self) -> Result<Query<'_, T>> {
        let schema = self.ensure::<T>()?;
        Ok(Query::new(self, schema))
    }

    /// Number of rows in `T`'s table.
    pub fn count<T: Record>(&self) -> Result<usize> {
        self.query::<T>()?.count()
    }

    /// Every row of `T`'s table.
    pub fn all<T: Record>(&self) -> Result<Vec<Instance<T>>> {
        self.query::<T>()?.fetch()
    }

    /// The row with the given identity, if it exists.
    pub fn get<T: Record>(&self, identity: impl Into<Identity>) -> Result<Option<Instance<T>>> {
        Ok(self.query::<T>()?.identity(identity)?.fetch()?.into_iter().next())
    }

    /// Deletes the row with the given identity, returning the number of rows
    /// removed (0 if it did not exist).
    pub fn delete_by_identity<T: Record>(&self, identity: impl Into<Identity>) -> Result<usize> {
        self.query::<T>()?.identity(identity)?.delete()
    }

    /// Loads the row a reference points to.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoRows`] if the referenced row no longer exists.
    pub fn resolve<T: Record>(&self, reference: &Ref<T>) -> Result<Instance<T>> {
        self.query::<T>()?.identity(reference.identity().clone())?.first()
    }

    /// Rows of `C` whose single reference field to `P` points at `parent`.
    ///
    /// # Errors
    ///
    /// [`SchemaError::NoRelation`] if `C` has no field referencing `P`,
    /// [`SchemaError::AmbiguousRelation`] if it has several (use
    /// [`related_by`](Self::related_by)), or [`StoreError::NotPersisted`] if
    /// `parent` has no identity.
    pub fn related<C: Record, P: Record>(&self, parent: &Instance<P>) -> Result<Query<'_, C>> {
        let child = self.registry.table::<C>()?;
        let target = self.registry.table::<P>()?;
        let mut candidates = child
            .fields()
            .iter()
            .filter(|f| f.references() == Some(target.name()));
        match (candidates.next(), candidates.next()) {
            (Some(field), None) => self.related_by(parent, &field.name),
            (None, _) => Err(SchemaError::NoRelation {
                child: child.name().to_string(),
                parent: target.name().to_string(),
            }
            .into()),
            (Some(_), Some(_)) => Err(SchemaError::AmbiguousRelation {
                child: child.name().to_string(),
                parent: target.name().to_string(),
            }
            .into()),
        }
    }

    /// Rows of `C` whose reference field `field` points at `parent`.
    pub fn related_by<C: Record, P: Record>(
        &self,
        parent: &Instance<P>,
        field: &str,
    ) -> Result<Query<'_, C>> {
        let child = self.registry.table::<C>()?;
        let target = self.registry.table::<P>()?;
        let spec = child.field(field).ok_or_else(|| SchemaError::UnknownField {
            table: child.name().to_string(),
            field: field.to_string(),
        })?;
        if spec.references() != Some(target.name()) {
            return Err(SchemaError::RelationMismatch {
                child: child.name().to_string(),
                field: field.to_string(),
                parent: target.name().to_string(),
            }
            .into());
        }
        let reference = parent.reference().ok_or_else(|| StoreError::NotPersisted {
            table: target.name().to_string(),
        })?;
        self.query::<C>()?.filter(field, reference)
    }

    /// Existence and row count of every registered table.
    pub fn status(&self) -> Result<Vec<TableStatus>> {
        let mut exists_stmt = self
            .conn
            .prepare_cached("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        let mut report = Vec::with_capacity(self.registry.tables().len());
        for schema in self.registry.tables() {
            let found: i64 = exists_stmt.query_row([schema.name()], |row| row.get(0))?;
            let rows = if found > 0 {
                let count: i64 =
                    self.conn
                        .query_row(&sql::count(schema, ""), [], |row| row.get(0))?;
                row_count(count)?
            } else {
                0
            };
            report.push(TableStatus {
                table: schema.name().to_string(),
                exists: found > 0,
                rows,
            });
        }
        Ok(report)
    }

    /// Runs `f` in a transaction that commits on success.
    ///
    /// If the caller already opened a transaction on this connection, `f`
    /// runs inside it instead. Constraint failures become
    /// [`StoreError::ConstraintViolation`].
    pub(crate) fn write<R>(
        &self,
        table: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R> {
        let classify = |err: rusqlite::Error| {
            let err = StoreError::classify(err, table);
            if err.is_constraint_violation() {
                warn!(table, error = %err, "write rejected");
            }
            err
        };
        if self.conn.is_autocommit() {
            let tx = self.conn.unchecked_transaction()?;
            let out = f(&*tx).map_err(classify)?;
            tx.commit()?;
            Ok(out)
        } else {
            f(&self.conn).map_err(classify)
        }
    }

    /// Executes one parameterized write statement, returning affected rows.
    pub(crate) fn execute(
        &self,
        table: &str,
        statement: &str,
        params: Vec<SqlValue>,
    ) -> Result<usize> {
        debug!(table, sql = statement, params = params.len(), "executing");
        self.write(table, |conn| conn.prepare_cached(statement)?.execute(bind(params)))
    }
}

/// Snapshot of one registered table, returned by [`Database::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub table: String,
    pub exists: bool,
    pub rows: usize,
}
