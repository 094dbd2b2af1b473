//! Typed query execution.
//!
//! [`Query`] wraps a core [`Filter`] for one record type. Building it never
//! touches the database; [`count`](Query::count), [`prepare`](Query::prepare),
//! [`fetch`](Query::fetch), [`first`](Query::first), [`one`](Query::one) and
//! [`delete`](Query::delete) do. Rows come back in the storage engine's
//! natural order; no `ORDER BY` is added.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rowbind_core::{CodecError, FieldValues, Record, RecordDef, Registry, Value, gt};
//! use rowbind_sqlite::{Database, Instance};
//!
//! struct Reading {
//!     value: i64,
//! }
//!
//! impl Record for Reading {
//!     fn definition() -> RecordDef {
//!         RecordDef::new("Reading").field::<i64>("value")
//!     }
//!     fn to_values(&self) -> Vec<Value> {
//!         vec![self.value.into()]
//!     }
//!     fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
//!         Ok(Reading { value: values.take("value")? })
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry.register_table::<Reading>().unwrap();
//! let db = Database::open_in_memory(Arc::new(registry)).unwrap();
//! for value in 0..5 {
//!     Instance::new(Reading { value }).insert(&db).unwrap();
//! }
//!
//! let query = db.query::<Reading>().unwrap().filter("value", gt(2)).unwrap();
//! assert_eq!(query.count().unwrap(), 2);
//!
//! let mut selection = query.prepare().unwrap();
//! let total: i64 = selection
//!     .iter()
//!     .unwrap()
//!     .map(|reading| reading.unwrap().value)
//!     .sum();
//! assert_eq!(total, 7);
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use rowbind_core::{
    Codec, Comparator, Filter, Identity, Record, SqlValue, TableSchema, TypeRegistry, sql,
};
use rusqlite::{CachedStatement, Row};
use tracing::debug;

use crate::convert::{bind, read_row, row_count};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::record::Instance;

/// A conjunction of field comparisons over the table of `T`.
pub struct Query<'db, T> {
    db: &'db Database,
    filter: Filter,
    limit: Option<u64>,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<'_, T> {
    fn clone(&self) -> Self {
        Query {
            db: self.db,
            filter: self.filter.clone(),
            limit: self.limit,
            marker: PhantomData,
        }
    }
}

impl<'db, T: Record> Query<'db, T> {
    pub(crate) fn new(db: &'db Database, schema: Arc<TableSchema>) -> Self {
        Query {
            db,
            filter: Filter::new(schema),
            limit: None,
            marker: PhantomData,
        }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        self.filter.schema()
    }

    fn table(&self) -> &str {
        self.filter.schema().name()
    }

    /// Adds a comparison on `field`. A plain value means equality.
    ///
    /// # Errors
    ///
    /// Unknown fields, a field constrained twice, or an operand that does
    /// not fit the field. Nothing is executed.
    pub fn filter(mut self, field: &str, comparator: impl Into<Comparator>) -> Result<Self> {
        self.filter
            .push(field, comparator, self.db.registry().types())?;
        Ok(self)
    }

    /// Restricts the query to the row with the given identity.
    pub fn identity(mut self, identity: impl Into<Identity>) -> Result<Self> {
        self.filter.push_identity(&identity.into())?;
        Ok(self)
    }

    /// Returns at most `n` rows.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// The `SELECT` statement this query runs.
    pub fn sql(&self) -> String {
        sql::select(
            self.filter.schema(),
            &self.filter.compile().sql,
            self.limit.is_some(),
        )
    }

    /// Number of matching rows.
    pub fn count(&self) -> Result<usize> {
        let clause = self.filter.compile();
        let statement = sql::count(self.filter.schema(), &clause.sql);
        debug!(table = self.table(), sql = %statement, params = clause.params.len(), "counting");
        let count: i64 = self
            .db
            .connection()
            .prepare_cached(&statement)?
            .query_row(bind(clause.params), |row| row.get(0))?;
        Ok(row_count(count)?)
    }

    fn select(&self, limit: Option<u64>) -> Result<Selection<'db, T>> {
        let clause = self.filter.compile();
        let statement = sql::select(self.filter.schema(), &clause.sql, limit.is_some());
        let mut params = clause.params;
        if let Some(n) = limit {
            params.push(SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX)));
        }
        debug!(table = self.table(), sql = %statement, params = params.len(), "selecting");
        let db = self.db;
        Ok(Selection {
            stmt: db.connection().prepare_cached(&statement)?,
            params,
            schema: Arc::clone(self.filter.schema()),
            types: db.registry().types(),
            marker: PhantomData,
        })
    }

    /// Prepares the `SELECT` without running it.
    pub fn prepare(&self) -> Result<Selection<'db, T>> {
        self.select(self.limit)
    }

    /// Runs the query and decodes every matching row.
    pub fn fetch(&self) -> Result<Vec<Instance<T>>> {
        let mut selection = self.prepare()?;
        let rows = selection.iter()?;
        rows.collect()
    }

    /// The first matching row.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoRows`] if nothing matches.
    pub fn first(&self) -> Result<Instance<T>> {
        let limit = self.limit.map_or(1, |n| n.min(1));
        let mut selection = self.select(Some(limit))?;
        let first = selection.iter()?.next().transpose()?;
        first.ok_or_else(|| StoreError::NoRows {
            table: self.table().to_string(),
        })
    }

    /// The only matching row.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoRows`] if nothing matches,
    /// [`StoreError::MultipleRows`] if more than one row does.
    pub fn one(&self) -> Result<Instance<T>> {
        let mut selection = self.select(Some(2))?;
        let mut rows = selection.iter()?;
        let first = rows.next().transpose()?;
        let second = rows.next().transpose()?;
        match (first, second) {
            (Some(instance), None) => Ok(instance),
            (None, _) => Err(StoreError::NoRows {
                table: self.table().to_string(),
            }),
            (Some(_), Some(_)) => Err(StoreError::MultipleRows {
                table: self.table().to_string(),
            }),
        }
    }

    /// Deletes every matching row and returns how many were removed.
    ///
    /// Limits do not apply to deletion.
    pub fn delete(&self) -> Result<usize> {
        let clause = self.filter.compile();
        let statement = sql::delete(self.filter.schema(), &clause.sql);
        self.db.execute(self.table(), &statement, clause.params)
    }
}

/// A prepared `SELECT`, ready to be iterated.
///
/// Each call to [`iter`](Selection::iter) runs the statement again.
pub struct Selection<'db, T> {
    stmt: CachedStatement<'db>,
    params: Vec<SqlValue>,
    schema: Arc<TableSchema>,
    types: &'db TypeRegistry,
    marker: PhantomData<fn() -> T>,
}

impl<T: Record> Selection<'_, T> {
    /// Executes the statement and returns a lazy iterator over decoded rows.
    pub fn iter(&mut self) -> Result<Rows<'_, T>> {
        let rows = self.stmt.query(bind(self.params.clone()))?;
        Ok(Rows {
            rows,
            codec: Codec::new(&self.schema, self.types),
            marker: PhantomData,
        })
    }
}

/// Lazy iterator over the rows of a [`Selection`].
pub struct Rows<'s, T> {
    rows: rusqlite::Rows<'s>,
    codec: Codec<'s>,
    marker: PhantomData<fn() -> T>,
}

fn decode<T: Record>(codec: Codec<'_>, row: &Row<'_>) -> Result<Instance<T>> {
    let raw = read_row(row, codec.schema().column_count())?;
    let (identity, record) = codec.decode_row::<T>(raw)?;
    Ok(Instance::persisted(record, identity))
}

impl<T: Record> Iterator for Rows<'_, T> {
    type Item = Result<Instance<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let codec = self.codec;
        match self.rows.next() {
            Ok(Some(row)) => Some(decode(codec, row)),
            Ok(None) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}
