//! Record lifecycle: insert, commit and delete.
//!
//! An [`Instance`] is a record together with its [`RecordState`]:
//!
//! ```text
//! Unpersisted ──insert──▶ Persisted(identity) ──delete──▶ Deleted(identity)
//!                              │  ▲
//!                              └──┘ commit
//! ```
//!
//! The identity is assigned once by `insert` and never changes afterwards.
//! A failed write is rolled back and leaves the state untouched; a failed
//! commit also leaves the in-memory field values as the caller set them.

use std::ops::{Deref, DerefMut};

use rowbind_core::{Codec, Identity, Record, Ref, SchemaError, SqlValue, sql};
use tracing::debug;

use crate::convert::bind;
use crate::database::Database;
use crate::error::{Result, StoreError};

/// Persistence state of an [`Instance`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordState {
    /// Never inserted.
    Unpersisted,
    /// Stored under this identity.
    Persisted(Identity),
    /// Deleted; the identity is kept but no longer matches a row.
    Deleted(Identity),
}

/// A record and its persistence state.
///
/// Dereferences to the record, so fields are read and assigned directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance<T> {
    record: T,
    state: RecordState,
}

impl<T> Deref for Instance<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

impl<T> DerefMut for Instance<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.record
    }
}

impl<T: Record> Instance<T> {
    /// Wraps a record that has not been inserted yet.
    pub fn new(record: T) -> Self {
        Instance {
            record,
            state: RecordState::Unpersisted,
        }
    }

    pub(crate) fn persisted(record: T, identity: Identity) -> Self {
        Instance {
            record,
            state: RecordState::Persisted(identity),
        }
    }

    pub fn state(&self) -> &RecordState {
        &self.state
    }

    /// The identity assigned by `insert`, kept after deletion.
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            RecordState::Unpersisted => None,
            RecordState::Persisted(identity) | RecordState::Deleted(identity) => Some(identity),
        }
    }

    pub fn rowid(&self) -> Option<i64> {
        self.identity().and_then(Identity::rowid)
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self.state, RecordState::Persisted(_))
    }

    /// A reference to this row, for use in another record's field.
    pub fn reference(&self) -> Option<Ref<T>> {
        self.identity().cloned().map(Ref::new)
    }

    pub fn record(&self) -> &T {
        &self.record
    }

    pub fn into_inner(self) -> T {
        self.record
    }

    fn not_persisted(db: &Database) -> StoreError {
        let table = db
            .registry()
            .table::<T>()
            .map_or_else(|_| std::any::type_name::<T>().to_string(), |s| s.name().to_string());
        StoreError::NotPersisted { table }
    }

    /// Inserts the record and assigns its identity.
    ///
    /// The identity is the new rowid, or the encoded Primary field values
    /// for tables without a rowid.
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyPersisted`] unless the instance is unpersisted,
    /// a codec error before anything executes, or
    /// [`StoreError::ConstraintViolation`] if a Primary or Unique constraint
    /// rejects the row. On error the instance stays unpersisted.
    pub fn insert(&mut self, db: &Database) -> Result<Identity> {
        self.insert_row(db, None)
    }

    /// Inserts the record under a caller-chosen rowid.
    ///
    /// # Errors
    ///
    /// As [`insert`](Self::insert), plus [`SchemaError::IdentityMismatch`]
    /// for tables without a rowid. A rowid already in use is a
    /// [`StoreError::ConstraintViolation`].
    pub fn insert_with_rowid(&mut self, db: &Database, rowid: i64) -> Result<Identity> {
        self.insert_row(db, Some(rowid))
    }

    fn insert_row(&mut self, db: &Database, rowid: Option<i64>) -> Result<Identity> {
        let schema = db.ensure::<T>()?;
        if self.state != RecordState::Unpersisted {
            return Err(StoreError::AlreadyPersisted {
                table: schema.name().to_string(),
            });
        }
        if rowid.is_some() && !schema.has_rowid() {
            return Err(SchemaError::IdentityMismatch(schema.name().to_string()).into());
        }

        let codec = Codec::new(&schema, db.registry().types());
        let mut row = codec.encode_row(&self.record)?;
        let key = codec.key_identity(&row);
        let statement = match rowid {
            Some(id) => {
                row.insert(0, SqlValue::Integer(id));
                sql::insert_with_rowid(&schema)
            }
            None => sql::insert(&schema),
        };
        debug!(table = schema.name(), sql = %statement, params = row.len(), "inserting");

        let rowid = db.write(schema.name(), |conn| {
            conn.prepare_cached(&statement)?
                .execute(bind(row))?;
            Ok(conn.last_insert_rowid())
        })?;

        let identity = key.unwrap_or(Identity::RowId(rowid));
        debug!(table = schema.name(), %identity, "inserted");
        self.state = RecordState::Persisted(identity.clone());
        Ok(identity)
    }

    /// Writes every non-key field back to the row, returning the number of
    /// rows updated.
    ///
    /// Returns `Ok(0)` when the identity no longer matches a row, for example
    /// after [`delete`](Self::delete).
    ///
    /// # Errors
    ///
    /// [`StoreError::NotPersisted`] if the instance was never inserted, a
    /// codec error before anything executes, or
    /// [`StoreError::ConstraintViolation`]. The in-memory values are not
    /// reverted on failure.
    pub fn commit(&self, db: &Database) -> Result<usize> {
        let identity = self.identity().ok_or_else(|| Self::not_persisted(db))?;
        let schema = db.ensure::<T>()?;
        let params =
            Codec::new(&schema, db.registry().types()).encode_update(&self.record, identity)?;
        db.execute(schema.name(), &sql::update(&schema), params)
    }

    /// Deletes the row through the identity-filtered query, returning the
    /// number of rows removed.
    ///
    /// The instance moves to [`RecordState::Deleted`]; deleting again
    /// returns `Ok(0)`.
    pub fn delete(&mut self, db: &Database) -> Result<usize> {
        let identity = self
            .identity()
            .cloned()
            .ok_or_else(|| Self::not_persisted(db))?;
        let removed = db.delete_by_identity::<T>(identity.clone())?;
        debug!(%identity, removed, "deleted");
        self.state = RecordState::Deleted(identity);
        Ok(removed)
    }
}

impl<T: Record> From<T> for Instance<T> {
    fn from(record: T) -> Self {
        Instance::new(record)
    }
}
