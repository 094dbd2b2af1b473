//! Conversion between core storage values and rusqlite values.
//!
//! [`SqlValue`] and [`rusqlite::types::Value`] carry the same five storage
//! classes, so the mapping is one to one in both directions. Rows are read
//! positionally: callers pass the number of columns they selected.

use rowbind_core::SqlValue;
use rusqlite::types::Value as RawValue;
use rusqlite::{ParamsFromIter, Row, params_from_iter};

pub(crate) fn to_raw(value: SqlValue) -> RawValue {
    match value {
        SqlValue::Null => RawValue::Null,
        SqlValue::Integer(i) => RawValue::Integer(i),
        SqlValue::Real(r) => RawValue::Real(r),
        SqlValue::Text(s) => RawValue::Text(s),
        SqlValue::Blob(b) => RawValue::Blob(b),
    }
}

pub(crate) fn from_raw(value: RawValue) -> SqlValue {
    match value {
        RawValue::Null => SqlValue::Null,
        RawValue::Integer(i) => SqlValue::Integer(i),
        RawValue::Real(r) => SqlValue::Real(r),
        RawValue::Text(s) => SqlValue::Text(s),
        RawValue::Blob(b) => SqlValue::Blob(b),
    }
}

/// Bound parameters for a statement, in placeholder order.
pub(crate) fn bind(values: Vec<SqlValue>) -> ParamsFromIter<Vec<RawValue>> {
    params_from_iter(values.into_iter().map(to_raw).collect::<Vec<_>>())
}

/// Reads the first `width` columns of `row`.
pub(crate) fn read_row(row: &Row<'_>, width: usize) -> rusqlite::Result<Vec<SqlValue>> {
    (0..width)
        .map(|index| row.get::<_, RawValue>(index).map(from_raw))
        .collect()
}

/// Converts a `COUNT(*)` result into a row count.
pub(crate) fn row_count(count: i64) -> rusqlite::Result<usize> {
    usize::try_from(count).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, count))
}
