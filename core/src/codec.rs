//! Conversion between typed records and rows of storage values.
//!
//! A [`Record`] exposes its field values in declaration order through
//! [`Record::to_values`] and rebuilds itself from named values through
//! [`Record::from_values`]. The [`Codec`] pairs a record with its
//! [`TableSchema`] and the [`TypeRegistry`], applying each column's mapping:
//!
//! ```text
//! record ──to_values──▶ [Value] ──encode──▶ [SqlValue] ──▶ statement
//! record ◀─from_values─ FieldValues ◀─decode── [SqlValue] ◀── row
//! ```
//!
//! Every failure here happens before a statement executes.

use crate::error::{CodecError, Error, Result, SchemaError};
use crate::registry::TypeRegistry;
use crate::schema::{FieldDomain, FieldSpec, RecordDef, TableSchema};
use crate::types::{FromValue, Identity, SqlValue, Value, mismatch};

/// A typed record stored as one table row.
///
/// # Examples
///
/// ```
/// use rowbind_core::{CodecError, FieldValues, Record, RecordDef, Value};
///
/// struct Point {
///     x: i64,
///     label: Option<String>,
/// }
///
/// impl Record for Point {
///     fn definition() -> RecordDef {
///         RecordDef::new("Point")
///             .field::<i64>("x")
///             .field::<Option<String>>("label")
///     }
///
///     fn to_values(&self) -> Vec<Value> {
///         vec![self.x.into(), self.label.clone().into()]
///     }
///
///     fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
///         Ok(Point {
///             x: values.take("x")?,
///             label: values.take("label")?,
///         })
///     }
/// }
/// ```
pub trait Record: Sized + 'static {
    /// Table name and ordered field declarations.
    fn definition() -> RecordDef;

    /// Current field values, in declaration order.
    fn to_values(&self) -> Vec<Value>;

    /// Rebuilds a record from decoded field values.
    fn from_values(values: &mut FieldValues) -> std::result::Result<Self, CodecError>;
}

/// Decoded field values of one row, taken by name.
#[derive(Debug, Clone, Default)]
pub struct FieldValues {
    entries: Vec<(String, Option<Value>)>,
}

impl FieldValues {
    pub fn new(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        FieldValues {
            entries: entries
                .into_iter()
                .map(|(name, value)| (name, Some(value)))
                .collect(),
        }
    }

    /// Moves the value of field `name` out, converted to `T`.
    ///
    /// # Errors
    ///
    /// [`CodecError::MissingField`] if the row has no such field or it was
    /// already taken, or the conversion error of `T`.
    pub fn take<T: FromValue>(&mut self, name: &str) -> std::result::Result<T, CodecError> {
        let value = self
            .entries
            .iter_mut()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.take())
            .ok_or_else(|| CodecError::MissingField(name.to_string()))?;
        T::from_value(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn qualified(schema: &TableSchema, field: &FieldSpec) -> String {
    format!("{}.{}", schema.name(), field.name)
}

fn reference_domain(table: &str) -> String {
    format!("reference to {table}")
}

/// Encodes a non-null domain value for `field`, one stored value per
/// column.
fn encode_present(
    types: &TypeRegistry,
    field: &FieldSpec,
    value: &Value,
) -> std::result::Result<Vec<SqlValue>, Error> {
    match &field.domain {
        FieldDomain::Type(domain) => Ok(types.resolve(domain)?.encode(value)?),
        FieldDomain::Table { table, columns, rowid } => match (value, rowid) {
            (Value::Reference(Identity::RowId(id)), true) => Ok(vec![SqlValue::Integer(*id)]),
            (Value::Reference(Identity::Key(key)), false) if key.len() == columns.len() => {
                Ok(key.clone())
            }
            (Value::Reference(_), _) => Err(SchemaError::IdentityMismatch(table.clone()).into()),
            (other, _) => Err(mismatch(&reference_domain(table), other).into()),
        },
    }
}

/// Encodes the value of one field into its columns, rejecting `NULL` for
/// non-nullable fields.
pub fn encode_field(
    types: &TypeRegistry,
    schema: &TableSchema,
    field: &FieldSpec,
    value: &Value,
) -> Result<Vec<SqlValue>> {
    if value.is_null() {
        if field.nullable {
            return Ok(vec![SqlValue::Null; field.width()]);
        }
        return Err(CodecError::UnexpectedNull(qualified(schema, field)).into());
    }
    encode_present(types, field, value)
}

/// Encodes a comparison operand for `field`. `NULL` is always accepted.
pub fn encode_operand(
    types: &TypeRegistry,
    field: &FieldSpec,
    value: &Value,
) -> Result<Vec<SqlValue>> {
    if value.is_null() {
        return Ok(vec![SqlValue::Null; field.width()]);
    }
    encode_present(types, field, value)
}

/// Decodes the stored values of one field's columns.
///
/// All columns `NULL` decodes to [`Value::Null`]; a mix of `NULL` and
/// non-`NULL` columns is malformed.
pub fn decode_field(
    types: &TypeRegistry,
    schema: &TableSchema,
    field: &FieldSpec,
    stored: Vec<SqlValue>,
) -> Result<Value> {
    let nulls = stored.iter().filter(|v| v.is_null()).count();
    if nulls == stored.len() {
        if field.nullable {
            return Ok(Value::Null);
        }
        return Err(CodecError::UnexpectedNull(qualified(schema, field)).into());
    }
    if nulls > 0 {
        return Err(CodecError::Malformed {
            domain: qualified(schema, field),
            reason: format!("{nulls} of {} columns are NULL", stored.len()),
        }
        .into());
    }
    match &field.domain {
        FieldDomain::Type(domain) => Ok(types.resolve(domain)?.decode(stored)?),
        FieldDomain::Table { rowid: true, table, .. } => match stored.as_slice() {
            [SqlValue::Integer(id)] => Ok(Value::Reference(Identity::RowId(*id))),
            other => Err(CodecError::Malformed {
                domain: reference_domain(table),
                reason: format!(
                    "unexpected {} column value",
                    other.first().map_or("missing", |v| v.kind())
                ),
            }
            .into()),
        },
        FieldDomain::Table { rowid: false, .. } => Ok(Value::Reference(Identity::Key(stored))),
    }
}

/// Row codec for one table.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'a> {
    schema: &'a TableSchema,
    types: &'a TypeRegistry,
}

impl<'a> Codec<'a> {
    pub fn new(schema: &'a TableSchema, types: &'a TypeRegistry) -> Self {
        Codec { schema, types }
    }

    pub fn schema(&self) -> &'a TableSchema {
        self.schema
    }

    /// Splits an encoded row (without rowid) into each field's columns.
    fn split<'r>(&self, row: &'r [SqlValue]) -> Vec<(&'a FieldSpec, &'r [SqlValue])> {
        let mut rest = row;
        self.schema
            .fields()
            .iter()
            .map_while(|field| {
                if rest.len() < field.width() {
                    return None;
                }
                let (head, tail) = rest.split_at(field.width());
                rest = tail;
                Some((field, head))
            })
            .collect()
    }

    /// Encodes every declared field of `record`, in column order.
    ///
    /// The implicit rowid is never part of the encoded row.
    ///
    /// # Errors
    ///
    /// [`CodecError::FieldCount`] if the record yields the wrong number of
    /// values, or the first value that fails to encode.
    pub fn encode_row<T: Record>(&self, record: &T) -> Result<Vec<SqlValue>> {
        let values = record.to_values();
        let fields = self.schema.fields();
        if values.len() != fields.len() {
            return Err(CodecError::FieldCount {
                table: self.schema.name().to_string(),
                expected: fields.len(),
                found: values.len(),
            }
            .into());
        }
        let mut row = Vec::with_capacity(self.schema.column_count());
        for (field, value) in fields.iter().zip(&values) {
            row.extend(encode_field(self.types, self.schema, field, value)?);
        }
        Ok(row)
    }

    /// Encodes the parameters of an update: data columns in order,
    /// followed by the identity of the row to update.
    pub fn encode_update<T: Record>(&self, record: &T, identity: &Identity) -> Result<Vec<SqlValue>> {
        self.schema.check_identity(identity)?;
        let row = self.encode_row(record)?;
        let mut params: Vec<SqlValue> = self
            .split(&row)
            .into_iter()
            .filter(|(field, _)| !field.is_primary())
            .flat_map(|(_, values)| values.iter().cloned())
            .collect();
        params.extend(identity.params());
        Ok(params)
    }

    /// Identity carried by an encoded row of a `WITHOUT ROWID` table.
    ///
    /// Returns `None` for rowid tables, whose identity is assigned by the
    /// database on insert.
    pub fn key_identity(&self, row: &[SqlValue]) -> Option<Identity> {
        if self.schema.has_rowid() {
            return None;
        }
        let key = self
            .split(row)
            .into_iter()
            .filter(|(field, _)| field.is_primary())
            .flat_map(|(_, values)| values.iter().cloned())
            .collect();
        Some(Identity::Key(key))
    }

    /// Decodes a full row (rowid first, when present) into the row identity
    /// and the record.
    pub fn decode_row<T: Record>(&self, raw: Vec<SqlValue>) -> Result<(Identity, T)> {
        let expected = self.schema.column_count();
        if raw.len() != expected {
            return Err(CodecError::FieldCount {
                table: self.schema.name().to_string(),
                expected,
                found: raw.len(),
            }
            .into());
        }

        let mut raw = raw.into_iter();
        let rowid = if self.schema.has_rowid() {
            match raw.next() {
                Some(SqlValue::Integer(id)) => Some(Identity::RowId(id)),
                other => {
                    return Err(CodecError::Malformed {
                        domain: "rowid".to_string(),
                        reason: format!(
                            "unexpected {} column value",
                            other.map_or("missing", |v| v.kind())
                        ),
                    }
                    .into());
                }
            }
        } else {
            None
        };

        let mut key = Vec::new();
        let mut entries = Vec::with_capacity(self.schema.fields().len());
        for field in self.schema.fields() {
            let stored: Vec<SqlValue> = raw.by_ref().take(field.width()).collect();
            if field.is_primary() {
                key.extend(stored.iter().cloned());
            }
            let value = decode_field(self.types, self.schema, field, stored)?;
            entries.push((field.name.clone(), value));
        }

        let record = T::from_values(&mut FieldValues::new(entries))?;
        Ok((rowid.unwrap_or(Identity::Key(key)), record))
    }
}
