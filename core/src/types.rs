//! Value and type definitions shared by the registry, the schema builder and
//! the codec.
//!
//! Two value layers exist:
//!
//! - [`Value`]: the domain value a record field holds (a date, a path, a
//!   reference to another row, a user-registered type, ...).
//! - [`SqlValue`]: the storage value SQLite actually keeps in a column
//!   (`NULL`, `INTEGER`, `REAL`, `TEXT` or `BLOB`).
//!
//! The [`TypeRegistry`](crate::TypeRegistry) converts between the two.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::codec::Record;
use crate::error::{CodecError, SchemaError};

/// Primitive column types understood by the storage engine.
///
/// # Examples
///
/// ```
/// use rowbind_core::StorageType;
///
/// let storage: StorageType = "int".parse().unwrap();
/// assert_eq!(storage, StorageType::Integer);
/// assert!("VARCHAR".parse::<StorageType>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StorageType {
    Integer,
    Real,
    Text,
    Blob,
    Numeric,
}

impl StorageType {
    /// Returns the SQL spelling used in column definitions.
    pub fn as_sql(self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
            StorageType::Text => "TEXT",
            StorageType::Blob => "BLOB",
            StorageType::Numeric => "NUMERIC",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for StorageType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" => Ok(StorageType::Integer),
            "REAL" => Ok(StorageType::Real),
            "TEXT" => Ok(StorageType::Text),
            "BLOB" => Ok(StorageType::Blob),
            "NUMERIC" => Ok(StorageType::Numeric),
            _ => Err(SchemaError::InvalidStorageType(s.to_string())),
        }
    }
}

/// A value as stored in (or read from) a column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short lowercase name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
        }
    }
}

/// Identifier of a domain type in the [`TypeRegistry`](crate::TypeRegistry).
///
/// Built-in domain types are available as associated constants; user types
/// pick any other name.
///
/// # Examples
///
/// ```
/// use rowbind_core::DomainType;
///
/// assert_eq!(DomainType::DATE.as_str(), "date");
/// assert_eq!(DomainType::new("color").to_string(), "color");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DomainType(Cow<'static, str>);

impl DomainType {
    pub const TEXT: DomainType = DomainType::from_static("text");
    pub const BLOB: DomainType = DomainType::from_static("blob");
    pub const INTEGER: DomainType = DomainType::from_static("integer");
    pub const REAL: DomainType = DomainType::from_static("real");
    pub const BOOL: DomainType = DomainType::from_static("bool");
    pub const DATE: DomainType = DomainType::from_static("date");
    pub const TIME: DomainType = DomainType::from_static("time");
    pub const DATETIME: DomainType = DomainType::from_static("datetime");
    pub const PATH: DomainType = DomainType::from_static("path");

    pub const fn from_static(name: &'static str) -> Self {
        DomainType(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        DomainType(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for DomainType {
    fn from(name: &'static str) -> Self {
        DomainType::from_static(name)
    }
}

impl From<String> for DomainType {
    fn from(name: String) -> Self {
        DomainType::new(name)
    }
}

/// Identity of a stored row.
///
/// Tables with an implicit identity use the SQLite rowid; `WITHOUT ROWID`
/// tables are identified by their encoded primary key values, in field order.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    RowId(i64),
    Key(Vec<SqlValue>),
}

impl Identity {
    pub fn rowid(&self) -> Option<i64> {
        match self {
            Identity::RowId(id) => Some(*id),
            Identity::Key(_) => None,
        }
    }

    /// Bound parameters that select this row, in key column order.
    pub fn params(&self) -> Vec<SqlValue> {
        match self {
            Identity::RowId(id) => vec![SqlValue::Integer(*id)],
            Identity::Key(values) => values.clone(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::RowId(id) => write!(f, "rowid {id}"),
            Identity::Key(values) => write!(f, "key {values:?}"),
        }
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Identity::RowId(id)
    }
}

impl From<i32> for Identity {
    fn from(id: i32) -> Self {
        Identity::RowId(i64::from(id))
    }
}

/// Object-safe view of a user-registered domain value.
///
/// Implemented automatically for every `'static` type that is `Debug`,
/// `PartialEq`, `Send` and `Sync`.
pub trait CustomType: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_custom(&self, other: &dyn CustomType) -> bool;
}

impl<T: Any + fmt::Debug + PartialEq + Send + Sync> CustomType for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_custom(&self, other: &dyn CustomType) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// A user-registered domain value carried inside [`Value::Custom`].
#[derive(Debug, Clone)]
pub struct CustomValue(Arc<dyn CustomType>);

impl CustomValue {
    pub fn new<T: CustomType>(value: T) -> Self {
        CustomValue(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        (*self.0).eq_custom(&*other.0)
    }
}

/// A domain value held by a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Blob(Vec<u8>),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Path(PathBuf),
    /// Identity of a row in another table.
    Reference(Identity),
    Custom(CustomValue),
}

impl Value {
    /// Wraps a user-registered domain value.
    pub fn custom<T: CustomType>(value: T) -> Self {
        Value::Custom(CustomValue::new(value))
    }

    /// Extracts a user-registered domain value of type `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rowbind_core::Value;
    ///
    /// #[derive(Debug, Clone, PartialEq)]
    /// struct Rgb(u8, u8, u8);
    ///
    /// let value = Value::custom(Rgb(1, 2, 3));
    /// assert_eq!(value.into_custom::<Rgb>().unwrap(), Rgb(1, 2, 3));
    /// ```
    pub fn into_custom<T: Any + Clone>(self) -> Result<T, CodecError> {
        match &self {
            Value::Custom(custom) => custom.downcast_ref::<T>().cloned().ok_or_else(|| {
                mismatch(std::any::type_name::<T>(), &self)
            }),
            _ => Err(mismatch(std::any::type_name::<T>(), &self)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short lowercase name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Bool(_) => "bool",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
            Value::Path(_) => "path",
            Value::Reference(_) => "reference",
            Value::Custom(_) => "custom",
        }
    }
}

pub(crate) fn mismatch(domain: &str, found: &Value) -> CodecError {
    CodecError::TypeMismatch {
        domain: domain.to_string(),
        found: found.kind().to_string(),
    }
}

/// Conversion from a decoded domain value into a typed record field.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, CodecError>;
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident, $domain:literal;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, CodecError> {
                    match value {
                        Value::$variant(inner) => Ok(inner),
                        other => Err(mismatch($domain, &other)),
                    }
                }
            }
        )*
    };
}

value_conversions! {
    String => Text, "text";
    Vec<u8> => Blob, "blob";
    i64 => Integer, "integer";
    f64 => Real, "real";
    bool => Bool, "bool";
    NaiveDate => Date, "date";
    NaiveTime => Time, "time";
    NaiveDateTime => DateTime, "datetime";
    PathBuf => Path, "path";
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Integer(inner) => i32::try_from(inner).map_err(|e| CodecError::OutOfDomain {
                domain: "integer".to_string(),
                reason: e.to_string(),
            }),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Identity> for Value {
    fn from(identity: Identity) -> Self {
        Value::Reference(identity)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Typed reference to a row of table `T`.
///
/// Used as a record field type to store a foreign reference, and as a
/// comparator operand when querying by that field.
pub struct Ref<T> {
    identity: Identity,
    marker: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    pub fn new(identity: Identity) -> Self {
        Ref {
            identity,
            marker: PhantomData,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn into_identity(self) -> Identity {
        self.identity
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref::new(self.identity.clone())
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&self.identity).finish()
    }
}

impl<T> From<Ref<T>> for Value {
    fn from(reference: Ref<T>) -> Self {
        Value::Reference(reference.identity)
    }
}

impl<T> FromValue for Ref<T> {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Reference(identity) => Ok(Ref::new(identity)),
            other => Err(mismatch("reference", &other)),
        }
    }
}

/// Key identifying a registered record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl TableKey {
    pub fn of<T: 'static>() -> Self {
        TableKey {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// The bare type of a record field, before constraint markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A value of a registered domain type.
    Type(DomainType),
    /// A foreign reference to a registered table.
    Table(TableKey),
}

/// Rust types usable as record fields.
///
/// Implemented for the built-in domain types, for `Option<T>` (nullable
/// columns) and for [`Ref<T>`] (foreign references). User types implement it
/// by naming the domain type they registered.
pub trait FieldType {
    fn kind() -> FieldKind;

    fn nullable() -> bool {
        false
    }
}

macro_rules! builtin_field_types {
    ($($ty:ty => $domain:ident,)*) => {
        $(
            impl FieldType for $ty {
                fn kind() -> FieldKind {
                    FieldKind::Type(DomainType::$domain)
                }
            }
        )*
    };
}

builtin_field_types! {
    String => TEXT,
    Vec<u8> => BLOB,
    i64 => INTEGER,
    i32 => INTEGER,
    f64 => REAL,
    bool => BOOL,
    NaiveDate => DATE,
    NaiveTime => TIME,
    NaiveDateTime => DATETIME,
    PathBuf => PATH,
}

impl<T: FieldType> FieldType for Option<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn nullable() -> bool {
        true
    }
}

impl<T: Record> FieldType for Ref<T> {
    fn kind() -> FieldKind {
        FieldKind::Table(TableKey::of::<T>())
    }
}
