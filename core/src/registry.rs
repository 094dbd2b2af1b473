//! Domain type registration and the table catalog.
//!
//! [`TypeRegistry`] maps a [`DomainType`] to a [`TypeMapping`]: the column
//! type it is stored as and the functions converting it to and from a
//! [`SqlValue`]. Built-in mappings are installed by [`TypeRegistry::new`]:
//!
//! | Domain     | Rust type       | Column    | Stored as                   |
//! |------------|-----------------|-----------|-----------------------------|
//! | `text`     | `String`        | `TEXT`    | as is                       |
//! | `blob`     | `Vec<u8>`       | `BLOB`    | as is                       |
//! | `integer`  | `i64`, `i32`    | `INTEGER` | as is                       |
//! | `real`     | `f64`           | `REAL`    | as is                       |
//! | `bool`     | `bool`          | `INTEGER` | `0` / `1`                   |
//! | `date`     | `NaiveDate`     | `TEXT`    | `%Y-%m-%d`                  |
//! | `time`     | `NaiveTime`     | `TEXT`    | `%H:%M:%S%.f`               |
//! | `datetime` | `NaiveDateTime` | `TEXT`    | `%Y-%m-%dT%H:%M:%S%.f`      |
//! | `path`     | `PathBuf`       | `TEXT`    | UTF-8 path string           |
//!
//! [`Registry`] bundles the type registry with the schemas of every
//! registered table. It is populated once at startup and then shared
//! read-only (typically behind an `Arc`).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::codec::Record;
use crate::error::{CodecError, SchemaError};
use crate::schema::{TableSchema, derive};
use crate::types::{CustomType, DomainType, SqlValue, StorageType, TableKey, Value, mismatch};

/// Canonical text format for `date` values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical text format for `time` values.
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Canonical text format for `datetime` values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

type EncodeFn = Arc<dyn Fn(&Value) -> Result<Vec<SqlValue>, CodecError> + Send + Sync>;
type DecodeFn = Arc<dyn Fn(Vec<SqlValue>) -> Result<Value, CodecError> + Send + Sync>;

/// Storage representation of one domain type.
///
/// Most domain types occupy a single column; a mapping may also spread one
/// value over several columns, stored side by side in declaration order.
/// Encode and decode never see `NULL`; nullability is handled by the codec.
#[derive(Clone)]
pub struct TypeMapping {
    domain: DomainType,
    columns: Vec<StorageType>,
    value_type: TypeId,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl TypeMapping {
    /// Creates a single-column mapping whose domain values are represented
    /// by Rust type `T`.
    pub fn new<T, E, D>(domain: DomainType, storage: StorageType, encode: E, decode: D) -> Self
    where
        T: Any,
        E: Fn(&Value) -> Result<SqlValue, CodecError> + Send + Sync + 'static,
        D: Fn(SqlValue) -> Result<Value, CodecError> + Send + Sync + 'static,
    {
        let name = domain.to_string();
        Self::with_columns::<T, _, _>(
            domain,
            vec![storage],
            move |value| encode(value).map(|stored| vec![stored]),
            move |stored| match <[SqlValue; 1]>::try_from(stored) {
                Ok([stored]) => decode(stored),
                Err(stored) => Err(column_count(&name, 1, stored.len())),
            },
        )
    }

    /// Creates a mapping that stores each value of `T` in `columns`.
    pub fn with_columns<T, E, D>(
        domain: DomainType,
        columns: Vec<StorageType>,
        encode: E,
        decode: D,
    ) -> Self
    where
        T: Any,
        E: Fn(&Value) -> Result<Vec<SqlValue>, CodecError> + Send + Sync + 'static,
        D: Fn(Vec<SqlValue>) -> Result<Value, CodecError> + Send + Sync + 'static,
    {
        TypeMapping {
            domain,
            columns,
            value_type: TypeId::of::<T>(),
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    pub fn domain(&self) -> &DomainType {
        &self.domain
    }

    /// Column types, in storage order.
    pub fn columns(&self) -> &[StorageType] {
        &self.columns
    }

    /// Encodes a domain value into one stored value per column.
    pub fn encode(&self, value: &Value) -> Result<Vec<SqlValue>, CodecError> {
        let stored = (self.encode)(value)?;
        self.check_width(stored.len())?;
        Ok(stored)
    }

    /// Decodes the stored values of every column back into a domain value.
    pub fn decode(&self, stored: Vec<SqlValue>) -> Result<Value, CodecError> {
        self.check_width(stored.len())?;
        (self.decode)(stored)
    }

    fn check_width(&self, found: usize) -> Result<(), CodecError> {
        if found == self.columns.len() {
            Ok(())
        } else {
            Err(column_count(self.domain.as_str(), self.columns.len(), found))
        }
    }

    /// Two mappings are the same when they store the same Rust type in the
    /// same column types.
    fn same_as(&self, other: &TypeMapping) -> bool {
        self.columns == other.columns && self.value_type == other.value_type
    }
}

impl fmt::Debug for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMapping")
            .field("domain", &self.domain)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Registry of domain type mappings.
///
/// # Examples
///
/// ```
/// use rowbind_core::{CodecError, DomainType, SqlValue, StorageType, TypeRegistry, Value};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Celsius(f64);
///
/// let mut types = TypeRegistry::new();
/// types
///     .register_type(
///         "celsius",
///         "REAL",
///         |c: &Celsius| Ok(SqlValue::Real(c.0)),
///         |stored| match stored {
///             SqlValue::Real(v) => Ok(Celsius(v)),
///             other => Err(CodecError::Malformed {
///                 domain: "celsius".into(),
///                 reason: other.kind().into(),
///             }),
///         },
///     )
///     .unwrap();
///
/// let mapping = types.resolve(&DomainType::new("celsius")).unwrap();
/// assert_eq!(mapping.columns(), [StorageType::Real]);
/// assert_eq!(
///     mapping.encode(&Value::custom(Celsius(21.5))).unwrap(),
///     vec![SqlValue::Real(21.5)]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    mappings: HashMap<DomainType, TypeMapping>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates a registry holding the built-in mappings.
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            mappings: HashMap::new(),
        };
        for mapping in builtin_mappings() {
            registry.mappings.insert(mapping.domain.clone(), mapping);
        }
        registry
    }

    /// Registers a mapping.
    ///
    /// Registering an identical mapping again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NoColumns`] for a mapping without columns, or
    /// [`SchemaError::TypeConflict`] if the domain type is already mapped to
    /// different column types or a different Rust type.
    pub fn register(&mut self, mapping: TypeMapping) -> Result<(), SchemaError> {
        if mapping.columns.is_empty() {
            return Err(SchemaError::NoColumns(mapping.domain.to_string()));
        }
        if let Some(existing) = self.mappings.get(&mapping.domain) {
            if existing.same_as(&mapping) {
                return Ok(());
            }
            return Err(SchemaError::TypeConflict(mapping.domain.to_string()));
        }
        self.mappings.insert(mapping.domain.clone(), mapping);
        Ok(())
    }

    /// Registers a user type `T` stored in the column type named by
    /// `storage`, with typed encode and decode functions.
    ///
    /// Domain values of `T` travel as [`Value::Custom`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidStorageType`] if `storage` is not a
    /// primitive column type, or [`SchemaError::TypeConflict`] if `domain`
    /// is already registered differently.
    pub fn register_type<T, E, D>(
        &mut self,
        domain: impl Into<DomainType>,
        storage: &str,
        encode: E,
        decode: D,
    ) -> Result<(), SchemaError>
    where
        T: CustomType + Clone,
        E: Fn(&T) -> Result<SqlValue, CodecError> + Send + Sync + 'static,
        D: Fn(SqlValue) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        let domain = domain.into();
        let storage: StorageType = storage.parse()?;
        let name = domain.to_string();
        let mapping = TypeMapping::new::<T, _, _>(
            domain,
            storage,
            move |value| encode(downcast(&name, value)?),
            move |stored| decode(stored).map(Value::custom),
        );
        self.register(mapping)
    }

    /// Registers a user type `T` spread over several columns, one per
    /// storage tag. Each column is named after the field with its position
    /// appended (`color_0`, `color_1`, ...).
    ///
    /// # Examples
    ///
    /// ```
    /// use rowbind_core::{CodecError, DomainType, SqlValue, StorageType, TypeRegistry, Value};
    ///
    /// #[derive(Debug, Clone, PartialEq)]
    /// struct Version(String, i64);
    ///
    /// let mut types = TypeRegistry::new();
    /// types
    ///     .register_columns(
    ///         "version",
    ///         &["TEXT", "INTEGER"],
    ///         |v: &Version| Ok(vec![SqlValue::Text(v.0.clone()), SqlValue::Integer(v.1)]),
    ///         |stored| match <[SqlValue; 2]>::try_from(stored) {
    ///             Ok([SqlValue::Text(name), SqlValue::Integer(n)]) => Ok(Version(name, n)),
    ///             _ => Err(CodecError::Malformed {
    ///                 domain: "version".into(),
    ///                 reason: "expected (text, integer)".into(),
    ///             }),
    ///         },
    ///     )
    ///     .unwrap();
    ///
    /// let mapping = types.resolve(&DomainType::new("version")).unwrap();
    /// assert_eq!(mapping.columns(), [StorageType::Text, StorageType::Integer]);
    /// ```
    ///
    /// # Errors
    ///
    /// As [`register_type`](Self::register_type), plus
    /// [`SchemaError::NoColumns`] if `storage` is empty.
    pub fn register_columns<T, E, D>(
        &mut self,
        domain: impl Into<DomainType>,
        storage: &[&str],
        encode: E,
        decode: D,
    ) -> Result<(), SchemaError>
    where
        T: CustomType + Clone,
        E: Fn(&T) -> Result<Vec<SqlValue>, CodecError> + Send + Sync + 'static,
        D: Fn(Vec<SqlValue>) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        let domain = domain.into();
        let columns = storage
            .iter()
            .map(|tag| tag.parse())
            .collect::<Result<Vec<StorageType>, _>>()?;
        let name = domain.to_string();
        let mapping = TypeMapping::with_columns::<T, _, _>(
            domain,
            columns,
            move |value| encode(downcast(&name, value)?),
            move |stored| decode(stored).map(Value::custom),
        );
        self.register(mapping)
    }

    /// Looks up the mapping for a domain type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownType`] if nothing is registered under
    /// `domain`.
    pub fn resolve(&self, domain: &DomainType) -> Result<&TypeMapping, SchemaError> {
        self.mappings
            .get(domain)
            .ok_or_else(|| SchemaError::UnknownType(domain.to_string()))
    }

    pub fn contains(&self, domain: &DomainType) -> bool {
        self.mappings.contains_key(domain)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

fn builtin_mappings() -> Vec<TypeMapping> {
    vec![
        TypeMapping::new::<String, _, _>(
            DomainType::TEXT,
            StorageType::Text,
            |value| match value {
                Value::Text(s) => Ok(SqlValue::Text(s.clone())),
                other => Err(mismatch("text", other)),
            },
            |stored| match stored {
                SqlValue::Text(s) => Ok(Value::Text(s)),
                other => Err(malformed("text", &other)),
            },
        ),
        TypeMapping::new::<Vec<u8>, _, _>(
            DomainType::BLOB,
            StorageType::Blob,
            |value| match value {
                Value::Blob(b) => Ok(SqlValue::Blob(b.clone())),
                other => Err(mismatch("blob", other)),
            },
            |stored| match stored {
                SqlValue::Blob(b) => Ok(Value::Blob(b)),
                other => Err(malformed("blob", &other)),
            },
        ),
        TypeMapping::new::<i64, _, _>(
            DomainType::INTEGER,
            StorageType::Integer,
            |value| match value {
                Value::Integer(i) => Ok(SqlValue::Integer(*i)),
                other => Err(mismatch("integer", other)),
            },
            |stored| match stored {
                SqlValue::Integer(i) => Ok(Value::Integer(i)),
                other => Err(malformed("integer", &other)),
            },
        ),
        TypeMapping::new::<f64, _, _>(
            DomainType::REAL,
            StorageType::Real,
            |value| match value {
                Value::Real(r) if r.is_nan() => Err(CodecError::OutOfDomain {
                    domain: "real".to_string(),
                    reason: "NaN cannot be stored".to_string(),
                }),
                Value::Real(r) => Ok(SqlValue::Real(*r)),
                Value::Integer(i) => Ok(SqlValue::Real(*i as f64)),
                other => Err(mismatch("real", other)),
            },
            |stored| match stored {
                SqlValue::Real(r) => Ok(Value::Real(r)),
                SqlValue::Integer(i) => Ok(Value::Real(i as f64)),
                other => Err(malformed("real", &other)),
            },
        ),
        TypeMapping::new::<bool, _, _>(
            DomainType::BOOL,
            StorageType::Integer,
            |value| match value {
                Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
                other => Err(mismatch("bool", other)),
            },
            |stored| match stored {
                SqlValue::Integer(0) => Ok(Value::Bool(false)),
                SqlValue::Integer(1) => Ok(Value::Bool(true)),
                other => Err(malformed("bool", &other)),
            },
        ),
        TypeMapping::new::<NaiveDate, _, _>(
            DomainType::DATE,
            StorageType::Text,
            |value| match value {
                Value::Date(d) => Ok(SqlValue::Text(d.format(DATE_FORMAT).to_string())),
                other => Err(mismatch("date", other)),
            },
            |stored| {
                let text = stored_text("date", stored)?;
                NaiveDate::parse_from_str(&text, DATE_FORMAT)
                    .map(Value::Date)
                    .map_err(|e| parse_failure("date", &text, e))
            },
        ),
        TypeMapping::new::<NaiveTime, _, _>(
            DomainType::TIME,
            StorageType::Text,
            |value| match value {
                Value::Time(t) => Ok(SqlValue::Text(t.format(TIME_FORMAT).to_string())),
                other => Err(mismatch("time", other)),
            },
            |stored| {
                let text = stored_text("time", stored)?;
                NaiveTime::parse_from_str(&text, TIME_FORMAT)
                    .map(Value::Time)
                    .map_err(|e| parse_failure("time", &text, e))
            },
        ),
        TypeMapping::new::<NaiveDateTime, _, _>(
            DomainType::DATETIME,
            StorageType::Text,
            |value| match value {
                Value::DateTime(dt) => {
                    Ok(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()))
                }
                other => Err(mismatch("datetime", other)),
            },
            |stored| {
                let text = stored_text("datetime", stored)?;
                NaiveDateTime::parse_from_str(&text, DATETIME_FORMAT)
                    .map(Value::DateTime)
                    .map_err(|e| parse_failure("datetime", &text, e))
            },
        ),
        TypeMapping::new::<PathBuf, _, _>(
            DomainType::PATH,
            StorageType::Text,
            |value| match value {
                Value::Path(p) => p
                    .to_str()
                    .map(|s| SqlValue::Text(s.to_string()))
                    .ok_or_else(|| CodecError::OutOfDomain {
                        domain: "path".to_string(),
                        reason: format!("{} is not valid UTF-8", p.display()),
                    }),
                other => Err(mismatch("path", other)),
            },
            |stored| stored_text("path", stored).map(|s| Value::Path(PathBuf::from(s))),
        ),
    ]
}

fn downcast<'v, T: Any>(domain: &str, value: &'v Value) -> Result<&'v T, CodecError> {
    match value {
        Value::Custom(custom) => custom
            .downcast_ref::<T>()
            .ok_or_else(|| mismatch(domain, value)),
        other => Err(mismatch(domain, other)),
    }
}

fn column_count(domain: &str, expected: usize, found: usize) -> CodecError {
    CodecError::ColumnCount {
        domain: domain.to_string(),
        expected,
        found,
    }
}

fn stored_text(domain: &str, stored: SqlValue) -> Result<String, CodecError> {
    match stored {
        SqlValue::Text(s) => Ok(s),
        other => Err(malformed(domain, &other)),
    }
}

fn malformed(domain: &str, stored: &SqlValue) -> CodecError {
    CodecError::Malformed {
        domain: domain.to_string(),
        reason: format!("unexpected {} column value", stored.kind()),
    }
}

fn parse_failure(domain: &str, text: &str, err: chrono::ParseError) -> CodecError {
    CodecError::Malformed {
        domain: domain.to_string(),
        reason: format!("'{text}': {err}"),
    }
}

/// Type mappings plus the schemas of every registered table.
///
/// Register custom types first, then tables in dependency order (a table
/// referenced by another must be registered before it). Once populated, wrap
/// the registry in an `Arc` and share it; it is never mutated afterwards.
///
/// # Examples
///
/// ```
/// use rowbind_core::{CodecError, FieldValues, Record, RecordDef, Registry, Value};
///
/// struct Point {
///     x: i64,
///     y: i64,
/// }
///
/// impl Record for Point {
///     fn definition() -> RecordDef {
///         RecordDef::new("Point").field::<i64>("x").field::<i64>("y")
///     }
///
///     fn to_values(&self) -> Vec<Value> {
///         vec![self.x.into(), self.y.into()]
///     }
///
///     fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
///         Ok(Point { x: values.take("x")?, y: values.take("y")? })
///     }
/// }
///
/// let mut registry = Registry::new();
/// let schema = registry.register_table::<Point>().unwrap();
/// assert!(schema.has_rowid());
/// assert_eq!(schema.fields().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: TypeRegistry,
    tables: Vec<Arc<TableSchema>>,
    by_type: HashMap<TypeId, usize>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    /// Creates a registry with the built-in type mappings and no tables.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// Shorthand for [`TypeRegistry::register_type`].
    pub fn register_type<T, E, D>(
        &mut self,
        domain: impl Into<DomainType>,
        storage: &str,
        encode: E,
        decode: D,
    ) -> Result<(), SchemaError>
    where
        T: CustomType + Clone,
        E: Fn(&T) -> Result<SqlValue, CodecError> + Send + Sync + 'static,
        D: Fn(SqlValue) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        self.types.register_type(domain, storage, encode, decode)
    }

    /// Shorthand for [`TypeRegistry::register_columns`].
    pub fn register_columns<T, E, D>(
        &mut self,
        domain: impl Into<DomainType>,
        storage: &[&str],
        encode: E,
        decode: D,
    ) -> Result<(), SchemaError>
    where
        T: CustomType + Clone,
        E: Fn(&T) -> Result<Vec<SqlValue>, CodecError> + Send + Sync + 'static,
        D: Fn(Vec<SqlValue>) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        self.types.register_columns(domain, storage, encode, decode)
    }

    /// Derives and caches the schema of record type `T`.
    ///
    /// Registering the same type twice returns the cached schema.
    ///
    /// # Errors
    ///
    /// Any [`SchemaError`] raised by [`derive`], or
    /// [`SchemaError::DuplicateTable`] if another type already uses the
    /// table name.
    pub fn register_table<T: Record>(&mut self) -> Result<Arc<TableSchema>, SchemaError> {
        let key = TableKey::of::<T>();
        if let Some(schema) = self.table_by_key(&key) {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(derive(&T::definition(), self)?);
        if self.by_name.contains_key(schema.name()) {
            return Err(SchemaError::DuplicateTable(schema.name().to_string()));
        }

        let index = self.tables.len();
        self.by_type.insert(key.type_id(), index);
        self.by_name.insert(schema.name().to_string(), index);
        self.tables.push(Arc::clone(&schema));
        Ok(schema)
    }

    /// Returns the schema registered for record type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownTable`] if `T` was never registered.
    pub fn table<T: Record>(&self) -> Result<&Arc<TableSchema>, SchemaError> {
        self.table_by_key(&TableKey::of::<T>())
            .ok_or_else(|| SchemaError::UnknownTable(std::any::type_name::<T>().to_string()))
    }

    pub fn table_by_key(&self, key: &TableKey) -> Option<&Arc<TableSchema>> {
        self.by_type
            .get(&key.type_id())
            .map(|&index| &self.tables[index])
    }

    pub fn table_named(&self, name: &str) -> Option<&Arc<TableSchema>> {
        self.by_name.get(name).map(|&index| &self.tables[index])
    }

    /// Registered tables in registration order.
    pub fn tables(&self) -> std::slice::Iter<'_, Arc<TableSchema>> {
        self.tables.iter()
    }
}
