//! Schema derivation from typed record definitions.
//!
//! A [`RecordDef`] lists a record's fields in order, each with a bare
//! [`FieldKind`] and at most one [`Constraint`] marker. [`derive`] resolves
//! every field against a [`Registry`] and produces a [`TableSchema`]:
//!
//! - Tables without Primary fields get an implicit `rowid INTEGER PRIMARY
//!   KEY` column, prepended before the declared fields.
//! - Tables with Primary fields are `WITHOUT ROWID` tables keyed by those
//!   fields, in declaration order.
//! - Unique and Index fields produce one index each.
//! - A field usually occupies one column named after it. Multi-column
//!   domain types spread over `<field>_0`, `<field>_1`, ...; references to
//!   a table keyed by several columns become `<field>_<key column>` for
//!   each key column of the target.
//!
//! # Examples
//!
//! ```
//! use rowbind_core::{CodecError, Constraint, FieldValues, Record, RecordDef, Registry, Value};
//!
//! struct Setting {
//!     key: String,
//!     value: Option<String>,
//! }
//!
//! impl Record for Setting {
//!     fn definition() -> RecordDef {
//!         RecordDef::new("Setting")
//!             .primary::<String>("key")
//!             .field::<Option<String>>("value")
//!     }
//!
//!     fn to_values(&self) -> Vec<Value> {
//!         vec![self.key.clone().into(), self.value.clone().into()]
//!     }
//!
//!     fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
//!         Ok(Setting { key: values.take("key")?, value: values.take("value")? })
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! let schema = registry.register_table::<Setting>().unwrap();
//! assert!(!schema.has_rowid());
//! assert_eq!(schema.field("key").unwrap().constraint, Constraint::Primary);
//! assert!(schema.field("value").unwrap().nullable);
//! ```

use std::collections::HashSet;

use serde::Serialize;

use crate::error::SchemaError;
use crate::registry::Registry;
use crate::sql;
use crate::types::{DomainType, FieldKind, FieldType, Identity, StorageType};

/// Name of the implicit identity column.
pub const ROWID: &str = "rowid";

/// Constraint marker attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    #[default]
    None,
    Primary,
    Unique,
    Index,
}

/// One declared field of a record.
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
    nullable: bool,
    markers: Vec<Constraint>,
}

impl FieldDef {
    /// Declares a field whose Rust type is `T`.
    pub fn of<T: FieldType>(name: impl Into<String>) -> Self {
        FieldDef {
            name: name.into(),
            kind: T::kind(),
            nullable: T::nullable(),
            markers: Vec::new(),
        }
    }

    /// Declares a non-nullable field of an explicitly named domain type.
    pub fn new(name: impl Into<String>, domain: DomainType) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldKind::Type(domain),
            nullable: false,
            markers: Vec::new(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.markers.push(Constraint::Primary);
        self
    }

    pub fn unique(mut self) -> Self {
        self.markers.push(Constraint::Unique);
        self
    }

    pub fn index(mut self) -> Self {
        self.markers.push(Constraint::Index);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_primary(&self) -> bool {
        self.markers.contains(&Constraint::Primary)
    }
}

/// Typed definition of a record: table name and ordered fields.
#[derive(Debug, Clone)]
pub struct RecordDef {
    name: String,
    fields: Vec<FieldDef>,
    without_rowid: bool,
}

impl RecordDef {
    pub fn new(name: impl Into<String>) -> Self {
        RecordDef {
            name: name.into(),
            fields: Vec::new(),
            without_rowid: false,
        }
    }

    pub fn field<T: FieldType>(self, name: impl Into<String>) -> Self {
        self.with(FieldDef::of::<T>(name))
    }

    pub fn primary<T: FieldType>(self, name: impl Into<String>) -> Self {
        self.with(FieldDef::of::<T>(name).primary())
    }

    pub fn unique<T: FieldType>(self, name: impl Into<String>) -> Self {
        self.with(FieldDef::of::<T>(name).unique())
    }

    pub fn index<T: FieldType>(self, name: impl Into<String>) -> Self {
        self.with(FieldDef::of::<T>(name).index())
    }

    pub fn with(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Opts out of the implicit rowid; at least one field must be Primary.
    pub fn without_rowid(mut self) -> Self {
        self.without_rowid = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }
}

/// Resolved domain of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDomain {
    /// Value of a registered domain type.
    Type(DomainType),
    /// Foreign reference to `table`'s identity `columns`.
    Table {
        table: String,
        columns: Vec<String>,
        rowid: bool,
    },
}

/// One stored column of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub storage: StorageType,
}

impl ColumnSpec {
    fn new(name: impl Into<String>, storage: StorageType) -> Self {
        ColumnSpec {
            name: name.into(),
            storage,
        }
    }
}

/// A fully resolved field and the columns storing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub domain: FieldDomain,
    pub columns: Vec<ColumnSpec>,
    pub constraint: Constraint,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn is_primary(&self) -> bool {
        self.constraint == Constraint::Primary
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Number of columns the field occupies.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Name of the referenced table, for foreign reference columns.
    pub fn references(&self) -> Option<&str> {
        match &self.domain {
            FieldDomain::Table { table, .. } => Some(table),
            FieldDomain::Type(_) => None,
        }
    }
}

/// An index derived from a Unique or Index field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Derived, immutable schema of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    name: String,
    fields: Vec<FieldSpec>,
    has_rowid: bool,
    indexes: Vec<IndexSpec>,
}

impl TableSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields in column order, without the implicit rowid.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_rowid(&self) -> bool {
        self.has_rowid
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Fields forming the primary key of a `WITHOUT ROWID` table.
    pub fn primary_fields(&self) -> impl Iterator<Item = &FieldSpec> + '_ {
        self.fields.iter().filter(|f| f.is_primary())
    }

    /// Fields written by an update: everything except the key.
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldSpec> + '_ {
        self.fields.iter().filter(|f| !f.is_primary())
    }

    /// Columns identifying a row: `rowid`, or every column of the primary
    /// fields.
    pub fn identity_columns(&self) -> Vec<&str> {
        if self.has_rowid {
            vec![ROWID]
        } else {
            self.primary_fields().flat_map(FieldSpec::column_names).collect()
        }
    }

    /// Identity columns with their storage types.
    pub fn identity_column_specs(&self) -> Vec<ColumnSpec> {
        if self.has_rowid {
            vec![ColumnSpec::new(ROWID, StorageType::Integer)]
        } else {
            self.primary_fields()
                .flat_map(|f| f.columns.iter().cloned())
                .collect()
        }
    }

    /// Declared columns in order, without the implicit rowid.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnSpec> + '_ {
        self.fields.iter().flat_map(|f| f.columns.iter())
    }

    /// Number of columns a full row carries, including the rowid.
    pub fn column_count(&self) -> usize {
        self.columns().count() + usize::from(self.has_rowid)
    }

    /// Checks that `identity` has the shape of this table's key.
    pub fn check_identity(&self, identity: &Identity) -> Result<(), SchemaError> {
        let matches = match identity {
            Identity::RowId(_) => self.has_rowid,
            Identity::Key(values) => {
                !self.has_rowid
                    && values.len() == self.primary_fields().map(FieldSpec::width).sum::<usize>()
            }
        };
        if matches {
            Ok(())
        } else {
            Err(SchemaError::IdentityMismatch(self.name.clone()))
        }
    }

    /// `CREATE TABLE` followed by one `CREATE INDEX` per index.
    pub fn create_statements(&self) -> Vec<String> {
        let mut statements = Vec::with_capacity(1 + self.indexes.len());
        statements.push(sql::create_table(self));
        statements.extend(self.indexes.iter().map(|index| sql::create_index(self, index)));
        statements
    }
}

/// Validates that a table or field name is a plain SQL identifier.
pub(crate) fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

/// Derives the schema of a record definition.
///
/// Referenced tables and custom domain types must already be registered in
/// `registry`.
///
/// # Errors
///
/// Returns a [`SchemaError`] for invalid identifiers, duplicate fields or
/// columns, several markers on one field, unknown types or tables, a
/// `rowid` collision, a `WITHOUT ROWID` opt-in without Primary fields, or
/// nullable Primary fields.
pub fn derive(def: &RecordDef, registry: &Registry) -> Result<TableSchema, SchemaError> {
    validate_identifier(&def.name)?;
    let table = def.name.as_str();

    let has_primary = def.fields.iter().any(FieldDef::is_primary);
    if def.without_rowid && !has_primary {
        return Err(SchemaError::WithoutRowidNeedsPrimary(table.to_string()));
    }
    let has_rowid = !has_primary;

    let mut seen = HashSet::new();
    let mut seen_columns = HashSet::new();
    let mut fields = Vec::with_capacity(def.fields.len());
    for field in &def.fields {
        validate_identifier(&field.name)?;
        let field_error = || (table.to_string(), field.name.clone());

        if !seen.insert(field.name.as_str()) {
            let (table, field) = field_error();
            return Err(SchemaError::DuplicateField { table, field });
        }

        let constraint = match field.markers.as_slice() {
            [] => Constraint::None,
            [marker] => *marker,
            _ => {
                let (table, field) = field_error();
                return Err(SchemaError::ConflictingConstraints { table, field });
            }
        };
        if constraint == Constraint::Primary && field.nullable {
            let (table, field) = field_error();
            return Err(SchemaError::NullablePrimary { table, field });
        }

        let (domain, columns) = match &field.kind {
            FieldKind::Type(domain) => {
                let mapping = registry.types().resolve(domain)?;
                let columns = match mapping.columns() {
                    [storage] => vec![ColumnSpec::new(&field.name, *storage)],
                    many => many
                        .iter()
                        .enumerate()
                        .map(|(i, storage)| ColumnSpec::new(format!("{}_{i}", field.name), *storage))
                        .collect(),
                };
                (FieldDomain::Type(domain.clone()), columns)
            }
            FieldKind::Table(key) => {
                let target = registry
                    .table_by_key(key)
                    .ok_or_else(|| SchemaError::UnknownTable(key.type_name().to_string()))?;
                let target_columns = target.identity_column_specs();
                let columns = match target_columns.as_slice() {
                    [single] => vec![ColumnSpec::new(&field.name, single.storage)],
                    many => many
                        .iter()
                        .map(|c| ColumnSpec::new(format!("{}_{}", field.name, c.name), c.storage))
                        .collect(),
                };
                let domain = FieldDomain::Table {
                    table: target.name().to_string(),
                    columns: target_columns.into_iter().map(|c| c.name).collect(),
                    rowid: target.has_rowid(),
                };
                (domain, columns)
            }
        };

        for column in &columns {
            if has_rowid && column.name.eq_ignore_ascii_case(ROWID) {
                return Err(SchemaError::ReservedField {
                    table: table.to_string(),
                    field: column.name.clone(),
                });
            }
            if !seen_columns.insert(column.name.to_ascii_lowercase()) {
                return Err(SchemaError::DuplicateField {
                    table: table.to_string(),
                    field: column.name.clone(),
                });
            }
        }

        fields.push(FieldSpec {
            name: field.name.clone(),
            domain,
            columns,
            constraint,
            nullable: field.nullable,
        });
    }

    let indexes = fields
        .iter()
        .filter_map(|field| {
            let (prefix, unique) = match field.constraint {
                Constraint::Unique => ("uniq", true),
                Constraint::Index => ("idx", false),
                Constraint::None | Constraint::Primary => return None,
            };
            Some(IndexSpec {
                name: format!("{prefix}_{table}_{}", field.name),
                columns: field.column_names().map(str::to_string).collect(),
                unique,
            })
        })
        .collect();

    Ok(TableSchema {
        name: table.to_string(),
        fields,
        has_rowid,
        indexes,
    })
}
