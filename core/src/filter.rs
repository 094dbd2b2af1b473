//! Comparators and the conjunctive filter compiled into a `WHERE` clause.
//!
//! A [`Filter`] holds at most one [`Comparator`] per field. Operands are
//! encoded with the field's type mapping as soon as they are added, so a
//! filter that was built successfully always compiles. Compilation renders
//! one `"field" <op> ?` clause per field joined with `AND`; operand values
//! are only ever bound as parameters. A field stored in several columns is
//! compared as a row value, `("a", "b") <op> (?, ?)`.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use rowbind_core::{CodecError, FieldValues, Filter, Record, RecordDef, Registry, Value, gt};
//!
//! struct Point {
//!     x: i64,
//! }
//!
//! impl Record for Point {
//!     fn definition() -> RecordDef {
//!         RecordDef::new("Point").field::<i64>("x")
//!     }
//!     fn to_values(&self) -> Vec<Value> {
//!         vec![self.x.into()]
//!     }
//!     fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
//!         Ok(Point { x: values.take("x")? })
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! let schema = registry.register_table::<Point>().unwrap();
//! let mut filter = Filter::new(Arc::clone(&schema));
//! filter.push("x", gt(2), registry.types()).unwrap();
//! filter.push("rowid", 5, registry.types()).unwrap();
//!
//! let clause = filter.compile();
//! assert_eq!(clause.sql, "\"x\" > ? AND \"rowid\" = ?");
//! assert_eq!(clause.params.len(), 2);
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::codec::encode_operand;
use crate::error::{CodecError, Result, SchemaError};
use crate::registry::TypeRegistry;
use crate::schema::{ROWID, TableSchema};
use crate::sql::quote;
use crate::types::{Identity, Ref, SqlValue, Value, mismatch};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl Op {
    pub fn as_sql(self) -> &'static str {
        match self {
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Ge => ">=",
            Op::Gt => ">",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// An operator together with its operand.
///
/// Any value convertible into a [`Value`] converts into an `eq` comparator.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparator {
    op: Op,
    value: Value,
}

impl Comparator {
    pub fn new(op: Op, value: impl Into<Value>) -> Self {
        Comparator {
            op,
            value: value.into(),
        }
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

pub fn lt(value: impl Into<Value>) -> Comparator {
    Comparator::new(Op::Lt, value)
}

pub fn le(value: impl Into<Value>) -> Comparator {
    Comparator::new(Op::Le, value)
}

pub fn eq(value: impl Into<Value>) -> Comparator {
    Comparator::new(Op::Eq, value)
}

pub fn ne(value: impl Into<Value>) -> Comparator {
    Comparator::new(Op::Ne, value)
}

pub fn ge(value: impl Into<Value>) -> Comparator {
    Comparator::new(Op::Ge, value)
}

pub fn gt(value: impl Into<Value>) -> Comparator {
    Comparator::new(Op::Gt, value)
}

macro_rules! implicit_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Comparator {
                fn from(value: $ty) -> Self {
                    eq(value)
                }
            }
        )*
    };
}

implicit_eq!(
    Value,
    String,
    &str,
    Vec<u8>,
    i64,
    i32,
    f64,
    bool,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    PathBuf,
    Identity,
);

impl<T> From<Ref<T>> for Comparator {
    fn from(reference: Ref<T>) -> Self {
        eq(reference)
    }
}

impl<T: Into<Value>> From<Option<T>> for Comparator {
    fn from(value: Option<T>) -> Self {
        eq(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    field: String,
    columns: Vec<String>,
    op: Op,
    params: Vec<SqlValue>,
}

impl Condition {
    fn render(&self) -> String {
        let null = self.params.iter().all(SqlValue::is_null);
        let op = match self.op {
            Op::Eq if null => "IS",
            Op::Ne if null => "IS NOT",
            op => op.as_sql(),
        };
        match self.columns.as_slice() {
            [column] => format!("{} {op} ?", quote(column)),
            columns => {
                let names: Vec<String> = columns.iter().map(|c| quote(c)).collect();
                let marks = vec!["?"; columns.len()];
                format!("({}) {op} ({})", names.join(", "), marks.join(", "))
            }
        }
    }
}

/// Compiled `WHERE` clause text and its bound parameters.
///
/// `sql` is empty when the filter has no conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Conjunction of per-field comparisons against one table.
#[derive(Debug, Clone)]
pub struct Filter {
    schema: Arc<TableSchema>,
    conditions: Vec<Condition>,
}

impl Filter {
    /// An empty filter, matching every row.
    pub fn new(schema: Arc<TableSchema>) -> Self {
        Filter {
            schema,
            conditions: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn reserve(&self, field: &str) -> std::result::Result<(), SchemaError> {
        if self.conditions.iter().any(|c| c.field == field) {
            return Err(SchemaError::DuplicateQueryField {
                table: self.schema.name().to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    /// Adds a comparison on `field`.
    ///
    /// `field` is a declared field or, for tables with an implicit identity,
    /// `rowid`.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnknownField`] for a field the table lacks,
    /// [`SchemaError::DuplicateQueryField`] if `field` is already
    /// constrained, or a codec error if the operand does not fit the field.
    pub fn push(
        &mut self,
        field: &str,
        comparator: impl Into<Comparator>,
        types: &TypeRegistry,
    ) -> Result<()> {
        let comparator = comparator.into();
        let (columns, params) = if self.schema.has_rowid() && field == ROWID {
            (vec![ROWID.to_string()], vec![encode_rowid(&comparator.value)?])
        } else {
            let spec = self
                .schema
                .field(field)
                .ok_or_else(|| SchemaError::UnknownField {
                    table: self.schema.name().to_string(),
                    field: field.to_string(),
                })?;
            let params = encode_operand(types, spec, &comparator.value)?;
            (spec.column_names().map(str::to_string).collect(), params)
        };
        self.reserve(field)?;
        self.conditions.push(Condition {
            field: field.to_string(),
            columns,
            op: comparator.op,
            params,
        });
        Ok(())
    }

    /// Constrains every identity column to `identity`, one condition per
    /// primary field.
    pub fn push_identity(&mut self, identity: &Identity) -> std::result::Result<(), SchemaError> {
        self.schema.check_identity(identity)?;
        let mut conditions = Vec::new();
        match identity {
            Identity::RowId(id) => conditions.push(Condition {
                field: ROWID.to_string(),
                columns: vec![ROWID.to_string()],
                op: Op::Eq,
                params: vec![SqlValue::Integer(*id)],
            }),
            Identity::Key(key) => {
                let mut rest = key.as_slice();
                for field in self.schema.primary_fields() {
                    let (params, tail) = rest.split_at(field.width());
                    rest = tail;
                    conditions.push(Condition {
                        field: field.name.clone(),
                        columns: field.column_names().map(str::to_string).collect(),
                        op: Op::Eq,
                        params: params.to_vec(),
                    });
                }
            }
        }
        for condition in &conditions {
            self.reserve(&condition.field)?;
        }
        self.conditions.extend(conditions);
        Ok(())
    }

    /// Renders the `WHERE` clause body and its parameters.
    pub fn compile(&self) -> Clause {
        Clause {
            sql: self
                .conditions
                .iter()
                .map(Condition::render)
                .collect::<Vec<_>>()
                .join(" AND "),
            params: self
                .conditions
                .iter()
                .flat_map(|c| c.params.iter().cloned())
                .collect(),
        }
    }
}

fn encode_rowid(value: &Value) -> std::result::Result<SqlValue, CodecError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Integer(id) | Value::Reference(Identity::RowId(id)) => Ok(SqlValue::Integer(*id)),
        other => Err(mismatch(ROWID, other)),
    }
}
