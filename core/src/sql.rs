//! SQL text generation for derived schemas.
//!
//! Identifiers are validated at derivation time and always double-quoted
//! here. Values never appear in the generated text: every value position is
//! a `?` placeholder bound at execution time.

use std::fmt::Write;

use crate::schema::{ColumnSpec, FieldDomain, FieldSpec, IndexSpec, ROWID, TableSchema};

/// Quotes a validated identifier.
pub fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

/// Single-column references are declared inline; wider ones get a
/// table-level `FOREIGN KEY` clause from [`foreign_key`].
fn column_def(field: &FieldSpec, column: &ColumnSpec) -> String {
    let mut def = format!("{} {}", quote(&column.name), column.storage.as_sql());
    if !field.nullable {
        def.push_str(" NOT NULL");
    }
    if let FieldDomain::Table { table, columns, .. } = &field.domain {
        if let [target] = columns.as_slice() {
            let _ = write!(def, " REFERENCES {} ({})", quote(table), quote(target));
        }
    }
    def
}

fn foreign_key(field: &FieldSpec) -> Option<String> {
    match &field.domain {
        FieldDomain::Table { table, columns, .. } if columns.len() > 1 => Some(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            column_list(field.column_names()),
            quote(table),
            column_list(columns.iter().map(String::as_str))
        )),
        _ => None,
    }
}

fn column_list<'a>(columns: impl IntoIterator<Item = &'a str>) -> String {
    columns
        .into_iter()
        .map(quote)
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Generates the idempotent `CREATE TABLE` statement for a schema.
///
/// Rowid tables declare `"rowid" INTEGER PRIMARY KEY` first; keyed tables
/// carry a `PRIMARY KEY (...)` clause and end with `WITHOUT ROWID`.
pub fn create_table(schema: &TableSchema) -> String {
    let mut columns = Vec::with_capacity(schema.column_count() + 1);
    if schema.has_rowid() {
        columns.push(format!("{} INTEGER PRIMARY KEY", quote(ROWID)));
    }
    for field in schema.fields() {
        columns.extend(field.columns.iter().map(|column| column_def(field, column)));
    }
    if !schema.has_rowid() {
        columns.push(format!(
            "PRIMARY KEY ({})",
            column_list(schema.identity_columns())
        ));
    }
    columns.extend(schema.fields().iter().filter_map(foreign_key));

    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (", quote(schema.name()));
    sql.push_str(&columns.join(", "));
    sql.push(')');
    if !schema.has_rowid() {
        sql.push_str(" WITHOUT ROWID");
    }
    sql
}

/// Generates the idempotent `CREATE [UNIQUE] INDEX` statement for an index.
pub fn create_index(schema: &TableSchema, index: &IndexSpec) -> String {
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote(&index.name),
        quote(schema.name()),
        column_list(index.columns.iter().map(String::as_str))
    )
}

/// Generates the `INSERT` for all declared columns, in column order.
pub fn insert(schema: &TableSchema) -> String {
    let count = schema.columns().count();
    if count == 0 {
        return format!("INSERT INTO {} DEFAULT VALUES", quote(schema.name()));
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(schema.name()),
        column_list(schema.columns().map(|c| c.name.as_str())),
        placeholders(count)
    )
}

/// Generates an `INSERT` that also sets the rowid, bound first.
pub fn insert_with_rowid(schema: &TableSchema) -> String {
    let columns = std::iter::once(ROWID).chain(schema.columns().map(|c| c.name.as_str()));
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(schema.name()),
        column_list(columns),
        placeholders(schema.columns().count() + 1)
    )
}

/// Generates the `UPDATE` of every data column, keyed by identity columns.
///
/// Parameters: data columns in order, then identity values. A table whose
/// only columns form the key assigns the first key column to itself so the
/// statement still reports whether the row exists.
pub fn update(schema: &TableSchema) -> String {
    let identity = schema.identity_columns();
    let assignments: Vec<String> = schema
        .data_fields()
        .flat_map(FieldSpec::column_names)
        .map(|c| format!("{} = ?", quote(c)))
        .collect();
    let assignments = if assignments.is_empty() {
        let first = quote(identity[0]);
        format!("{first} = {first}")
    } else {
        assignments.join(", ")
    };
    let condition = identity
        .iter()
        .map(|c| format!("{} = ?", quote(c)))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "UPDATE {} SET {assignments} WHERE {condition}",
        quote(schema.name())
    )
}

fn where_suffix(clause: &str) -> String {
    if clause.is_empty() {
        String::new()
    } else {
        format!(" WHERE {clause}")
    }
}

/// Generates a `SELECT` of every column (rowid first when present).
pub fn select(schema: &TableSchema, clause: &str, limit: bool) -> String {
    let rowid = schema.has_rowid().then_some(ROWID);
    let columns = column_list(
        rowid
            .into_iter()
            .chain(schema.columns().map(|c| c.name.as_str())),
    );
    let mut sql = format!(
        "SELECT {columns} FROM {}{}",
        quote(schema.name()),
        where_suffix(clause)
    );
    if limit {
        sql.push_str(" LIMIT ?");
    }
    sql
}

pub fn count(schema: &TableSchema, clause: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {}{}",
        quote(schema.name()),
        where_suffix(clause)
    )
}

pub fn delete(schema: &TableSchema, clause: &str) -> String {
    format!("DELETE FROM {}{}", quote(schema.name()), where_suffix(clause))
}
