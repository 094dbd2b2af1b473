//! Integration tests for the rowbind-sqlite crate.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use rowbind_core::{
    CodecError, DomainType, FieldKind, FieldType, FieldValues, FromValue, Identity, Record,
    RecordDef, Ref, Registry, SchemaError, SqlValue, Value, eq, ge, gt, le, lt, ne,
};
use rowbind_sqlite::{Database, Instance, RecordState, StoreConfig, StoreError, TableStatus};

#[derive(Debug, Clone, PartialEq)]
struct NamedPoint {
    x: i64,
    y: i64,
    name: String,
}

impl NamedPoint {
    fn new(x: i64, y: i64, name: &str) -> Self {
        Self {
            x,
            y,
            name: name.to_string(),
        }
    }
}

impl Record for NamedPoint {
    fn definition() -> RecordDef {
        RecordDef::new("NamedPoint")
            .field::<i64>("x")
            .field::<i64>("y")
            .unique::<String>("name")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.x.into(), self.y.into(), self.name.clone().into()]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            x: values.take("x")?,
            y: values.take("y")?,
            name: values.take("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CompositeKey {
    part_one: i64,
    part_two: String,
    note: Option<String>,
}

impl Record for CompositeKey {
    fn definition() -> RecordDef {
        RecordDef::new("CompositeKey")
            .primary::<i64>("part_one")
            .primary::<String>("part_two")
            .field::<Option<String>>("note")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.part_one.into(),
            self.part_two.clone().into(),
            self.note.clone().into(),
        ]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            part_one: values.take("part_one")?,
            part_two: values.take("part_two")?,
            note: values.take("note")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Word {
    key: String,
    count: i64,
}

impl Record for Word {
    fn definition() -> RecordDef {
        RecordDef::new("Word")
            .primary::<String>("key")
            .field::<i64>("count")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.key.clone().into(), self.count.into()]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            key: values.take("key")?,
            count: values.take("count")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Person {
    name: String,
}

impl Record for Person {
    fn definition() -> RecordDef {
        RecordDef::new("Person").field::<String>("name")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.name.clone().into()]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            name: values.take("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Pet {
    name: String,
    owner: Ref<Person>,
    favorite: Option<Ref<Word>>,
}

impl Record for Pet {
    fn definition() -> RecordDef {
        RecordDef::new("Pet")
            .field::<String>("name")
            .index::<Ref<Person>>("owner")
            .field::<Option<Ref<Word>>>("favorite")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.name.clone().into(),
            self.owner.clone().into(),
            self.favorite.clone().into(),
        ]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            name: values.take("name")?,
            owner: values.take("owner")?,
            favorite: values.take("favorite")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Friendship {
    a: Ref<Person>,
    b: Ref<Person>,
}

impl Record for Friendship {
    fn definition() -> RecordDef {
        RecordDef::new("Friendship")
            .field::<Ref<Person>>("a")
            .field::<Ref<Person>>("b")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.a.clone().into(), self.b.clone().into()]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            a: values.take("a")?,
            b: values.take("b")?,
        })
    }
}

/// User type stored as `#rrggbb` text.
#[derive(Debug, Clone, PartialEq)]
struct Rgb(u8, u8, u8);

impl FieldType for Rgb {
    fn kind() -> FieldKind {
        FieldKind::Type(DomainType::new("rgb"))
    }
}

impl FromValue for Rgb {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        value.into_custom()
    }
}

fn encode_rgb(color: &Rgb) -> Result<SqlValue, CodecError> {
    Ok(SqlValue::Text(format!(
        "#{:02x}{:02x}{:02x}",
        color.0, color.1, color.2
    )))
}

fn decode_rgb(stored: SqlValue) -> Result<Rgb, CodecError> {
    let malformed = |reason: &str| CodecError::Malformed {
        domain: "rgb".to_string(),
        reason: reason.to_string(),
    };
    let SqlValue::Text(text) = stored else {
        return Err(malformed("expected text"));
    };
    let hex = text
        .strip_prefix('#')
        .filter(|hex| hex.len() == 6)
        .ok_or_else(|| malformed(&text))?;
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| malformed(&text));
    Ok(Rgb(channel(0)?, channel(2)?, channel(4)?))
}

#[derive(Debug, Clone, PartialEq)]
struct Everything {
    text: String,
    blob: Vec<u8>,
    integer: i32,
    real: f64,
    flag: bool,
    day: NaiveDate,
    time: NaiveTime,
    moment: chrono::NaiveDateTime,
    path: PathBuf,
    maybe: Option<i64>,
    color: Rgb,
}

impl Record for Everything {
    fn definition() -> RecordDef {
        RecordDef::new("Everything")
            .field::<String>("text")
            .field::<Vec<u8>>("blob")
            .field::<i32>("integer")
            .field::<f64>("real")
            .field::<bool>("flag")
            .field::<NaiveDate>("day")
            .field::<NaiveTime>("time")
            .field::<chrono::NaiveDateTime>("moment")
            .field::<PathBuf>("path")
            .field::<Option<i64>>("maybe")
            .index::<Rgb>("color")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.text.clone().into(),
            self.blob.clone().into(),
            self.integer.into(),
            self.real.into(),
            self.flag.into(),
            self.day.into(),
            self.time.into(),
            self.moment.into(),
            self.path.clone().into(),
            self.maybe.into(),
            Value::custom(self.color.clone()),
        ]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            text: values.take("text")?,
            blob: values.take("blob")?,
            integer: values.take("integer")?,
            real: values.take("real")?,
            flag: values.take("flag")?,
            day: values.take("day")?,
            time: values.take("time")?,
            moment: values.take("moment")?,
            path: values.take("path")?,
            maybe: values.take("maybe")?,
            color: values.take("color")?,
        })
    }
}

/// Mirrors a reference to a table keyed by two columns.
#[derive(Debug, Clone, PartialEq)]
struct Holder {
    point: Ref<CompositeKey>,
    label: String,
}

impl Record for Holder {
    fn definition() -> RecordDef {
        RecordDef::new("Holder")
            .index::<Ref<CompositeKey>>("point")
            .field::<String>("label")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.point.clone().into(), self.label.clone().into()]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            point: values.take("point")?,
            label: values.take("label")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    required: f64,
    optional: Option<f64>,
}

impl Record for Reading {
    fn definition() -> RecordDef {
        RecordDef::new("Reading")
            .field::<f64>("required")
            .field::<Option<f64>>("optional")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.required.into(), self.optional.into()]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            required: values.take("required")?,
            optional: values.take("optional")?,
        })
    }
}

/// User type stored in four REAL columns.
#[derive(Debug, Clone, PartialEq)]
struct Color {
    r: f64,
    g: f64,
    b: f64,
    a: f64,
}

impl FieldType for Color {
    fn kind() -> FieldKind {
        FieldKind::Type(DomainType::new("color"))
    }
}

impl FromValue for Color {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        value.into_custom()
    }
}

fn encode_color(color: &Color) -> Result<Vec<SqlValue>, CodecError> {
    Ok([color.r, color.g, color.b, color.a]
        .into_iter()
        .map(SqlValue::Real)
        .collect())
}

fn decode_color(stored: Vec<SqlValue>) -> Result<Color, CodecError> {
    let channels = stored
        .into_iter()
        .map(|value| match value {
            SqlValue::Real(channel) => Ok(channel),
            other => Err(CodecError::Malformed {
                domain: "color".to_string(),
                reason: format!("unexpected {} column value", other.kind()),
            }),
        })
        .collect::<Result<Vec<f64>, _>>()?;
    match channels.as_slice() {
        &[r, g, b, a] => Ok(Color { r, g, b, a }),
        _ => Err(CodecError::Malformed {
            domain: "color".to_string(),
            reason: "expected four channels".to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Paint {
    name: String,
    color: Color,
    trim: Option<Color>,
}

impl Record for Paint {
    fn definition() -> RecordDef {
        RecordDef::new("Paint")
            .unique::<String>("name")
            .index::<Color>("color")
            .field::<Option<Color>>("trim")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.name.clone().into(),
            Value::custom(self.color.clone()),
            self.trim.clone().map_or(Value::Null, Value::custom),
        ]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Self {
            name: values.take("name")?,
            color: values.take("color")?,
            trim: values.take("trim")?,
        })
    }
}

/// Registry with every test table, referenced tables first.
fn registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry
        .register_type("rgb", "TEXT", encode_rgb, decode_rgb)
        .unwrap();
    registry.register_table::<NamedPoint>().unwrap();
    registry.register_table::<CompositeKey>().unwrap();
    registry.register_table::<Word>().unwrap();
    registry.register_table::<Person>().unwrap();
    registry.register_table::<Pet>().unwrap();
    registry.register_table::<Friendship>().unwrap();
    registry.register_table::<Everything>().unwrap();
    registry.register_table::<Holder>().unwrap();
    registry.register_table::<Reading>().unwrap();
    registry
        .register_columns(
            "color",
            &["REAL", "REAL", "REAL", "REAL"],
            encode_color,
            decode_color,
        )
        .unwrap();
    registry.register_table::<Paint>().unwrap();
    Arc::new(registry)
}

fn open_db() -> Database {
    Database::open_in_memory(registry()).unwrap()
}

fn insert<T: Record>(db: &Database, record: T) -> Instance<T> {
    let mut instance = Instance::new(record);
    instance.insert(db).unwrap();
    instance
}

fn seed_points(db: &Database) {
    for (x, y) in [(1, 1), (2, 5), (3, 4), (4, 6), (5, 2)] {
        insert(db, NamedPoint::new(x, y, &format!("p{x}")));
    }
}

fn xs(points: Vec<Instance<NamedPoint>>) -> Vec<i64> {
    let mut xs: Vec<i64> = points.iter().map(|p| p.x).collect();
    xs.sort_unstable();
    xs
}

// ============================================================================
// End-to-end scenario
// ============================================================================

#[test]
fn test_end_to_end_named_point() {
    let db = open_db();

    let mut first = Instance::new(NamedPoint::new(1, 0, "a"));
    let identity = first.insert(&db).unwrap();
    assert_eq!(identity, Identity::RowId(1));

    let err = Instance::new(NamedPoint::new(2, 0, "a"))
        .insert(&db)
        .unwrap_err();
    assert!(err.is_constraint_violation(), "unexpected error: {err}");
    assert_eq!(db.count::<NamedPoint>().unwrap(), 1);

    first.x = 2;
    assert_eq!(first.commit(&db).unwrap(), 1);
    let stored = db
        .query::<NamedPoint>()
        .unwrap()
        .filter("rowid", 1)
        .unwrap()
        .first()
        .unwrap();
    assert_eq!(stored.x, 2);

    assert_eq!(first.delete(&db).unwrap(), 1);
    assert_eq!(db.count::<NamedPoint>().unwrap(), 0);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_insert_then_query_by_identity() {
    let db = open_db();
    let point = insert(&db, NamedPoint::new(7, 8, "seven"));
    let rowid = point.rowid().unwrap();

    let loaded = db.get::<NamedPoint>(rowid).unwrap().unwrap();
    assert_eq!(*loaded, NamedPoint::new(7, 8, "seven"));
    assert_eq!(loaded.identity(), point.identity());
    assert!(loaded.is_persisted());
    assert!(db.get::<NamedPoint>(rowid + 1).unwrap().is_none());
}

#[test]
fn test_unique_violation_rolls_back() {
    let db = open_db();
    insert(&db, NamedPoint::new(1, 1, "same"));

    let mut duplicate = Instance::new(NamedPoint::new(2, 2, "same"));
    let err = duplicate.insert(&db).unwrap_err();
    assert!(matches!(
        err,
        StoreError::ConstraintViolation { ref table, .. } if table == "NamedPoint"
    ));
    assert_eq!(duplicate.state(), &RecordState::Unpersisted);
    assert_eq!(db.count::<NamedPoint>().unwrap(), 1);

    duplicate.name = "other".into();
    duplicate.insert(&db).unwrap();
    assert_eq!(db.count::<NamedPoint>().unwrap(), 2);
}

#[test]
fn test_commit_violation_keeps_memory_values() {
    let db = open_db();
    insert(&db, NamedPoint::new(1, 1, "taken"));
    let mut point = insert(&db, NamedPoint::new(2, 2, "free"));

    point.name = "taken".into();
    point.y = 99;
    let err = point.commit(&db).unwrap_err();
    assert!(err.is_constraint_violation());

    assert_eq!(point.name, "taken");
    assert_eq!(point.y, 99);
    let stored = db.get::<NamedPoint>(point.rowid().unwrap()).unwrap().unwrap();
    assert_eq!(*stored, NamedPoint::new(2, 2, "free"));
}

#[test]
fn test_lifecycle_misuse() {
    let db = open_db();
    let mut point = Instance::new(NamedPoint::new(1, 1, "a"));
    assert!(matches!(
        point.commit(&db),
        Err(StoreError::NotPersisted { .. })
    ));
    assert!(matches!(
        point.delete(&db),
        Err(StoreError::NotPersisted { .. })
    ));

    point.insert(&db).unwrap();
    assert!(matches!(
        point.insert(&db),
        Err(StoreError::AlreadyPersisted { .. })
    ));
    assert_eq!(db.count::<NamedPoint>().unwrap(), 1);
}

#[test]
fn test_stale_identity_reports_zero_rows() {
    let db = open_db();
    let mut point = insert(&db, NamedPoint::new(1, 1, "a"));
    let identity = point.identity().cloned().unwrap();

    assert_eq!(point.delete(&db).unwrap(), 1);
    assert_eq!(point.state(), &RecordState::Deleted(identity.clone()));
    assert_eq!(point.identity(), Some(&identity));

    assert_eq!(point.delete(&db).unwrap(), 0);
    point.x = 10;
    assert_eq!(point.commit(&db).unwrap(), 0);
    assert_eq!(db.delete_by_identity::<NamedPoint>(identity).unwrap(), 0);
    assert_eq!(db.count::<NamedPoint>().unwrap(), 0);
}

#[test]
fn test_codec_error_before_any_write() {
    struct Strict {
        value: Option<i64>,
    }

    impl Record for Strict {
        fn definition() -> RecordDef {
            RecordDef::new("Strict").field::<i64>("value")
        }

        fn to_values(&self) -> Vec<Value> {
            vec![self.value.into()]
        }

        fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
            Ok(Self {
                value: values.take("value")?,
            })
        }
    }

    let mut registry = Registry::new();
    registry.register_table::<Strict>().unwrap();
    let db = Database::open_in_memory(Arc::new(registry)).unwrap();

    let mut strict = Instance::new(Strict { value: None });
    assert!(matches!(
        strict.insert(&db),
        Err(StoreError::CodecError(CodecError::UnexpectedNull(_)))
    ));
    assert_eq!(db.count::<Strict>().unwrap(), 0);

    strict.value = Some(3);
    strict.insert(&db).unwrap();
    assert_eq!(db.all::<Strict>().unwrap()[0].value, Some(3));
}

#[test]
fn test_writes_join_caller_transaction() {
    let db = open_db();
    {
        let tx = db.connection().unchecked_transaction().unwrap();
        insert(&db, NamedPoint::new(1, 1, "a"));
        insert(&db, NamedPoint::new(2, 2, "b"));
        assert_eq!(db.count::<NamedPoint>().unwrap(), 2);
        tx.rollback().unwrap();
    }
    assert_eq!(db.count::<NamedPoint>().unwrap(), 0);

    {
        let tx = db.connection().unchecked_transaction().unwrap();
        insert(&db, NamedPoint::new(3, 3, "c"));
        tx.commit().unwrap();
    }
    assert_eq!(db.count::<NamedPoint>().unwrap(), 1);
}

#[test]
fn test_lazy_ddl_rolled_back_with_caller_transaction() {
    let config = StoreConfig {
        create_tables: false,
        ..StoreConfig::in_memory()
    };
    let db = Database::open(&config, registry()).unwrap();
    {
        let tx = db.connection().unchecked_transaction().unwrap();
        insert(&db, NamedPoint::new(1, 1, "a"));
        tx.rollback().unwrap();
    }
    assert!(!db.status().unwrap()[0].exists);

    insert(&db, NamedPoint::new(2, 2, "b"));
    assert_eq!(db.count::<NamedPoint>().unwrap(), 1);
}

#[test]
fn test_insert_predefined_rowid() {
    let db = open_db();
    let mut point = Instance::new(NamedPoint::new(1, 2, "seven"));
    assert_eq!(point.insert_with_rowid(&db, 7).unwrap(), Identity::RowId(7));
    assert_eq!(point.rowid(), Some(7));

    let all = db.all::<NamedPoint>().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].rowid(), Some(7));
    assert_eq!(insert(&db, NamedPoint::new(3, 4, "eight")).rowid(), Some(8));
}

#[test]
fn test_cannot_insert_same_rowid() {
    let db = open_db();
    Instance::new(NamedPoint::new(1, 1, "first"))
        .insert_with_rowid(&db, 1)
        .unwrap();

    let mut second = Instance::new(NamedPoint::new(2, 2, "second"));
    let err = second.insert_with_rowid(&db, 1).unwrap_err();
    assert!(err.is_constraint_violation(), "unexpected error: {err}");
    assert_eq!(second.state(), &RecordState::Unpersisted);
    assert_eq!(db.count::<NamedPoint>().unwrap(), 1);

    let err = Instance::new(Word {
        key: "w".into(),
        count: 0,
    })
    .insert_with_rowid(&db, 1)
    .unwrap_err();
    assert!(matches!(
        err,
        StoreError::SchemaError(SchemaError::IdentityMismatch(_))
    ));
    assert_eq!(db.count::<Word>().unwrap(), 0);
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_empty_query_matches_all_rows() {
    let db = open_db();
    seed_points(&db);

    let query = db.query::<NamedPoint>().unwrap();
    assert_eq!(query.count().unwrap(), 5);
    assert_eq!(query.fetch().unwrap().len(), 5);
    assert_eq!(db.all::<NamedPoint>().unwrap().len(), 5);
    assert_eq!(db.count::<NamedPoint>().unwrap(), 5);
}

#[test]
fn test_comparators_compose_conjunctively() {
    let db = open_db();
    seed_points(&db);

    let query = db
        .query::<NamedPoint>()
        .unwrap()
        .filter("x", gt(2))
        .unwrap()
        .filter("y", le(5))
        .unwrap();
    assert_eq!(query.count().unwrap(), 2);
    assert_eq!(xs(query.fetch().unwrap()), vec![3, 5]);

    let cases = [
        (lt(3), vec![1, 2]),
        (le(3), vec![1, 2, 3]),
        (eq(3), vec![3]),
        (ne(3), vec![1, 2, 4, 5]),
        (ge(3), vec![3, 4, 5]),
        (gt(3), vec![4, 5]),
    ];
    for (comparator, expected) in cases {
        let found = db
            .query::<NamedPoint>()
            .unwrap()
            .filter("x", comparator)
            .unwrap()
            .fetch()
            .unwrap();
        assert_eq!(xs(found), expected);
    }
}

#[test]
fn test_raw_value_equals_eq() {
    let db = open_db();
    seed_points(&db);

    let raw = db.query::<NamedPoint>().unwrap().filter("name", "p4").unwrap();
    let explicit = db
        .query::<NamedPoint>()
        .unwrap()
        .filter("name", eq("p4"))
        .unwrap();
    assert_eq!(raw.sql(), explicit.sql());
    assert_eq!(raw.one().unwrap().x, 4);
    assert_eq!(explicit.one().unwrap().x, 4);
}

#[test]
fn test_query_construction_errors() {
    let db = open_db();
    let err = db
        .query::<NamedPoint>()
        .unwrap()
        .filter("z", 1)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        StoreError::SchemaError(SchemaError::UnknownField { .. })
    ));

    let err = db
        .query::<NamedPoint>()
        .unwrap()
        .filter("x", gt(1))
        .unwrap()
        .filter("x", lt(3))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        StoreError::SchemaError(SchemaError::DuplicateQueryField { .. })
    ));

    let err = db
        .query::<NamedPoint>()
        .unwrap()
        .filter("x", "one")
        .err()
        .unwrap();
    assert!(matches!(
        err,
        StoreError::CodecError(CodecError::TypeMismatch { .. })
    ));
}

#[test]
fn test_delete_by_query() {
    let db = open_db();
    seed_points(&db);

    let removed = db
        .query::<NamedPoint>()
        .unwrap()
        .filter("y", ge(5))
        .unwrap()
        .delete()
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(xs(db.all::<NamedPoint>().unwrap()), vec![1, 3, 5]);
}

#[test]
fn test_first_one_and_limit() {
    let db = open_db();
    assert!(matches!(
        db.query::<NamedPoint>().unwrap().first(),
        Err(StoreError::NoRows { .. })
    ));

    seed_points(&db);
    let all = db.query::<NamedPoint>().unwrap();
    assert!(all.first().is_ok());
    assert!(matches!(all.one(), Err(StoreError::MultipleRows { .. })));
    assert_eq!(all.clone().limit(3).fetch().unwrap().len(), 3);
    assert!(all.clone().limit(3).sql().ends_with("LIMIT ?"));

    let none = db.query::<NamedPoint>().unwrap().filter("x", 100).unwrap();
    assert!(matches!(none.one(), Err(StoreError::NoRows { .. })));
}

#[test]
fn test_lazy_iteration() {
    let db = open_db();
    seed_points(&db);

    let query = db.query::<NamedPoint>().unwrap().filter("x", ge(2)).unwrap();
    let mut selection = query.prepare().unwrap();

    let mut rows = selection.iter().unwrap();
    let first = rows.next().unwrap().unwrap();
    assert!(first.x >= 2);
    drop(rows);

    // each iteration runs the statement again
    assert_eq!(selection.iter().unwrap().count(), 4);
    assert_eq!(selection.iter().unwrap().count(), 4);
}

#[test]
fn test_null_comparisons() {
    let db = open_db();
    insert(
        &db,
        CompositeKey {
            part_one: 1,
            part_two: "a".into(),
            note: None,
        },
    );
    insert(
        &db,
        CompositeKey {
            part_one: 2,
            part_two: "b".into(),
            note: Some("hello".into()),
        },
    );

    let unset = db
        .query::<CompositeKey>()
        .unwrap()
        .filter("note", None::<String>)
        .unwrap()
        .one()
        .unwrap();
    assert_eq!(unset.part_one, 1);

    let set = db
        .query::<CompositeKey>()
        .unwrap()
        .filter("note", ne(Value::Null))
        .unwrap()
        .one()
        .unwrap();
    assert_eq!(set.part_one, 2);
}

// ============================================================================
// Tables without rowid
// ============================================================================

#[test]
fn test_composite_primary_key() {
    let db = open_db();
    let mut row = insert(
        &db,
        CompositeKey {
            part_one: 1,
            part_two: "x".into(),
            note: None,
        },
    );
    let key = Identity::Key(vec![SqlValue::Integer(1), SqlValue::Text("x".into())]);
    assert_eq!(row.identity(), Some(&key));
    assert_eq!(row.rowid(), None);

    row.note = Some("updated".into());
    assert_eq!(row.commit(&db).unwrap(), 1);
    let loaded = db.get::<CompositeKey>(key.clone()).unwrap().unwrap();
    assert_eq!(loaded.note.as_deref(), Some("updated"));

    let err = Instance::new(CompositeKey {
        part_one: 1,
        part_two: "x".into(),
        note: Some("dup".into()),
    })
    .insert(&db)
    .unwrap_err();
    assert!(err.is_constraint_violation());

    insert(
        &db,
        CompositeKey {
            part_one: 1,
            part_two: "y".into(),
            note: None,
        },
    );
    assert_eq!(db.count::<CompositeKey>().unwrap(), 2);

    assert!(matches!(
        db.query::<CompositeKey>().unwrap().filter("rowid", 1),
        Err(StoreError::SchemaError(SchemaError::UnknownField { .. }))
    ));
    assert!(matches!(
        db.get::<CompositeKey>(1),
        Err(StoreError::SchemaError(SchemaError::IdentityMismatch(_)))
    ));

    assert_eq!(db.delete_by_identity::<CompositeKey>(key).unwrap(), 1);
    assert_eq!(db.count::<CompositeKey>().unwrap(), 1);
}

// ============================================================================
// References
// ============================================================================

#[test]
fn test_references_and_related_queries() {
    let db = open_db();
    let alice = insert(&db, Person { name: "alice".into() });
    let bob = insert(&db, Person { name: "bob".into() });
    let bone = insert(
        &db,
        Word {
            key: "bone".into(),
            count: 1,
        },
    );

    for (name, owner) in [("rex", &alice), ("tom", &alice), ("fido", &bob)] {
        insert(
            &db,
            Pet {
                name: name.into(),
                owner: owner.reference().unwrap(),
                favorite: bone.reference(),
            },
        );
    }

    let pets = db.related::<Pet, Person>(&alice).unwrap();
    assert_eq!(pets.count().unwrap(), 2);
    let fido = db.related::<Pet, Person>(&bob).unwrap().one().unwrap();
    assert_eq!(fido.name, "fido");

    let owner = db.resolve(&fido.owner).unwrap();
    assert_eq!(owner.name, "bob");
    let favorite = db.resolve(fido.favorite.as_ref().unwrap()).unwrap();
    assert_eq!(favorite.key, "bone");

    let by_word = db
        .query::<Pet>()
        .unwrap()
        .filter("favorite", bone.reference().unwrap())
        .unwrap();
    assert_eq!(by_word.count().unwrap(), 3);
}

#[test]
fn test_relation_errors() {
    let db = open_db();
    let alice = insert(&db, Person { name: "alice".into() });

    assert!(matches!(
        db.related::<Friendship, Person>(&alice),
        Err(StoreError::SchemaError(SchemaError::AmbiguousRelation { .. }))
    ));
    assert!(matches!(
        db.related::<NamedPoint, Person>(&alice),
        Err(StoreError::SchemaError(SchemaError::NoRelation { .. }))
    ));
    assert!(matches!(
        db.related_by::<Pet, Person>(&alice, "name"),
        Err(StoreError::SchemaError(SchemaError::RelationMismatch { .. }))
    ));

    let bob = insert(&db, Person { name: "bob".into() });
    insert(
        &db,
        Friendship {
            a: alice.reference().unwrap(),
            b: bob.reference().unwrap(),
        },
    );
    assert_eq!(
        db.related_by::<Friendship, Person>(&alice, "a")
            .unwrap()
            .count()
            .unwrap(),
        1
    );
    assert_eq!(
        db.related_by::<Friendship, Person>(&alice, "b")
            .unwrap()
            .count()
            .unwrap(),
        0
    );

    let ghost = Instance::new(Person { name: "ghost".into() });
    assert!(matches!(
        db.related::<Pet, Person>(&ghost),
        Err(StoreError::NotPersisted { .. })
    ));
}

#[test]
fn test_resolve_deleted_reference() {
    let db = open_db();
    let mut carol = insert(&db, Person { name: "carol".into() });
    let reference = carol.reference().unwrap();
    carol.delete(&db).unwrap();
    assert!(matches!(
        db.resolve(&reference),
        Err(StoreError::NoRows { .. })
    ));
}

#[test]
fn test_reference_to_composite_key() {
    let db = open_db();
    let key = insert(
        &db,
        CompositeKey {
            part_one: 1,
            part_two: "x".into(),
            note: Some("target".into()),
        },
    );
    let other = insert(
        &db,
        CompositeKey {
            part_one: 1,
            part_two: "y".into(),
            note: None,
        },
    );
    let holder = insert(
        &db,
        Holder {
            point: key.reference().unwrap(),
            label: "held".into(),
        },
    );

    let loaded = db.get::<Holder>(holder.rowid().unwrap()).unwrap().unwrap();
    assert_eq!(*loaded, *holder);
    assert_eq!(loaded.point.identity(), key.identity().unwrap());
    assert_eq!(db.resolve(&loaded.point).unwrap().note.as_deref(), Some("target"));

    let raw: (i64, String) = db
        .connection()
        .query_row(
            "SELECT \"point_part_one\", \"point_part_two\" FROM \"Holder\"",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(raw, (1, "x".into()));

    assert_eq!(db.related::<Holder, CompositeKey>(&key).unwrap().count().unwrap(), 1);
    assert_eq!(db.related::<Holder, CompositeKey>(&other).unwrap().count().unwrap(), 0);
    let found = db
        .query::<Holder>()
        .unwrap()
        .filter("point", key.reference().unwrap())
        .unwrap()
        .one()
        .unwrap();
    assert_eq!(found.label, "held");
}

#[test]
fn test_composite_reference_enforced_by_foreign_keys() {
    let config = StoreConfig {
        foreign_keys: true,
        ..StoreConfig::in_memory()
    };
    let db = Database::open(&config, registry()).unwrap();
    let dangling = Ref::new(Identity::Key(vec![
        SqlValue::Integer(9),
        SqlValue::Text("nowhere".into()),
    ]));
    let err = Instance::new(Holder {
        point: dangling,
        label: "lost".into(),
    })
    .insert(&db)
    .unwrap_err();
    assert!(err.is_constraint_violation(), "unexpected error: {err}");

    let short = Ref::new(Identity::Key(vec![SqlValue::Integer(9)]));
    assert!(matches!(
        Instance::new(Holder {
            point: short,
            label: "short".into(),
        })
        .insert(&db),
        Err(StoreError::SchemaError(SchemaError::IdentityMismatch(_)))
    ));
    assert_eq!(db.count::<Holder>().unwrap(), 0);
}

// ============================================================================
// Datatypes
// ============================================================================

fn everything() -> Everything {
    let day = NaiveDate::from_ymd_opt(2021, 1, 9).unwrap();
    let time = NaiveTime::from_hms_micro_opt(7, 20, 0, 250).unwrap();
    Everything {
        text: "string".into(),
        blob: b"bytes\x00\xff".to_vec(),
        integer: -42,
        real: 42.1,
        flag: true,
        day,
        time,
        moment: day.and_time(time),
        path: PathBuf::from("/var/www/"),
        maybe: None,
        color: Rgb(255, 128, 0),
    }
}

#[test]
fn test_datatypes_round_trip() {
    let db = open_db();
    let original = everything();
    let stored = insert(&db, original.clone());

    let loaded = db.get::<Everything>(stored.rowid().unwrap()).unwrap().unwrap();
    assert_eq!(loaded.into_inner(), original);

    let raw: (String, String, i64) = db
        .connection()
        .query_row(
            "SELECT \"day\", \"color\", \"flag\" FROM \"Everything\"",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(raw, ("2021-01-09".into(), "#ff8000".into(), 1));
}

#[test]
fn test_query_by_custom_and_temporal_values() {
    let db = open_db();
    insert(&db, everything());
    insert(
        &db,
        Everything {
            color: Rgb(0, 0, 0),
            day: NaiveDate::from_ymd_opt(2022, 6, 1).unwrap(),
            maybe: Some(5),
            ..everything()
        },
    );

    let orange = db
        .query::<Everything>()
        .unwrap()
        .filter("color", Value::custom(Rgb(255, 128, 0)))
        .unwrap();
    assert_eq!(orange.count().unwrap(), 1);

    let later = db
        .query::<Everything>()
        .unwrap()
        .filter("day", gt(NaiveDate::from_ymd_opt(2021, 12, 31).unwrap()))
        .unwrap()
        .one()
        .unwrap();
    assert_eq!(later.maybe, Some(5));
}

#[test]
fn test_nan_rejected_before_write() {
    let db = open_db();
    for reading in [
        Reading {
            required: f64::NAN,
            optional: None,
        },
        Reading {
            required: 1.0,
            optional: Some(f64::NAN),
        },
    ] {
        let err = Instance::new(reading).insert(&db).unwrap_err();
        assert!(
            matches!(err, StoreError::CodecError(CodecError::OutOfDomain { .. })),
            "unexpected error: {err}"
        );
    }
    assert_eq!(db.count::<Reading>().unwrap(), 0);

    assert!(matches!(
        db.query::<Reading>().unwrap().filter("required", f64::NAN),
        Err(StoreError::CodecError(CodecError::OutOfDomain { .. }))
    ));

    let stored = insert(
        &db,
        Reading {
            required: 2.5,
            optional: None,
        },
    );
    let loaded = db.get::<Reading>(stored.rowid().unwrap()).unwrap().unwrap();
    assert_eq!(loaded.required, 2.5);
    assert_eq!(loaded.optional, None);
}

fn paint(name: &str, r: f64, trim: Option<Color>) -> Paint {
    Paint {
        name: name.to_string(),
        color: Color {
            r,
            g: 0.25,
            b: 0.0,
            a: 0.5,
        },
        trim,
    }
}

#[test]
fn test_multi_column_type_round_trip() {
    let db = open_db();
    let white = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    let plain = insert(&db, paint("plain", 1.0, None));
    let trimmed = insert(&db, paint("trimmed", 0.75, Some(white.clone())));

    let loaded = db.get::<Paint>(trimmed.rowid().unwrap()).unwrap().unwrap();
    assert_eq!(loaded.into_inner(), paint("trimmed", 0.75, Some(white)));
    let loaded = db.get::<Paint>(plain.rowid().unwrap()).unwrap().unwrap();
    assert_eq!(loaded.trim, None);

    let raw: (f64, f64, Option<f64>) = db
        .connection()
        .query_row(
            "SELECT \"color_0\", \"color_3\", \"trim_0\" FROM \"Paint\" WHERE \"name\" = 'plain'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(raw, (1.0, 0.5, None));

    let by_color = db
        .query::<Paint>()
        .unwrap()
        .filter("color", Value::custom(paint("", 0.75, None).color))
        .unwrap()
        .one()
        .unwrap();
    assert_eq!(by_color.name, "trimmed");

    let untrimmed = db
        .query::<Paint>()
        .unwrap()
        .filter("trim", Value::Null)
        .unwrap()
        .one()
        .unwrap();
    assert_eq!(untrimmed.name, "plain");
}

// ============================================================================
// DDL and configuration
// ============================================================================

#[test]
fn test_ddl_is_idempotent_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("points.db"));

    let first = Database::open(&config, registry()).unwrap();
    insert(&first, NamedPoint::new(1, 2, "shared"));

    let second = Database::open(&config, registry()).unwrap();
    second.setup().unwrap();
    assert_eq!(second.count::<NamedPoint>().unwrap(), 1);
    assert_eq!(
        second
            .query::<NamedPoint>()
            .unwrap()
            .filter("name", "shared")
            .unwrap()
            .one()
            .unwrap()
            .y,
        2
    );
}

#[test]
fn test_tables_created_lazily_when_configured() {
    let config = StoreConfig {
        create_tables: false,
        ..StoreConfig::in_memory()
    };
    let db = Database::open(&config, registry()).unwrap();

    let status = db.status().unwrap();
    assert_eq!(status.len(), 10);
    assert!(status.iter().all(|table| !table.exists));

    insert(&db, NamedPoint::new(1, 1, "a"));
    let status = db.status().unwrap();
    assert_eq!(
        status[0],
        TableStatus {
            table: "NamedPoint".into(),
            exists: true,
            rows: 1,
        }
    );
    assert!(!status[1].exists);
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("store.yaml");
    std::fs::write(
        &config_path,
        format!(
            "path: {}\nforeign_keys: true\nbusy_timeout_ms: 100\n",
            dir.path().join("app.db").display()
        ),
    )
    .unwrap();

    let config = StoreConfig::load(&config_path).unwrap();
    assert!(config.foreign_keys);
    assert!(config.create_tables);

    let db = Database::open(&config, registry()).unwrap();
    assert!(db.status().unwrap().iter().all(|table| table.exists));

    let orphan = Instance::new(Pet {
        name: "stray".into(),
        owner: Ref::new(Identity::RowId(404)),
        favorite: None,
    })
    .insert(&db)
    .unwrap_err();
    assert!(orphan.is_constraint_violation());
}
