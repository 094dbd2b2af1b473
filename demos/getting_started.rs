//! Getting started with rowbind.
//!
//! Declares a record with a unique field, inserts a few rows, queries them
//! back, updates one and deletes another.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=rowbind_sqlite=debug cargo run -p rowbind-demos --example getting_started
//! ```

use std::sync::Arc;

use rowbind_core::{CodecError, FieldValues, Record, RecordDef, Registry, Value, gt};
use rowbind_sqlite::{Database, Instance};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct NamedPoint {
    x: i64,
    y: i64,
    name: String,
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
        Ok(NamedPoint {
            x: values.take("x")?,
            y: values.take("y")?,
            name: values.take("name")?,
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    // === Step 1: Register tables and open the database ===
    let mut registry = Registry::new();
    let schema = registry.register_table::<NamedPoint>().unwrap();
    for statement in schema.create_statements() {
        println!("{statement}");
    }
    let db = Database::open_in_memory(Arc::new(registry)).unwrap();

    // === Step 2: Insert ===
    println!("\n=== Insert ===");
    let mut basecamp = Instance::new(NamedPoint {
        x: 1,
        y: 2,
        name: "Basecamp".into(),
    });
    println!("{:?}", *basecamp);
    let identity = basecamp.insert(&db).unwrap();
    println!("Basecamp stored as {identity}");

    Instance::new(NamedPoint {
        x: 10,
        y: -7,
        name: "Goal".into(),
    })
    .insert(&db)
    .unwrap();

    let clash = Instance::new(NamedPoint {
        x: 0,
        y: 0,
        name: "Goal".into(),
    })
    .insert(&db);
    if let Err(err) = clash {
        println!("Second 'Goal' rejected: {err}");
    }

    // === Step 3: Query ===
    println!("\n=== Query ===");
    for point in db.all::<NamedPoint>().unwrap() {
        println!("{:?} at {}", *point, point.identity().unwrap());
    }
    let goal = db
        .query::<NamedPoint>()
        .unwrap()
        .filter("x", 10)
        .unwrap()
        .one()
        .unwrap();
    println!("x = 10: {:?}", *goal);

    let east = db.query::<NamedPoint>().unwrap().filter("x", gt(0)).unwrap();
    println!("{}", east.sql());
    println!("x > 0: {} rows", east.count().unwrap());

    // === Step 4: Update and delete ===
    println!("\n=== Update and delete ===");
    basecamp.y = 3;
    basecamp.commit(&db).unwrap();
    let reloaded = db.get::<NamedPoint>(basecamp.rowid().unwrap()).unwrap().unwrap();
    println!("Reloaded basecamp: {:?}", *reloaded);

    basecamp.delete(&db).unwrap();
    println!("Rows left: {}", db.count::<NamedPoint>().unwrap());

    for table in db.status().unwrap() {
        println!("{}: exists={} rows={}", table.table, table.exists, table.rows);
    }
}
