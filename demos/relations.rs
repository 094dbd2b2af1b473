//! Records that reference other records.
//!
//! A `Child` row points at its `Parent` through a `Ref` field. Related rows
//! are queried from the parent, and references resolve back to the parent.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p rowbind-demos --example relations
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use rowbind_core::{CodecError, FieldValues, Identity, Record, RecordDef, Ref, Registry, Value};
use rowbind_sqlite::{Database, Instance, StoreConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Parent {
    name: String,
}

impl Record for Parent {
    fn definition() -> RecordDef {
        RecordDef::new("Parent").unique::<String>("name")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.name.clone().into()]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Parent {
            name: values.take("name")?,
        })
    }
}

#[derive(Debug, Clone)]
struct Child {
    parent: Ref<Parent>,
    born: NaiveDate,
}

impl Record for Child {
    fn definition() -> RecordDef {
        RecordDef::new("Child")
            .index::<Ref<Parent>>("parent")
            .field::<NaiveDate>("born")
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.parent.clone().into(), self.born.into()]
    }

    fn from_values(values: &mut FieldValues) -> Result<Self, CodecError> {
        Ok(Child {
            parent: values.take("parent")?,
            born: values.take("born")?,
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut registry = Registry::new();
    registry.register_table::<Parent>().unwrap();
    registry.register_table::<Child>().unwrap();

    let config = StoreConfig {
        foreign_keys: true,
        ..StoreConfig::in_memory()
    };
    let db = Database::open(&config, Arc::new(registry)).unwrap();

    let mut parent = Instance::new(Parent { name: "Ada".into() });
    parent.insert(&db).unwrap();

    for day in 1..=3 {
        Instance::new(Child {
            parent: parent.reference().unwrap(),
            born: NaiveDate::from_ymd_opt(2020, 5, day).unwrap(),
        })
        .insert(&db)
        .unwrap();
    }

    let children = db.related::<Child, Parent>(&parent).unwrap();
    println!("{} has {} children", parent.name, children.count().unwrap());
    for child in children.fetch().unwrap() {
        let resolved = db.resolve(&child.parent).unwrap();
        println!("  born {} to {}", child.born, resolved.name);
    }

    // With foreign keys on, a reference to a missing row is rejected.
    let orphan = Instance::new(Child {
        parent: Ref::new(Identity::RowId(99)),
        born: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
    })
    .insert(&db);
    if let Err(err) = orphan {
        println!("Orphan rejected: {err}");
    }

    let removed = db.related::<Child, Parent>(&parent).unwrap().delete().unwrap();
    println!("Removed {removed} children");
}
