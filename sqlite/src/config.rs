//! Store configuration.
//!
//! Describes where the database lives and how the connection is prepared.
//! Serialized as YAML.
//!
//! # Example YAML
//!
//! ```yaml
//! path: data/app.db
//! foreign_keys: false
//! create_tables: true
//! busy_timeout_ms: 5000
//! ```
//!
//! Every key is optional. Without `path` the database is in memory.

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

fn default_create_tables() -> bool {
    true
}

/// Connection settings for a [`Database`](crate::Database).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; `None` opens a private in-memory database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Enforce `REFERENCES` notes on reference columns.
    #[serde(default)]
    pub foreign_keys: bool,

    /// Create every registered table when the database is opened.
    #[serde(default = "default_create_tables")]
    pub create_tables: bool,

    /// How long a statement waits on a locked database, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            foreign_keys: false,
            create_tables: default_create_tables(),
            busy_timeout_ms: None,
        }
    }
}

impl StoreConfig {
    /// Configuration for an in-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Configuration for a database file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Opens a connection and applies the configured pragmas.
    pub fn open(&self) -> Result<Connection> {
        let conn = match &self.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(if self.foreign_keys {
            "PRAGMA foreign_keys = ON;"
        } else {
            "PRAGMA foreign_keys = OFF;"
        })?;
        if let Some(ms) = self.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }
        debug!(path = ?self.path, foreign_keys = self.foreign_keys, "opened connection");
        Ok(conn)
    }
}
