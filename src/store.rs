//! Per-run access to the SQLite store

use crate::config::DatabaseConfig;
use crate::error::{PipelineError, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Opens one connection per run. The connection closes when it is dropped,
/// so every exit path of a run releases it.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Store {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_millis(5_000),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(&config.path).with_busy_timeout(Duration::from_millis(config.busy_timeout_ms))
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a read-write connection. The database must already exist.
    pub fn connect(&self) -> Result<Connection> {
        let context = || format!("open {}", self.path.display());

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| PipelineError::Connectivity {
            context: context(),
            source,
        })?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|source| PipelineError::Connectivity {
                context: context(),
                source,
            })?;

        debug!(path = %self.path.display(), "Store connection opened");
        Ok(conn)
    }
}

/// Quote an SQL identifier. Source columns such as `emp.var.rate` need it.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
