mod batch;
mod elastic;
mod history;
mod mapping;
mod queries;
mod schema;

pub use batch::{BulkIndexWriter, IndexBatch};
pub use elastic::ElasticIndex;
pub use history::{format_timestamp, now_utc, RunHistory, Timestamp};
pub use mapping::{commit_mapping, file_mapping, repo_mapping};

use std::sync::{Mutex, MutexGuard};

use repomirror_types::{IndexBackend, MirrorConfig, MirrorError, Result, SearchIndex};

/// SQLite-backed implementation of [`repomirror_types::SearchIndex`]. Documents
/// are stored as JSON and filtered with `json_extract`.
pub struct SqliteIndex {
    pub(crate) conn: Mutex<rusqlite::Connection>,
}

impl SqliteIndex {
    /// Open a persistent on-disk database at `path`.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init()?;
        Ok(index)
    }

    /// Open an in-memory database (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init()?;
        Ok(index)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| MirrorError::Index("sqlite connection lock poisoned".into()))
    }
}

/// Open the backend named in the configuration.
pub fn open_index(config: &MirrorConfig) -> Result<Box<dyn SearchIndex>> {
    match &config.index.backend {
        IndexBackend::Elasticsearch { host } => Ok(Box::new(ElasticIndex::new(
            host,
            config.hosting.timeout,
            config.retry,
        )?)),
        IndexBackend::Sqlite { path } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Ok(Box::new(SqliteIndex::open(path)?))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
