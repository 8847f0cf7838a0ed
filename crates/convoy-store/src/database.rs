//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] behind a mutex so
//! that one store handle can be shared by every participant client running in
//! the process, and guarantees that migrations are run before any other
//! operation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::changes::{ChangeFeed, StoreEvent};
use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`] plus the live change feed.
pub struct Database {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/convoy/convoy.db`
    /// - macOS:   `~/Library/Application Support/com.convoy.convoy/convoy.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\convoy\convoy\data\convoy.db`
    pub fn new() -> Result<Self> {
        let data_dir = Self::default_data_dir()?;
        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join("convoy.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Platform data directory shared by the database and the device identity.
    pub fn default_data_dir() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("com", "convoy", "convoy").ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs.data_dir().to_path_buf())
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory database.  Used by tests and demos.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Run schema migrations.
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            feed: ChangeFeed::new(),
        })
    }

    /// Lock and return the underlying `rusqlite::Connection`.
    ///
    /// Callers should prefer the typed CRUD helpers, but direct access is
    /// occasionally needed for transactions or ad-hoc queries.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// The feed committed writes are announced on.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Subscribe to live change-sets for every session in this store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    /// SQLite's `data_version` for this handle's connection.
    ///
    /// The value changes whenever another connection (in this process or
    /// another one) commits to the same file.  Commits made through this
    /// handle leave it unchanged; those are announced on [`Self::feed`].
    pub fn data_version(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.pragma_query_value(None, "data_version", |row| row.get(0))?)
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn()
            .ok()
            .and_then(|conn| conn.path().map(PathBuf::from))
    }
}
