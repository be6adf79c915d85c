//! SQLite-backed storage shared by all core components.
//!
//! One `Store` wraps one connection. Components borrow it for the duration of
//! a single request, import or scheduled task.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use super::error::CoreError;

/// Current schema version (stored in `PRAGMA user_version`)
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS libraries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    machine_name TEXT NOT NULL,
    title TEXT NOT NULL,
    major_version INTEGER NOT NULL,
    minor_version INTEGER NOT NULL,
    patch_version INTEGER NOT NULL,
    runnable INTEGER NOT NULL DEFAULT 0,
    restricted INTEGER NOT NULL DEFAULT 0,
    fullscreen INTEGER NOT NULL DEFAULT 0,
    embed_types TEXT NOT NULL DEFAULT '',
    semantics TEXT,
    preloaded_js TEXT,
    preloaded_css TEXT,
    UNIQUE (machine_name, major_version, minor_version)
);

CREATE TABLE IF NOT EXISTS library_dependencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    library_id INTEGER NOT NULL REFERENCES libraries(id),
    required_library_id INTEGER NOT NULL REFERENCES libraries(id),
    dependency_type TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_library_dependencies_unique_pair
    ON library_dependencies(library_id, required_library_id);

CREATE TABLE IF NOT EXISTS library_translations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    library_id INTEGER NOT NULL REFERENCES libraries(id),
    language_code TEXT NOT NULL,
    language_json TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_library_translations_language
    ON library_translations(library_id, language_code);

CREATE TABLE IF NOT EXISTS contents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    main_library_id INTEGER NOT NULL REFERENCES libraries(id),
    json_content TEXT NOT NULL,
    filtered TEXT NOT NULL DEFAULT '',
    embed_type TEXT NOT NULL DEFAULT 'div',
    authors TEXT,
    source TEXT,
    year_from INTEGER,
    year_to INTEGER,
    license TEXT,
    license_version TEXT,
    changes TEXT,
    license_extras TEXT,
    author_comments TEXT,
    default_language TEXT,
    a11y_title TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_contents_main_library ON contents(main_library_id);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    type TEXT NOT NULL,
    sub_type TEXT NOT NULL,
    content_id INTEGER,
    content_title TEXT,
    library_name TEXT,
    library_version TEXT
);
CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);

CREATE TABLE IF NOT EXISTS event_counters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    library_name TEXT NOT NULL,
    library_version TEXT NOT NULL,
    num INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS library_hub_cache (
    machine_name TEXT PRIMARY KEY,
    major_version INTEGER NOT NULL,
    minor_version INTEGER NOT NULL,
    patch_version INTEGER NOT NULL,
    fetched_at INTEGER NOT NULL
);
";

/// Relational store for libraries, contents and events
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a database file and apply the schema
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::init(conn)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, CoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Schema version stamped on the database
    pub fn schema_version(&self) -> Result<i64, CoreError> {
        let version = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Read a persisted setting
    pub fn setting(&self, name: &str) -> Result<Option<String>, CoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a persisted setting (insert or replace)
    pub fn set_setting(&self, name: &str, value: &str) -> Result<(), CoreError> {
        self.conn.execute(
            "INSERT INTO settings (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value],
        )?;
        Ok(())
    }
}
