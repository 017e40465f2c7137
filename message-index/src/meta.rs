use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed key/value side table living next to the tantivy segments.
/// Holds internal bookkeeping only; nothing here is searchable.
pub(crate) struct MetaStore {
    conn: Connection,
}

impl MetaStore {
    pub(crate) fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> rusqlite::Result<()> {
        self.conn.pragma_update(None, "journal_mode", &"WAL")?;
        self.conn.pragma_update(None, "synchronous", &"FULL")?;
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub(crate) fn set(&self, key: &str, value: &[u8]) -> rusqlite::Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO index_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub(crate) fn get(&self, key: &str) -> rusqlite::Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    pub(crate) fn delete(&self, key: &str) -> rusqlite::Result<()> {
        self.conn.execute("DELETE FROM index_meta WHERE key = ?1", params![key])?;
        Ok(())
    }
}
