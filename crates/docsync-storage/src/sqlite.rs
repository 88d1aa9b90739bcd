//! SQLite storage backend

use crate::{Storage, StorageError, StorageStats};
use async_trait::async_trait;
use docsync_core::{Content, DocumentId};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::warn;

/// SQLite storage backend
///
/// Embedded persistence suitable for single-node deployments.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(db_error)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
            );
            "#,
        )
        .map_err(db_error)?;

        Ok(())
    }
}

fn db_error(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn store(&self, id: &DocumentId, content: &Content) -> Result<(), StorageError> {
        let data = serde_json::to_string(content)?;
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO documents (id, data, updated_at)
            VALUES (?1, ?2, strftime('%s', 'now') * 1000)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![id.as_str(), data],
        )
        .map_err(db_error)?;

        Ok(())
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<Content>, StorageError> {
        let data: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT data FROM documents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?
        };

        match data {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &DocumentId) -> Result<bool, StorageError> {
        let conn = self.conn.lock();

        let affected = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id.as_str()])
            .map_err(db_error)?;

        Ok(affected > 0)
    }

    async fn list(&self) -> Result<Vec<DocumentId>, StorageError> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT id FROM documents ORDER BY id")
            .map_err(db_error)?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error)?;

        let mut ids = Vec::new();
        for row in rows {
            let raw = row.map_err(db_error)?;
            match DocumentId::new(raw.clone()) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(id = %raw, error = %e, "Skipping stored document with invalid ID"),
            }
        }

        Ok(ids)
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool, StorageError> {
        let conn = self.conn.lock();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .map_err(db_error)?;

        Ok(count > 0)
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        let conn = self.conn.lock();

        let document_count: usize = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(db_error)?;

        let total_size: usize = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM documents",
                [],
                |row| row.get(0),
            )
            .map_err(db_error)?;

        Ok(StorageStats {
            document_count,
            total_size_bytes: total_size,
        })
    }
}
