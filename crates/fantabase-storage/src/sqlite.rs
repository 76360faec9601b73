use rusqlite::OptionalExtension;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use fantabase_core::error::FantabaseError;

use crate::store::{KeyValueStore, MemoryStore};

pub const WIDGET_DB_FILE: &str = "widget.db";

/// SQLite-backed [`KeyValueStore`]. Several processes may open the same file;
/// WAL mode keeps their reads and writes from blocking each other.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn open(data_dir: &str) -> Result<Self, FantabaseError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = Path::new(data_dir).join(WIDGET_DB_FILE);
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, FantabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, FantabaseError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, FantabaseError> {
        let conn = self.lock_conn();
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), FantabaseError> {
        let conn = self.lock_conn();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), FantabaseError> {
        let conn = self.lock_conn();
        conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// Open the widget store under `data_dir`. When the directory or database is
/// unusable the session runs on a [`MemoryStore`] and nothing persists.
pub fn open_or_memory(data_dir: &str) -> Arc<dyn KeyValueStore> {
    match SqliteStore::open(data_dir) {
        Ok(store) => {
            info!("Widget store opened in {}", data_dir);
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "widget store unavailable in {}: {}; continuing without persistence",
                data_dir, e
            );
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("fantabase_store_test_{}", uuid::Uuid::new_v4()))
    }

    fn cleanup(dir: &Path) {
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_in_memory_set_get_overwrite_remove() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "1").unwrap();
        store.set("k", "2").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("2".to_string()));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.remove("nope").unwrap();
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = test_dir();
        let dir_str = dir.to_str().unwrap().to_string();
        {
            let store = SqliteStore::open(&dir_str).unwrap();
            store.set("fantabase_demo_remaining_messages", "3").unwrap();
        }
        let reopened = SqliteStore::open(&dir_str).unwrap();
        assert_eq!(
            reopened.get("fantabase_demo_remaining_messages").unwrap(),
            Some("3".to_string())
        );
        assert!(dir.join(WIDGET_DB_FILE).exists());
        cleanup(&dir);
    }

    #[test]
    fn test_open_or_memory_falls_back_when_dir_unusable() {
        let dir = test_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();
        let data_dir = blocker.join("data");

        assert!(SqliteStore::open(&data_dir.to_string_lossy()).is_err());
        let store = open_or_memory(&data_dir.to_string_lossy());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        assert!(!data_dir.exists());
        cleanup(&dir);
    }

    #[test]
    fn test_open_or_memory_persists_when_dir_usable() {
        let dir = test_dir();
        open_or_memory(&dir.to_string_lossy()).set("k", "v").unwrap();
        let reopened = open_or_memory(&dir.to_string_lossy());
        assert_eq!(reopened.get("k").unwrap(), Some("v".to_string()));
        cleanup(&dir);
    }
}
