//! Pluggable key/value storage for the transport's session material.
//!
//! The core never reads these keys itself; it only owns the store's lifetime
//! (created with the [`crate::Config`], released on [`crate::Courier::shutdown`]).
//!
//! Two built-in backends are provided:
//! * [`InMemoryStore`] — process-lifetime map (default).
//! * [`SqliteStore`] — SQLite (requires the `sqlite-session` Cargo feature).

use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

// ─── Trait ────────────────────────────────────────────────────────────────────

/// Opaque string key/value persistence.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove one key. Missing keys are not an error.
    fn delete(&self, key: &str) -> io::Result<()>;

    /// Remove every key.
    fn clear(&self) -> io::Result<()>;

    /// Called once on shutdown. Process-lifetime stores wipe themselves;
    /// durable ones override this to keep the session for the next run.
    fn release(&self) -> io::Result<()> {
        self.clear()
    }

    /// Human-readable name of this backend (for log messages).
    fn name(&self) -> &str;
}

// ─── InMemoryStore ────────────────────────────────────────────────────────────

/// An ephemeral store that keeps nothing beyond the process lifetime.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for InMemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> io::Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        self.lock().clear();
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}

// ─── SqliteStore ──────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite-session")]
pub use sqlite_backend::SqliteStore;

#[cfg(feature = "sqlite-session")]
mod sqlite_backend {
    use super::*;
    use std::path::PathBuf;
    use rusqlite::{Connection, OptionalExtension, params};

    fn to_io(e: rusqlite::Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, e)
    }

    /// SQLite-backed store with a single `kv` table.
    ///
    /// Enable with the `sqlite-session` Cargo feature:
    /// ```toml
    /// [dependencies]
    /// courier-client = { version = "*", features = ["sqlite-session"] }
    /// ```
    pub struct SqliteStore {
        path: PathBuf,
    }

    impl SqliteStore {
        pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
            let path = path.into();
            // Open and initialise the schema immediately so errors surface early.
            let conn = Connection::open(&path).map_err(to_io)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
            ).map_err(to_io)?;
            Ok(Self { path })
        }

        fn open(&self) -> io::Result<Connection> {
            Connection::open(&self.path).map_err(to_io)
        }
    }

    impl SessionStore for SqliteStore {
        fn get(&self, key: &str) -> io::Result<Option<String>> {
            self.open()?
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
                .map_err(to_io)
        }

        fn set(&self, key: &str, value: &str) -> io::Result<()> {
            self.open()?
                .execute("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)", params![key, value])
                .map_err(to_io)?;
            Ok(())
        }

        fn delete(&self, key: &str) -> io::Result<()> {
            self.open()?
                .execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(to_io)?;
            Ok(())
        }

        fn clear(&self) -> io::Result<()> {
            self.open()?.execute("DELETE FROM kv", []).map_err(to_io)?;
            Ok(())
        }

        /// The file outlives the process; nothing to drop.
        fn release(&self) -> io::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str { "sqlite" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_roundtrip_and_clear() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("dc").unwrap(), None);

        store.set("dc", "2").unwrap();
        store.set("auth_key", "abc").unwrap();
        assert_eq!(store.get("dc").unwrap().as_deref(), Some("2"));

        store.set("dc", "4").unwrap();
        assert_eq!(store.get("dc").unwrap().as_deref(), Some("4"));

        store.delete("dc").unwrap();
        store.delete("never-set").unwrap();
        assert_eq!(store.get("dc").unwrap(), None);
        assert_eq!(store.len(), 1);

        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn in_memory_release_wipes() {
        let store = InMemoryStore::new();
        store.set("auth_key", "abc").unwrap();
        store.release().unwrap();
        assert!(store.is_empty());
    }

    #[cfg(feature = "sqlite-session")]
    #[test]
    fn sqlite_roundtrip() {
        let path = std::env::temp_dir().join(format!("courier-kv-{}.db", std::process::id()));
        let store = SqliteStore::new(&path).unwrap();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        // Survives release and a reopen.
        store.release().unwrap();
        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.clear().unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        let _ = std::fs::remove_file(path);
    }
}
