use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::auth::Session;
use crate::config::Config;
use crate::error::{BookError, Result};
use crate::page_cache::{CacheSnapshot, CachedPage};

pub const SEARCH_NAMESPACE: &str = "search";
pub const FAVORITES_NAMESPACE: &str = "favorites";
const SESSION_NAMESPACE: &str = "session";
const DB_FILE: &str = "book_atlas.db";

/// Durable home for page caches. Each namespace is independent.
pub trait CacheStore {
    fn save(&self, namespace: &str, snapshot: &CacheSnapshot) -> Result<()>;

    /// `None` when nothing is stored or what is stored no longer parses.
    fn load(&self, namespace: &str) -> Option<CacheSnapshot>;
}

// Extra view state stored next to the pages
#[derive(Debug, Serialize, Deserialize)]
struct ViewState {
    page_size: usize,
    current_offset: usize,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{}.{}", namespace, name)
}

/// SQLite-backed key-value table.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// `book_atlas.db` inside the configured data directory.
    pub fn open_default(config: &Config) -> Result<Self> {
        let dir = config
            .data_dir()
            .map_err(|e| BookError::Config(format!("{:#}", e)))?;
        Self::open(&dir.join(DB_FILE))
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BookError::StoreUnavailable("database connection lock poisoned".into()))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove every key belonging to `namespace`. Returns how many rows went.
    pub fn clear(&self, namespace: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM kv WHERE key LIKE ?1",
            params![format!("{}.%", namespace)],
        )?;
        Ok(deleted)
    }
}

// Signed-in session
impl Database {
    pub fn save_session(&self, session: &Session) -> Result<()> {
        let value = serde_json::to_string(session)?;
        self.set(&key(SESSION_NAMESPACE, "token"), &value)
    }

    pub fn load_session(&self) -> Option<Session> {
        let value = match self.get(&key(SESSION_NAMESPACE, "token")) {
            Ok(value) => value?,
            Err(e) => {
                warn!(error = %e, "failed to read stored session");
                return None;
            }
        };
        match serde_json::from_str(&value) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "stored session is unreadable, signing out");
                None
            }
        }
    }

    pub fn clear_session(&self) -> Result<()> {
        self.clear(SESSION_NAMESPACE)?;
        Ok(())
    }
}

impl CacheStore for Database {
    // Each key is written on its own; a crash between writes can leave them
    // out of step, which `load` tolerates by discarding what doesn't parse.
    fn save(&self, namespace: &str, snapshot: &CacheSnapshot) -> Result<()> {
        let pages = serde_json::to_string(&snapshot.pages)?;
        let view = serde_json::to_string(&ViewState {
            page_size: snapshot.page_size,
            current_offset: snapshot.current_offset,
        })?;

        self.set(&key(namespace, "pages"), &pages)?;
        self.set(&key(namespace, "total_records"), &snapshot.total_count.to_string())?;
        self.set(&key(namespace, "query"), &snapshot.query)?;
        self.set(&key(namespace, "view"), &view)?;
        Ok(())
    }

    fn load(&self, namespace: &str) -> Option<CacheSnapshot> {
        let read = |name: &str| match self.get(&key(namespace, name)) {
            Ok(value) => value,
            Err(e) => {
                warn!(namespace, name, error = %e, "failed to read cache key");
                None
            }
        };

        let pages = read("pages")?;
        let total = read("total_records")?;
        let query = read("query")?;
        let view = read("view")?;

        let parsed = (|| -> std::result::Result<CacheSnapshot, String> {
            let pages: Vec<CachedPage> = serde_json::from_str(&pages).map_err(|e| e.to_string())?;
            let view: ViewState = serde_json::from_str(&view).map_err(|e| e.to_string())?;
            let total_count = total.trim().parse::<usize>().map_err(|e| e.to_string())?;
            Ok(CacheSnapshot {
                query,
                page_size: view.page_size,
                total_count,
                pages,
                current_offset: view.current_offset,
            })
        })();

        match parsed {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(namespace, error = %e, "stored cache is unreadable, starting empty");
                None
            }
        }
    }
}

/// In-memory store for tests. Counts saves and can be told to fail them.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    snapshots: Mutex<std::collections::HashMap<String, CacheSnapshot>>,
    saves: std::sync::atomic::AtomicUsize,
    fail_saves: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl CacheStore for MemoryStore {
    fn save(&self, namespace: &str, snapshot: &CacheSnapshot) -> Result<()> {
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_saves {
            return Err(BookError::StoreUnavailable("memory store disabled".into()));
        }
        self.snapshots
            .lock()
            .unwrap()
            .insert(namespace.to_string(), snapshot.clone());
        Ok(())
    }

    fn load(&self, namespace: &str) -> Option<CacheSnapshot> {
        self.snapshots.lock().unwrap().get(namespace).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookSummary;
    use pretty_assertions::assert_eq;

    fn snapshot() -> CacheSnapshot {
        CacheSnapshot {
            query: "dune".into(),
            page_size: 5,
            total_count: 120,
            pages: vec![CachedPage {
                offset: 0,
                items: vec![BookSummary {
                    id: "a".into(),
                    title: "Dune".into(),
                    authors: vec!["Frank Herbert".into()],
                    publisher: None,
                    published_date: None,
                    page_count: Some(412),
                    description: None,
                    thumbnail_url: None,
                    info_link: None,
                }],
            }],
            current_offset: 0,
        }
    }

    #[test]
    fn saved_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("atlas.db");

        Database::open(&path).unwrap().save(SEARCH_NAMESPACE, &snapshot()).unwrap();

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.load(SEARCH_NAMESPACE), Some(snapshot()));
        assert_eq!(reopened.load(FAVORITES_NAMESPACE), None);
    }

    #[test]
    fn default_database_lives_in_the_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: Some(dir.path().join("atlas")),
            ..Config::default()
        };

        let db = Database::open_default(&config).unwrap();
        db.set("k", "v").unwrap();
        assert!(dir.path().join("atlas").join("book_atlas.db").exists());
    }

    #[test]
    fn unparseable_cache_is_treated_as_missing() {
        let db = Database::in_memory().unwrap();
        db.save(SEARCH_NAMESPACE, &snapshot()).unwrap();
        db.set("search.pages", "{not json").unwrap();

        assert_eq!(db.load(SEARCH_NAMESPACE), None);
    }

    #[test]
    fn bad_total_is_treated_as_missing() {
        let db = Database::in_memory().unwrap();
        db.save(SEARCH_NAMESPACE, &snapshot()).unwrap();
        db.set("search.total_records", "lots").unwrap();

        assert_eq!(db.load(SEARCH_NAMESPACE), None);
    }

    #[test]
    fn partial_keys_are_treated_as_missing() {
        let db = Database::in_memory().unwrap();
        db.set("search.query", "dune").unwrap();

        assert_eq!(db.load(SEARCH_NAMESPACE), None);
    }

    #[test]
    fn clear_only_touches_one_namespace() {
        let db = Database::in_memory().unwrap();
        db.save(SEARCH_NAMESPACE, &snapshot()).unwrap();
        db.save(FAVORITES_NAMESPACE, &snapshot()).unwrap();

        assert_eq!(db.clear(SEARCH_NAMESPACE).unwrap(), 4);
        assert_eq!(db.load(SEARCH_NAMESPACE), None);
        assert!(db.load(FAVORITES_NAMESPACE).is_some());
    }

    #[test]
    fn session_survives_reopen_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.db");
        let mut session = Session::from_access_token("tok").unwrap();
        session.expires_at = Some(chrono::Utc::now() + chrono::Duration::minutes(30));

        let db = Database::open(&path).unwrap();
        assert_eq!(db.load_session(), None);
        db.save_session(&session).unwrap();
        db.save(FAVORITES_NAMESPACE, &snapshot()).unwrap();

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.load_session(), Some(session));

        reopened.clear_session().unwrap();
        assert_eq!(reopened.load_session(), None);
        assert!(reopened.load(FAVORITES_NAMESPACE).is_some());
    }

    #[test]
    fn unreadable_session_is_signed_out() {
        let db = Database::in_memory().unwrap();
        db.set("session.token", "{\"expires_at\": 3}").unwrap();
        assert_eq!(db.load_session(), None);
    }

    #[test]
    fn set_overwrites_previous_value() {
        let db = Database::in_memory().unwrap();
        db.set("k", "one").unwrap();
        db.set("k", "two").unwrap();
        assert_eq!(db.get("k").unwrap().as_deref(), Some("two"));
        assert_eq!(db.get("missing").unwrap(), None);
    }
}
