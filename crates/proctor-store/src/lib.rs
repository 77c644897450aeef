//! SQLite persistence for session start instants, so the countdown
//! survives page reloads.
//!
//! The store holds exactly one fact per session: when it started, as epoch
//! milliseconds. `get_or_create` is the write-once anchor of the whole
//! timing subsystem — once a start instant exists for a session id, every
//! later call returns it unchanged, whatever `now` is.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("anchor store unavailable: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

enum Backend {
    Sqlite(Connection),
    /// Non-durable fallback when the database cannot be opened. The session
    /// proceeds but no longer survives a reload.
    Memory(HashMap<String, i64>),
}

/// Durable sessionId → startInstant mapping.
pub struct AnchorStore {
    backend: Backend,
}

impl AnchorStore {
    /// Open (or create) a database at the given filesystem path and run
    /// migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            backend: Backend::Sqlite(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            backend: Backend::Sqlite(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Non-durable HashMap backend for when the durable store is
    /// unavailable. Anchors behave identically within the process but are
    /// lost on restart.
    pub fn degraded() -> Self {
        Self {
            backend: Backend::Memory(HashMap::new()),
        }
    }

    /// Open the durable store, degrading to the in-memory backend if the
    /// database cannot be opened. Degradation is logged, never fatal.
    pub fn open_or_degrade(path: &Path) -> Self {
        match Self::open(path) {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(%err, ?path, "anchor store unavailable; session will not survive reload");
                Self::degraded()
            }
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self.backend, Backend::Sqlite(_))
    }

    /// Create the schema if it does not already exist.
    fn migrate(&self) -> Result<(), StoreError> {
        if let Backend::Sqlite(conn) = &self.backend {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS quiz_start_anchors (
                    session_id TEXT PRIMARY KEY,
                    start_ms   INTEGER NOT NULL
                );",
            )?;
        }
        Ok(())
    }

    /// Return the stored start instant for `session_id`, storing `now`
    /// first if no value exists. Atomic with respect to a single session:
    /// the first caller's `now` sticks, all later calls read it back.
    pub fn get_or_create(
        &mut self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError> {
        let now_ms = now.timestamp_millis();
        let stored_ms = match &mut self.backend {
            Backend::Sqlite(conn) => {
                conn.execute(
                    "INSERT OR IGNORE INTO quiz_start_anchors (session_id, start_ms)
                     VALUES (?1, ?2)",
                    params![session_id, now_ms],
                )?;
                conn.query_row(
                    "SELECT start_ms FROM quiz_start_anchors WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get::<_, i64>(0),
                )?
            }
            Backend::Memory(map) => *map.entry(session_id.to_string()).or_insert(now_ms),
        };
        Ok(DateTime::from_timestamp_millis(stored_ms).unwrap_or(now))
    }

    /// Read the stored start instant without creating one.
    pub fn get(&self, session_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let stored_ms = match &self.backend {
            Backend::Sqlite(conn) => conn
                .query_row(
                    "SELECT start_ms FROM quiz_start_anchors WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?,
            Backend::Memory(map) => map.get(session_id).copied(),
        };
        Ok(stored_ms.and_then(DateTime::from_timestamp_millis))
    }

    /// Remove the anchor for a finalized session. Idempotent.
    pub fn clear(&mut self, session_id: &str) -> Result<(), StoreError> {
        match &mut self.backend {
            Backend::Sqlite(conn) => {
                conn.execute(
                    "DELETE FROM quiz_start_anchors WHERE session_id = ?1",
                    params![session_id],
                )?;
            }
            Backend::Memory(map) => {
                map.remove(session_id);
            }
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid RFC3339")
            .with_timezone(&Utc)
    }

    fn t0() -> DateTime<Utc> {
        ts("2026-08-26T09:00:00Z")
    }

    // ── 1. get_or_create is idempotent ──────────────────────────────

    #[test]
    fn get_or_create_returns_first_instant() {
        let mut store = AnchorStore::open_in_memory().unwrap();
        let first = store.get_or_create("s-1", t0()).unwrap();
        // Second call with a different now: same anchor back.
        let second = store
            .get_or_create("s-1", t0() + TimeDelta::seconds(42))
            .unwrap();
        assert_eq!(first, t0());
        assert_eq!(second, t0());
    }

    // ── 2. Sessions are independent ─────────────────────────────────

    #[test]
    fn sessions_do_not_share_anchors() {
        let mut store = AnchorStore::open_in_memory().unwrap();
        let a = store.get_or_create("s-a", t0()).unwrap();
        let b = store
            .get_or_create("s-b", t0() + TimeDelta::seconds(10))
            .unwrap();
        assert_eq!(a, t0());
        assert_eq!(b, t0() + TimeDelta::seconds(10));
    }

    // ── 3. Anchor survives reopen (the reload scenario) ─────────────

    #[test]
    fn anchor_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proctor.db");

        {
            let mut store = AnchorStore::open(&path).unwrap();
            store.get_or_create("s-1", t0()).unwrap();
        }

        // "Reload": fresh process, same database file, 10s later.
        let mut store = AnchorStore::open(&path).unwrap();
        let restored = store
            .get_or_create("s-1", t0() + TimeDelta::seconds(10))
            .unwrap();
        assert_eq!(restored, t0());
    }

    // ── 4. Clear removes the anchor ─────────────────────────────────

    #[test]
    fn clear_removes_and_is_idempotent() {
        let mut store = AnchorStore::open_in_memory().unwrap();
        store.get_or_create("s-1", t0()).unwrap();
        store.clear("s-1").unwrap();
        assert_eq!(store.get("s-1").unwrap(), None);
        // Clearing again is fine.
        store.clear("s-1").unwrap();

        // After clear, a new attempt gets a fresh anchor.
        let fresh = store
            .get_or_create("s-1", t0() + TimeDelta::seconds(100))
            .unwrap();
        assert_eq!(fresh, t0() + TimeDelta::seconds(100));
    }

    // ── 5. get does not create ──────────────────────────────────────

    #[test]
    fn get_without_create_returns_none() {
        let store = AnchorStore::open_in_memory().unwrap();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    // ── 6. Degraded backend behaves the same in-process ─────────────

    #[test]
    fn degraded_backend_is_idempotent_in_process() {
        let mut store = AnchorStore::degraded();
        assert!(!store.is_durable());

        let first = store.get_or_create("s-1", t0()).unwrap();
        let second = store
            .get_or_create("s-1", t0() + TimeDelta::seconds(5))
            .unwrap();
        assert_eq!(first, t0());
        assert_eq!(second, t0());

        store.clear("s-1").unwrap();
        assert_eq!(store.get("s-1").unwrap(), None);
    }

    // ── 7. open_or_degrade falls back on a bad path ─────────────────

    #[test]
    fn open_or_degrade_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A directory is not a valid database file.
        let store = AnchorStore::open_or_degrade(dir.path());
        assert!(!store.is_durable());
    }

    #[test]
    fn open_or_degrade_prefers_durable() {
        let dir = tempfile::tempdir().unwrap();
        let store = AnchorStore::open_or_degrade(&dir.path().join("proctor.db"));
        assert!(store.is_durable());
    }
}
