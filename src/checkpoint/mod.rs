//! Checkpoint persistence
//!
//! The walker hands its whole `CrawlState` to a `CheckpointStore` after every
//! directory step. The SQLite store keeps one row per state component, keyed
//! by run id (the marker being crawled), and overwrites all of them in one
//! transaction so a crash never leaves a half-written checkpoint behind.

use crate::error::{CheckpointError, CheckpointResult};
use crate::walker::CrawlState;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, trace};

/// Durable storage of crawl state between runs
pub trait CheckpointStore {
    /// Load the state saved for `run_id`, if any
    fn load(&mut self, run_id: &str) -> CheckpointResult<Option<CrawlState>>;

    /// Atomically replace the state saved for `run_id`
    fn save(&mut self, run_id: &str, state: &CrawlState) -> CheckpointResult<()>;

    /// Forget everything saved for `run_id`
    fn clear(&mut self, run_id: &str) -> CheckpointResult<()>;

    /// Load the state for `run_id` and check it was taken from `start_url`
    fn resume(&mut self, run_id: &str, start_url: &str) -> CheckpointResult<Option<CrawlState>> {
        match self.load(run_id)? {
            Some(state) if state.start_url != start_url => Err(CheckpointError::StartMismatch {
                run_id: run_id.to_string(),
                stored: state.start_url,
                requested: start_url.to_string(),
            }),
            other => Ok(other),
        }
    }
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for Box<T> {
    fn load(&mut self, run_id: &str) -> CheckpointResult<Option<CrawlState>> {
        (**self).load(run_id)
    }

    fn save(&mut self, run_id: &str, state: &CrawlState) -> CheckpointResult<()> {
        (**self).save(run_id, state)
    }

    fn clear(&mut self, run_id: &str) -> CheckpointResult<()> {
        (**self).clear(run_id)
    }
}

/// Store that keeps nothing (fleet workers run without checkpoints)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCheckpointStore;

impl CheckpointStore for NullCheckpointStore {
    fn load(&mut self, _run_id: &str) -> CheckpointResult<Option<CrawlState>> {
        Ok(None)
    }

    fn save(&mut self, _run_id: &str, _state: &CrawlState) -> CheckpointResult<()> {
        Ok(())
    }

    fn clear(&mut self, _run_id: &str) -> CheckpointResult<()> {
        Ok(())
    }
}

/// Keys stored per run
pub mod keys {
    /// Directory the crawl started from
    pub const START_URL: &str = "start_url";

    /// Directory to list next
    pub const CURRENT_URL: &str = "current_url";

    /// Visited directory set
    pub const VISITED: &str = "visited";

    /// Empty subtree set
    pub const EMPTY: &str = "empty";

    /// Pending forks
    pub const FORKS: &str = "forks";

    /// Rows found so far
    pub const ANOMALIES: &str = "anomalies";

    /// Whether the walk reached its end
    pub const COMPLETED: &str = "completed";

    /// Crate version that wrote the checkpoint
    pub const WALKER_VERSION: &str = "walker_version";

    /// Time of the last save (RFC 3339)
    pub const SAVED_AT: &str = "saved_at";

    /// Keys that must all be present for a checkpoint to load
    pub const STATE: &[&str] = &[
        START_URL,
        CURRENT_URL,
        VISITED,
        EMPTY,
        FORKS,
        ANOMALIES,
        COMPLETED,
    ];
}

const CREATE_CHECKPOINT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoint (
    run_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (run_id, key)
)
"#;

/// Durability matters more than speed here: one write per directory step
const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
"#;

/// SQLite-backed checkpoint store
pub struct SqliteCheckpointStore {
    conn: Connection,
}

impl SqliteCheckpointStore {
    /// Open (or create) the checkpoint database at `path`
    pub fn open(path: &Path) -> CheckpointResult<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened checkpoint store");
        Self::with_connection(conn)
    }

    /// Store that lives only as long as the value
    pub fn open_in_memory() -> CheckpointResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> CheckpointResult<Self> {
        conn.execute_batch(PRAGMAS)?;
        conn.execute(CREATE_CHECKPOINT_TABLE, [])?;
        Ok(Self { conn })
    }

    /// Raw stored value of one key
    pub fn get_value(&self, run_id: &str, key: &str) -> CheckpointResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM checkpoint WHERE run_id = ?1 AND key = ?2",
                params![run_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn get_json<T: DeserializeOwned>(&self, run_id: &str, key: &str) -> CheckpointResult<T> {
        let raw = self
            .get_value(run_id, key)?
            .ok_or_else(|| CheckpointError::Incomplete {
                run_id: run_id.to_string(),
                key: key.to_string(),
            })?;
        serde_json::from_str(&raw).map_err(|source| CheckpointError::Serde {
            key: key.to_string(),
            source,
        })
    }
}

fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> CheckpointResult<String> {
    serde_json::to_string(value).map_err(|source| CheckpointError::Serde {
        key: key.to_string(),
        source,
    })
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&mut self, run_id: &str) -> CheckpointResult<Option<CrawlState>> {
        let present: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM checkpoint WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )?;
        if present == 0 {
            return Ok(None);
        }

        let state = CrawlState {
            start_url: self.get_json(run_id, keys::START_URL)?,
            current_url: self.get_json(run_id, keys::CURRENT_URL)?,
            visited: self.get_json(run_id, keys::VISITED)?,
            empty: self.get_json(run_id, keys::EMPTY)?,
            forks: self.get_json(run_id, keys::FORKS)?,
            anomalies: self.get_json(run_id, keys::ANOMALIES)?,
            completed: self.get_json(run_id, keys::COMPLETED)?,
        };

        debug!(
            run_id = %run_id,
            visited = state.visited.len(),
            anomalies = state.anomalies.len(),
            current = %state.current_url,
            "Loaded checkpoint"
        );
        Ok(Some(state))
    }

    fn save(&mut self, run_id: &str, state: &CrawlState) -> CheckpointResult<()> {
        let rows = [
            (keys::START_URL, to_json(keys::START_URL, &state.start_url)?),
            (keys::CURRENT_URL, to_json(keys::CURRENT_URL, &state.current_url)?),
            (keys::VISITED, to_json(keys::VISITED, &state.visited)?),
            (keys::EMPTY, to_json(keys::EMPTY, &state.empty)?),
            (keys::FORKS, to_json(keys::FORKS, &state.forks)?),
            (keys::ANOMALIES, to_json(keys::ANOMALIES, &state.anomalies)?),
            (keys::COMPLETED, to_json(keys::COMPLETED, &state.completed)?),
            (keys::WALKER_VERSION, env!("CARGO_PKG_VERSION").to_string()),
            (keys::SAVED_AT, Utc::now().to_rfc3339()),
        ];

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO checkpoint (run_id, key, value) VALUES (?1, ?2, ?3)",
            )?;
            for (key, value) in &rows {
                stmt.execute(params![run_id, key, value])?;
            }
        }
        tx.commit()?;

        trace!(run_id = %run_id, current = %state.current_url, "Checkpoint saved");
        Ok(())
    }

    fn clear(&mut self, run_id: &str) -> CheckpointResult<()> {
        let removed = self
            .conn
            .execute("DELETE FROM checkpoint WHERE run_id = ?1", [run_id])?;
        debug!(run_id = %run_id, rows = removed, "Cleared checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::ForkPolicy;
    use tempfile::tempdir;

    fn sample_state() -> CrawlState {
        let mut state = CrawlState::new("https://h/ITS2/", ForkPolicy::Stack);
        state.current_url = "https://h/ITS2/a/".into();
        state.visited.insert("https://h/ITS2/".into());
        state.empty.insert("https://h/ITS2/b/".into());
        state.forks.remember("https://h/ITS2/");
        state
    }

    #[test]
    fn test_round_trip_in_memory() {
        let mut store = SqliteCheckpointStore::open_in_memory().unwrap();
        assert!(store.load("its2").unwrap().is_none());

        let state = sample_state();
        store.save("its2", &state).unwrap();
        assert_eq!(store.load("its2").unwrap(), Some(state));
        assert!(store.get_value("its2", keys::SAVED_AT).unwrap().is_some());
    }

    #[test]
    fn test_runs_are_scoped() {
        let mut store = SqliteCheckpointStore::open_in_memory().unwrap();
        store.save("its2", &sample_state()).unwrap();
        assert!(store.load("18s").unwrap().is_none());

        store.clear("its2").unwrap();
        assert!(store.load("its2").unwrap().is_none());
    }

    #[test]
    fn test_overwrite_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.db");

        let mut state = sample_state();
        {
            let mut store = SqliteCheckpointStore::open(&path).unwrap();
            store.save("its2", &state).unwrap();
            state.visited.insert("https://h/ITS2/a/".into());
            state.current_url = "https://h/ITS2/c/".into();
            store.save("its2", &state).unwrap();
        }

        let mut store = SqliteCheckpointStore::open(&path).unwrap();
        assert_eq!(store.load("its2").unwrap(), Some(state));
    }

    #[test]
    fn test_incomplete_checkpoint() {
        let mut store = SqliteCheckpointStore::open_in_memory().unwrap();
        store.save("its2", &sample_state()).unwrap();
        store
            .conn
            .execute(
                "DELETE FROM checkpoint WHERE run_id = 'its2' AND key = ?1",
                [keys::VISITED],
            )
            .unwrap();

        assert!(matches!(
            store.load("its2"),
            Err(CheckpointError::Incomplete { .. })
        ));
    }

    #[test]
    fn test_resume_rejects_other_start() {
        let mut store = SqliteCheckpointStore::open_in_memory().unwrap();
        store.save("its2", &sample_state()).unwrap();

        assert!(store.resume("its2", "https://h/ITS2/").unwrap().is_some());
        assert!(matches!(
            store.resume("its2", "https://other/ITS2/"),
            Err(CheckpointError::StartMismatch { .. })
        ));
    }

    #[test]
    fn test_null_store() {
        let mut store = NullCheckpointStore;
        store.save("its2", &sample_state()).unwrap();
        assert!(store.load("its2").unwrap().is_none());
    }
}
