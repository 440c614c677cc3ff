//! Experiment persistence.
//!
//! Three backends sit behind [`ExperimentStore`]: SQLite (default), one JSON
//! file per activity, and an in-memory store for tests and throwaway
//! sessions. Records are written whole; a stored experiment is never
//! updated in place.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::SecondsFormat;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::activity::ActivityId;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::experiment::Experiment;
use crate::persistence::{atomic_write_json, load_json};

/// Storage for experiment records, keyed by id and grouped by activity.
pub trait ExperimentStore: Send + Sync {
    fn put(&self, experiment: &Experiment) -> Result<(), StoreError>;

    fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError>;

    /// Experiments of one activity, oldest first.
    fn list_by_activity(&self, activity: ActivityId) -> Result<Vec<Experiment>, StoreError>;

    /// Remove every experiment of `activity`; returns how many were removed.
    fn clear_activity(&self, activity: ActivityId) -> Result<usize, StoreError>;

    fn backend(&self) -> StoreBackend;
}

/// Open the store configured for `workspace`.
pub fn open_store(
    config: &StoreConfig,
    workspace: &Path,
) -> Result<Box<dyn ExperimentStore>, StoreError> {
    let path = config.resolve_path(workspace);
    debug!(backend = ?config.backend, path = %path.display(), "opening experiment store");
    Ok(match config.backend {
        StoreBackend::Sqlite => Box::new(SqliteExperimentStore::open(&path)?),
        StoreBackend::Json => Box::new(JsonExperimentStore::open(&path)?),
        StoreBackend::Memory => Box::new(MemoryExperimentStore::new()),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn decode(id: &str, payload: &str) -> Result<Experiment, StoreError> {
    serde_json::from_str(payload).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS experiments (
    id          TEXT PRIMARY KEY,
    activity_id TEXT NOT NULL,
    time        TEXT NOT NULL,
    payload     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_experiments_activity ON experiments(activity_id, time);
";

pub struct SqliteExperimentStore {
    conn: Mutex<Connection>,
}

impl SqliteExperimentStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ExperimentStore for SqliteExperimentStore {
    fn put(&self, experiment: &Experiment) -> Result<(), StoreError> {
        let payload = serde_json::to_string(experiment)?;
        lock(&self.conn).execute(
            "INSERT OR REPLACE INTO experiments (id, activity_id, time, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                experiment.id.to_string(),
                experiment.activity_id.as_str(),
                experiment.time.to_rfc3339_opts(SecondsFormat::Nanos, true),
                payload,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError> {
        let key = id.to_string();
        let payload: Option<String> = lock(&self.conn)
            .query_row(
                "SELECT payload FROM experiments WHERE id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| decode(&key, &p)).transpose()
    }

    fn list_by_activity(&self, activity: ActivityId) -> Result<Vec<Experiment>, StoreError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, payload FROM experiments WHERE activity_id = ?1 ORDER BY time, rowid",
        )?;
        let rows = stmt.query_map(params![activity.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut experiments = Vec::new();
        for row in rows {
            let (id, payload) = row?;
            match decode(&id, &payload) {
                Ok(experiment) => experiments.push(experiment),
                Err(e) => warn!(error = %e, "skipping unreadable experiment"),
            }
        }
        Ok(experiments)
    }

    fn clear_activity(&self, activity: ActivityId) -> Result<usize, StoreError> {
        let removed = lock(&self.conn).execute(
            "DELETE FROM experiments WHERE activity_id = ?1",
            params![activity.as_str()],
        )?;
        Ok(removed)
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Sqlite
    }
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// One `<activity>.json` file per activity, holding an array of experiments.
pub struct JsonExperimentStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonExperimentStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Open {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    fn file(&self, activity: ActivityId) -> PathBuf {
        self.dir.join(format!("{activity}.json"))
    }

    fn load(&self, activity: ActivityId) -> Result<Vec<Experiment>, StoreError> {
        Ok(load_json(&self.file(activity))?.unwrap_or_default())
    }
}

impl ExperimentStore for JsonExperimentStore {
    fn put(&self, experiment: &Experiment) -> Result<(), StoreError> {
        let _guard = lock(&self.write_lock);
        let mut experiments = self.load(experiment.activity_id)?;
        match experiments.iter_mut().find(|e| e.id == experiment.id) {
            Some(existing) => *existing = experiment.clone(),
            None => experiments.push(experiment.clone()),
        }
        atomic_write_json(&self.file(experiment.activity_id), &experiments)?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError> {
        for activity in ActivityId::ALL {
            if let Some(found) = self.load(activity)?.into_iter().find(|e| e.id == id) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn list_by_activity(&self, activity: ActivityId) -> Result<Vec<Experiment>, StoreError> {
        self.load(activity)
    }

    fn clear_activity(&self, activity: ActivityId) -> Result<usize, StoreError> {
        let _guard = lock(&self.write_lock);
        let removed = self.load(activity)?.len();
        match std::fs::remove_file(self.file(activity)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(removed)
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Json
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryExperimentStore {
    experiments: Mutex<Vec<Experiment>>,
}

impl MemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExperimentStore for MemoryExperimentStore {
    fn put(&self, experiment: &Experiment) -> Result<(), StoreError> {
        let mut experiments = lock(&self.experiments);
        experiments.retain(|e| e.id != experiment.id);
        experiments.push(experiment.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<Experiment>, StoreError> {
        Ok(lock(&self.experiments).iter().find(|e| e.id == id).cloned())
    }

    fn list_by_activity(&self, activity: ActivityId) -> Result<Vec<Experiment>, StoreError> {
        Ok(lock(&self.experiments)
            .iter()
            .filter(|e| e.activity_id == activity)
            .cloned()
            .collect())
    }

    fn clear_activity(&self, activity: ActivityId) -> Result<usize, StoreError> {
        let mut experiments = lock(&self.experiments);
        let before = experiments.len();
        experiments.retain(|e| e.activity_id != activity);
        Ok(before - experiments.len())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}
