use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use futures::future::BoxFuture;
use rusqlite::{params, Connection};

use tessel_core::error::{Result, TesselError};
use tessel_core::traits::Checkpointer;

/// In-memory checkpoint store. Useful for tests and single-process runs;
/// nothing survives a restart.
pub struct MemoryCheckpointer {
    entries: Mutex<HashMap<String, String>>,
    id: String,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            id: format!("memory:{}", uuid::Uuid::new_v4()),
        }
    }
}

impl Default for MemoryCheckpointer {
    fn default() -> Self {
        Self::new()
    }
}

impl Checkpointer for MemoryCheckpointer {
    fn save(&self, thread_id: &str, state_json: &str) -> BoxFuture<'_, Result<()>> {
        let thread_id = thread_id.to_string();
        let state_json = state_json.to_string();
        Box::pin(async move {
            self.entries
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(thread_id, state_json);
            Ok(())
        })
    }

    fn load(&self, thread_id: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let thread_id = thread_id.to_string();
        Box::pin(async move {
            Ok(self
                .entries
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&thread_id)
                .cloned())
        })
    }

    fn identity(&self) -> String {
        self.id.clone()
    }
}

/// Persistent checkpoint store backed by SQLite. One row per run, upserted
/// after every applied step.
pub struct SqliteCheckpointer {
    conn: Mutex<Connection>,
    identity: String,
}

impl SqliteCheckpointer {
    /// Open or create the checkpoint database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TesselError::Checkpoint(format!("create directory: {}", e)))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| TesselError::Checkpoint(format!("open store: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS run_checkpoints (
                 thread_id TEXT PRIMARY KEY,
                 state_json TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );",
        )
        .map_err(|e| TesselError::Checkpoint(format!("initialize schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            identity: format!("sqlite:{}", path.display()),
        })
    }
}

impl Checkpointer for SqliteCheckpointer {
    fn save(&self, thread_id: &str, state_json: &str) -> BoxFuture<'_, Result<()>> {
        let thread_id = thread_id.to_string();
        let state_json = state_json.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
            conn.execute(
                "INSERT INTO run_checkpoints (thread_id, state_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(thread_id) DO UPDATE SET
                     state_json = excluded.state_json,
                     updated_at = excluded.updated_at",
                params![thread_id, state_json, Utc::now().to_rfc3339()],
            )
            .map_err(|e| TesselError::Checkpoint(format!("save: {}", e)))?;
            Ok(())
        })
    }

    fn load(&self, thread_id: &str) -> BoxFuture<'_, Result<Option<String>>> {
        let thread_id = thread_id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
            let mut stmt = conn
                .prepare("SELECT state_json FROM run_checkpoints WHERE thread_id = ?1")
                .map_err(|e| TesselError::Checkpoint(format!("prepare: {}", e)))?;

            let result = stmt
                .query_row(params![thread_id], |row| row.get::<_, String>(0))
                .ok();
            Ok(result)
        })
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }
}
