//! SQLite 检查点存储
//!
//! rusqlite 是同步 API，读写放到 spawn_blocking 上执行，避免阻塞 async 运行时。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::persistence::{validate_thread_id, Checkpoint, CheckpointStore, StoreError};

pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path.as_ref())?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT NOT NULL,
                ts TEXT NOT NULL,
                state BLOB NOT NULL,
                PRIMARY KEY (thread_id, ts)
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("checkpoint db lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        validate_thread_id(checkpoint.thread_id())?;
        let thread_id = checkpoint.thread_id().to_string();
        let key = checkpoint.record_key();
        let bytes = checkpoint.to_bytes()?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (thread_id, ts, state) VALUES (?1, ?2, ?3)",
                params![thread_id, key, bytes],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        validate_thread_id(thread_id)?;
        let thread_id = thread_id.to_string();
        let bytes: Option<Vec<u8>> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT state FROM checkpoints WHERE thread_id = ?1 ORDER BY ts DESC LIMIT 1",
                        [thread_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        bytes.map(|b| Checkpoint::from_bytes(&b)).transpose()
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<String>, StoreError> {
        validate_thread_id(thread_id)?;
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT ts FROM checkpoints WHERE thread_id = ?1 ORDER BY ts ASC")?;
            let keys = stmt
                .query_map([thread_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
        .await
    }
}
