//! 检查点持久化
//!
//! 每步结束把整个会话状态存为一条不可变检查点，按 (thread_id, 时间戳) 命名；
//! 最新一条即该线程的持久状态，旧记录只被覆盖于逻辑上、不删除。
//! 后端：文件（`<dir>/<thread_id>/<timestamp>.json`）、SQLite（见 sqlite_store）、内存。

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{CheckpointBackend, CheckpointSection};
use crate::core::SessionState;
use crate::memory::SqliteCheckpointStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid thread id: {0:?}")]
    InvalidThreadId(String),

    #[error("Checkpoint store unavailable: {0}")]
    Unavailable(String),
}

/// 某一时刻的会话快照；创建后不再修改
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    pub state: SessionState,
}

impl Checkpoint {
    /// 以当前时间（微秒精度，与记录名一一对应）捕获快照
    pub fn capture(state: SessionState) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(6),
            state,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.state.thread_id
    }

    /// 记录名：不含冒号，字典序即时间序
    pub fn record_key(&self) -> String {
        self.timestamp.format("%Y%m%dT%H%M%S%.6fZ").to_string()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// 线程 id 会成为目录名 / 主键：只允许字母数字与 `-_.`，且不能是 `.` / `..`
pub fn validate_thread_id(thread_id: &str) -> Result<(), StoreError> {
    let ok = !thread_id.is_empty()
        && thread_id.len() <= 128
        && thread_id != "."
        && thread_id != ".."
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidThreadId(thread_id.to_string()))
    }
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// 该线程全部检查点的记录名（升序）
    async fn list(&self, thread_id: &str) -> Result<Vec<String>, StoreError>;
}

/// 文件存储：先写临时文件再 rename，读者永远看不到半截记录
#[derive(Debug)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn thread_dir(&self, thread_id: &str) -> Result<PathBuf, StoreError> {
        validate_thread_id(thread_id)?;
        Ok(self.root.join(thread_id))
    }

    pub fn record_path(&self, checkpoint: &Checkpoint) -> Result<PathBuf, StoreError> {
        Ok(self
            .thread_dir(checkpoint.thread_id())?
            .join(format!("{}.json", checkpoint.record_key())))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let path = self.record_path(checkpoint)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, checkpoint.to_bytes()?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(path = %path.display(), "checkpoint written");
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let Some(latest) = self.list(thread_id).await?.pop() else {
            return Ok(None);
        };
        let path = self.thread_dir(thread_id)?.join(format!("{latest}.json"));
        let bytes = tokio::fs::read(&path).await?;
        Ok(Some(Checkpoint::from_bytes(&bytes)?))
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.thread_dir(thread_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// 内存存储：保存序列化后的字节，与文件后端行为一致
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        validate_thread_id(checkpoint.thread_id())?;
        let bytes = checkpoint.to_bytes()?;
        self.records
            .lock()
            .map_err(|_| Self::poisoned())?
            .entry(checkpoint.thread_id().to_string())
            .or_default()
            .insert(checkpoint.record_key(), bytes);
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        validate_thread_id(thread_id)?;
        let latest = self
            .records
            .lock()
            .map_err(|_| Self::poisoned())?
            .get(thread_id)
            .and_then(|r| r.values().next_back().cloned());
        latest.map(|b| Checkpoint::from_bytes(&b)).transpose()
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<String>, StoreError> {
        validate_thread_id(thread_id)?;
        Ok(self
            .records
            .lock()
            .map_err(|_| Self::poisoned())?
            .get(thread_id)
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// 按配置创建检查点存储
pub fn create_checkpoint_store(cfg: &CheckpointSection) -> Result<Arc<dyn CheckpointStore>, StoreError> {
    match cfg.backend {
        CheckpointBackend::File => {
            tracing::info!("Using file checkpoint store: {:?}", cfg.dir);
            Ok(Arc::new(FileCheckpointStore::new(&cfg.dir)))
        }
        CheckpointBackend::Sqlite => {
            tracing::info!("Using SQLite checkpoint store: {:?}", cfg.database_path);
            Ok(Arc::new(SqliteCheckpointStore::open(&cfg.database_path)?))
        }
        CheckpointBackend::Memory => {
            tracing::warn!("Using in-memory checkpoint store, conversations will not survive a restart");
            Ok(Arc::new(MemoryCheckpointStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Scope;
    use crate::memory::{Content, Message, ToolCall};
    use serde_json::json;

    fn sample_state(thread_id: &str) -> SessionState {
        let mut state = SessionState::new(thread_id);
        state.messages.push(Message::user("show my bill"));
        state.messages.push(Message::assistant(
            "billing",
            Content::default(),
            vec![ToolCall::new("call_1", "validate_customer", json!({"customer_id": 7}))],
        ));
        state.messages.push(
            Message::tool_result("call_1", json!({"valid": true, "customer_id": 7}))
                .with_name("validate_customer"),
        );
        state.dialog_state.push(Scope::Billing);
        state.customer_id = Some(7);
        state
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let cp = Checkpoint::capture(sample_state("thread-1"));

        store.save(&cp).await.unwrap();
        let loaded = store.load_latest("thread-1").await.unwrap().unwrap();

        assert_eq!(loaded, cp);
        assert_eq!(loaded.state.dialog_state.scopes(), &[Scope::Billing]);
        assert!(!cp.record_key().contains(':'));
        assert!(store.load_latest("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_load_then_save_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let cp = Checkpoint::capture(sample_state("thread-2"));
        store.save(&cp).await.unwrap();
        let path = store.record_path(&cp).unwrap();
        let before = std::fs::read(&path).unwrap();

        let loaded = store.load_latest("thread-2").await.unwrap().unwrap();
        store.save(&loaded).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(store.list("thread-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_float_arguments_survive_load_then_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let mut state = SessionState::new("thread-f");
        state.messages.push(Message::assistant(
            "billing",
            Content::default(),
            vec![ToolCall::new("c1", "fetch_spending_events", json!({"v": 7947.663000000001}))],
        ));
        state
            .messages
            .push(Message::tool_result("c1", json!({"amount_due": 0.1 + 0.2, "ratio": 1.0 / 3.0})));
        let cp = Checkpoint::capture(state);
        store.save(&cp).await.unwrap();
        let path = store.record_path(&cp).unwrap();
        let before = std::fs::read(&path).unwrap();

        let loaded = store.load_latest("thread-f").await.unwrap().unwrap();
        assert_eq!(loaded, cp);
        store.save(&loaded).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_latest_wins_and_older_are_kept() {
        let store = MemoryCheckpointStore::new();
        let mut first = Checkpoint::capture(sample_state("t"));
        first.timestamp = first.timestamp - chrono::Duration::seconds(5);
        let mut later_state = sample_state("t");
        later_state.dialog_state.pop();
        let second = Checkpoint::capture(later_state);

        store.save(&second).await.unwrap();
        store.save(&first).await.unwrap();

        let latest = store.load_latest("t").await.unwrap().unwrap();
        assert!(latest.state.dialog_state.is_empty());
        assert_eq!(store.list("t").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_thread_id_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let cp = Checkpoint::capture(sample_state("../escape"));
        assert!(matches!(store.save(&cp).await, Err(StoreError::InvalidThreadId(_))));
        assert!(validate_thread_id("").is_err());
        assert!(validate_thread_id("..").is_err());
        assert!(validate_thread_id("user-42_a.b").is_ok());
    }
}
