//! 记忆层：对话日志、检查点持久化（文件 / SQLite / 内存）、可读会话导出

pub mod conversation;
pub mod persistence;
pub mod sqlite_store;
pub mod transcript;

pub use conversation::{Content, ConversationLog, Message, Role, ToolCall, ToolStatus};
pub use persistence::{
    create_checkpoint_store, validate_thread_id, Checkpoint, CheckpointStore, FileCheckpointStore,
    MemoryCheckpointStore, StoreError,
};
pub use sqlite_store::SqliteCheckpointStore;
pub use transcript::{Transcript, TranscriptTurn};
