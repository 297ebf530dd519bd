//! 路由与单步执行的错误类型
//!
//! 工具失败与模型空回复在节点内部吸收，不会出现在这里；
//! 只有路由失败与持久化失败作为硬错误返回调用方。

use thiserror::Error;

use crate::core::Scope;
use crate::memory::StoreError;

/// 路由无分支可走（致命，不重试）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("latest message is not an agent output")]
    NoAgentOutput,

    #[error("malformed tool call '{0}': empty tool name")]
    MalformedToolCall(String),

    #[error("no agent registered for scope {0}")]
    UnknownAgent(Scope),
}

/// 单步（一条用户消息）执行错误
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Routing failed: {0}")]
    Routing(#[from] RoutingError),

    #[error("Failed to restore thread {thread_id}: {source}")]
    CheckpointLoad {
        thread_id: String,
        #[source]
        source: StoreError,
    },

    /// 回复已生成但未能落盘；reply 仍交给调用方，由其决定如何提示用户
    #[error("Reply produced but checkpoint save failed: {source}")]
    CheckpointSave {
        reply: String,
        #[source]
        source: StoreError,
    },
}

impl StepError {
    /// 持久化失败时仍可返回的内存回复
    pub fn unsaved_reply(&self) -> Option<&str> {
        match self {
            StepError::CheckpointSave { reply, .. } => Some(reply),
            _ => None,
        }
    }
}
