//! VoltDesk - 电力客服多智能体对话路由引擎
//!
//! 模块划分：
//! - **agent**: 助手角色（提示词 + 可见工具）与空回复重试
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 对话栈、路由、进入 / 离开专家、单步编排
//! - **data**: 客户 / 账单 / 套餐数据（SQLite）与示例数据
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话消息、检查点持久化、可读会话导出
//! - **observability**: 日志初始化
//! - **tools**: 业务工具、工具注册表与工具执行节点

pub mod agent;
pub mod config;
pub mod core;
pub mod data;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

pub use crate::core::{Orchestrator, OrchestratorBuilder, Scope, SessionState, StepError, StepReply};
