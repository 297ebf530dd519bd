//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock / Scripted）实现 LlmClient：给定系统提示、会话与可用工具，
//! 返回文本回复和/或结构化工具调用。RetryingLlmClient 为任意后端加上限流/网络错误的指数退避重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::{Message, ToolCall};
use crate::tools::ToolSpec;

/// 模型调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("LLM configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// 限流与网络错误可重试；API 拒绝与响应格式错误不重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Network(_))
    }
}

/// 一次模型调用的输出：文本、工具调用，或两者皆空（退化输出）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls: calls,
        }
    }

    /// 既无工具调用也无非空文本
    pub fn is_degenerate(&self) -> bool {
        self.tool_calls.is_empty() && self.content.trim().is_empty()
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, LlmError>;

    /// 日志里展示的模型名
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// 指数退避重试参数
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待（attempt 从 0 开始）；限流时取服务端建议与退避的较大值
    pub fn backoff(&self, attempt: u32, err: &LlmError) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_backoff_ms);
        let ms = match err {
            LlmError::RateLimited { retry_after_ms } => exp.max(*retry_after_ms),
            _ => exp,
        };
        Duration::from_millis(ms)
    }
}

/// 为任意客户端加上可重试错误的退避重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(system, messages, tools).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let wait = self.config.backoff(attempt, &e);
                    tracing::warn!(
                        model = self.inner.model_name(),
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "LLM call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
