//! Mock / Scripted LLM 客户端（用于本地与测试，无需 API）
//!
//! - MockLlmClient：回显最后一条用户消息；最后一条是工具结果时复述结果
//! - ScriptedLlmClient：按顺序返回预置响应，并记录每次请求，供路由场景测试断言

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmResponse};
use crate::memory::{Message, Role};
use crate::tools::ToolSpec;

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        _system: &str,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<LlmResponse, LlmError> {
        if let Some(last) = messages.last().filter(|m| m.role == Role::Tool) {
            return Ok(LlmResponse::text(format!(
                "Tool result: {}",
                last.content.as_text()
            )));
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_text())
            .unwrap_or_else(|| "(no input)".to_string());

        Ok(LlmResponse::text(format!("Echo from Mock: {last_user}")))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// 脚本客户端：每次调用弹出一个预置结果；脚本耗尽返回 InvalidResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(script: impl IntoIterator<Item = LlmResponse>) -> Self {
        Self::with_results(script.into_iter().map(Ok))
    }

    pub fn with_results(script: impl IntoIterator<Item = Result<LlmResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                system: system.to_string(),
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        self.script
            .lock()
            .map_err(|_| LlmError::InvalidResponse("script poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("script exhausted".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
