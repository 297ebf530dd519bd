//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat（支持 function calling）

use std::time::Duration;

use crate::llm::{LlmError, OpenAiClient};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端；模型缺省为 `deepseek-chat`
pub fn create_deepseek_client(
    model: Option<&str>,
    api_key: &str,
    request_timeout: Duration,
) -> Result<OpenAiClient, LlmError> {
    let model = model
        .filter(|m| !m.is_empty())
        .unwrap_or(DEEPSEEK_CHAT);

    OpenAiClient::new(
        Some(DEEPSEEK_BASE_URL),
        model,
        Some(api_key),
        request_timeout,
    )
}
