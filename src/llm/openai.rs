//! OpenAI 兼容 API 客户端
//!
//! 直接以 reqwest 调用 chat/completions（可配置 base_url），支持 function tools；
//! 适用于 OpenAI、DeepSeek 以及自建代理等兼容端点。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{LlmClient, LlmError, LlmResponse};
use crate::memory::{Message, Role, ToolCall};
use crate::tools::ToolSpec;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// OpenAI 兼容客户端：持有 HTTP Client、endpoint 与 model 名
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiClient {
    /// base_url 缺省为 OpenAI；api_key 为 None 时不带 Authorization（Ollama 等本地端点）
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let mut headers = header::HeaderMap::new();
        if let Some(api_key) = api_key.filter(|k| !k.is_empty()) {
            let auth = header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| LlmError::InvalidResponse(format!("Invalid API key format: {e}")))?;
            headers.insert(header::AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| LlmError::Network(format!("Failed to create HTTP client: {e}")))?;

        let base = base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{base}/chat/completions"),
            model: model.to_string(),
        })
    }
}

/// 会话日志 → 请求消息：系统提示在前；助手调用与工具结果保持 id 对应
fn to_wire_messages(system: &str, messages: &[Message]) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(WireMessage {
        role: "system",
        content: Some(system.to_string()),
        tool_calls: None,
        tool_call_id: None,
    });

    for m in messages {
        let text = m.content.as_text();
        let wire = match m.role {
            Role::User => WireMessage {
                role: "user",
                content: Some(text),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::Assistant => {
                let calls: Vec<WireToolCall> = m
                    .tool_calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: c.id.clone(),
                        kind: function_kind(),
                        function: WireFunctionCall {
                            name: c.name.clone(),
                            arguments: c.args.to_string(),
                        },
                    })
                    .collect();
                WireMessage {
                    role: "assistant",
                    content: if text.is_empty() && !calls.is_empty() {
                        None
                    } else {
                        Some(text)
                    },
                    tool_calls: if calls.is_empty() { None } else { Some(calls) },
                    tool_call_id: None,
                }
            }
            Role::Tool => WireMessage {
                role: "tool",
                content: Some(text),
                tool_calls: None,
                tool_call_id: m.tool_call_id.clone(),
            },
        };
        out.push(wire);
    }
    out
}

/// 参数字符串非法 JSON 时保留原文，交给工具层报参数错误
fn from_wire_call(call: WireToolCall) -> ToolCall {
    let args = if call.function.arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(&call.function.arguments)
            .unwrap_or(Value::String(call.function.arguments))
    };
    ToolCall::new(call.id, call.function.name, args)
}

fn retry_after_ms(headers: &header::HeaderMap) -> u64 {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000)
        .unwrap_or(1000)
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: to_wire_messages(system, messages),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: t,
                })
                .collect(),
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            messages = request.messages.len(),
            tools = tools.len(),
            "chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                retry_after_ms: retry_after_ms(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            if status.is_server_error() {
                return Err(LlmError::Network(format!("{status}: {message}")));
            }
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &data.usage {
            tracing::debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "token usage"
            );
        }

        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices returned".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(from_wire_call)
            .collect();

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
