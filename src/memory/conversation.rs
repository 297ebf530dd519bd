//! 对话日志：只追加的消息序列
//!
//! 三种角色：用户、助手（调度/专家）、工具结果。助手消息可携带 tool_calls，
//! 工具结果通过 tool_call_id 回指调用；消息一旦追加即不可变。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（序列化为 user / assistant / tool，与 OpenAI 兼容接口一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// 消息内容：纯文本或结构化 JSON（如工具返回的对象、多段 content blocks）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(Value),
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    /// 文本视图：Text 原样返回；content blocks 取各段 text 拼接；其它结构化值（含普通数组）序列化为 JSON
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Structured(Value::Array(blocks))
                if blocks.iter().any(|b| b.get("text").is_some()) =>
            {
                blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            }
            Content::Structured(Value::Null) => String::new(),
            Content::Structured(v) => v.to_string(),
        }
    }

    /// 是否「空回复」：空白文本、null、或首个 content block 没有文本
    pub fn is_blank(&self) -> bool {
        match self {
            Content::Text(s) => s.trim().is_empty(),
            Content::Structured(Value::Null) => true,
            Content::Structured(Value::Array(blocks)) => blocks
                .first()
                .and_then(|b| b.get("text"))
                .and_then(|t| t.as_str())
                .map_or(true, |t| t.trim().is_empty()),
            Content::Structured(_) => false,
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

/// JSON 字符串统一落到 Text，保证序列化往返后相等
impl From<Value> for Content {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => Content::Text(s),
            other => Content::Structured(other),
        }
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

/// 模型发起的一次工具调用；id 由模型生成，在一步内唯一
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// 工具结果状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Content,
    /// 发出该消息的助手（dispatcher / billing / recommendation）或工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolStatus>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(content.into()),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            status: None,
        }
    }

    pub fn assistant(name: impl Into<String>, content: Content, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            name: Some(name.into()),
            tool_calls,
            tool_call_id: None,
            status: None,
        }
    }

    /// 工具结果消息（成功）
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            status: Some(ToolStatus::Success),
        }
    }

    /// 工具结果消息（失败）：content 为简短诊断
    pub fn tool_error(call_id: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Content::Text(diagnostic.into()),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            status: Some(ToolStatus::Error),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(ToolStatus::Success))
    }
}

/// 对话日志：只追加，同一步内多次追加按到达顺序拼接，不重排、不去重
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn extend(&mut self, msgs: impl IntoIterator<Item = Message>) {
        self.messages.extend(msgs);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 最近一条助手消息的文本（步结束时作为回复返回给用户）
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_text())
    }

    /// 尚未得到结果的调用 id（按出现顺序）
    pub fn unanswered_call_ids(&self) -> Vec<String> {
        let answered: std::collections::HashSet<&str> = self
            .messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .filter(|c| !answered.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
