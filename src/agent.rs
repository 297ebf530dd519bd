//! 助手：单一抽象，由角色描述（scope、工具声明、系统提示、路由变体）参数化
//!
//! respond 只读会话状态、调用模型并返回输出，不修改状态；由编排器把输出追加为新消息。
//! 模型给出退化输出（既无调用也无文本）或调用失败时，在工作副本上追加纠正指令后重试，
//! 最多 max_attempts 次，耗尽后返回兜底回复。

pub mod prompts;

use std::path::Path;
use std::sync::Arc;

use crate::core::{RouterKind, Scope, SessionState};
use crate::llm::{LlmClient, LlmResponse};
use crate::memory::{Content, Message, ToolCall};
use crate::tools::{
    complete_or_escalate_spec, to_billing_spec, to_recommendation_spec, ToolRegistry, ToolSpec,
    FETCH_PLAN_INFORMATION, FETCH_SPENDING_EVENTS, LIST_SUPPORTED_PLANS, VALIDATE_CUSTOMER,
};

/// 退化输出时追加到工作副本的纠正指令
pub const CORRECTIVE_INSTRUCTION: &str = "Respond with a real output.";

/// 各角色可执行的业务工具
pub fn executable_tools(scope: Scope) -> &'static [&'static str] {
    match scope {
        Scope::Dispatcher => &[],
        Scope::Billing => &[VALIDATE_CUSTOMER, FETCH_SPENDING_EVENTS],
        Scope::Recommendation => &[LIST_SUPPORTED_PLANS, FETCH_PLAN_INFORMATION],
    }
}

/// 角色描述
#[derive(Debug, Clone)]
pub struct AgentRole {
    pub scope: Scope,
    pub instructions: String,
    pub tools: Vec<ToolSpec>,
    pub router: RouterKind,
}

impl AgentRole {
    /// 按 scope 组装角色：业务工具取自 registry，路由工具按角色追加
    pub fn for_scope(scope: Scope, registry: &ToolRegistry, prompt_dir: Option<&Path>) -> Self {
        let mut tools = registry.subset(executable_tools(scope)).specs();
        let router = match scope {
            Scope::Dispatcher => {
                tools.push(to_billing_spec());
                tools.push(to_recommendation_spec());
                RouterKind::Dispatcher
            }
            Scope::Billing | Scope::Recommendation => {
                tools.push(complete_or_escalate_spec());
                RouterKind::Specialist
            }
        };
        Self {
            scope,
            instructions: prompts::load_prompt(prompt_dir, scope),
            tools,
            router,
        }
    }

    pub fn dispatcher(registry: &ToolRegistry) -> Self {
        Self::for_scope(Scope::Dispatcher, registry, None)
    }

    pub fn billing(registry: &ToolRegistry) -> Self {
        Self::for_scope(Scope::Billing, registry, None)
    }

    pub fn recommendation(registry: &ToolRegistry) -> Self {
        Self::for_scope(Scope::Recommendation, registry, None)
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// 重试策略：最大尝试次数（含首次）与兜底回复
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub fallback_reply: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            fallback_reply: "Sorry, I couldn't produce an answer just now. Could you rephrase your request?"
                .to_string(),
        }
    }
}

/// 一次 respond 的输出
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// 实际调用模型的次数
    pub attempts: u32,
    /// 是否为兜底回复
    pub fallback: bool,
}

impl AgentOutput {
    pub fn into_message(self, scope: Scope) -> Message {
        Message::assistant(scope.as_str(), Content::Text(self.content), self.tool_calls)
    }
}

pub struct Agent {
    role: AgentRole,
    llm: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl Agent {
    pub fn new(role: AgentRole, llm: Arc<dyn LlmClient>, policy: RetryPolicy) -> Self {
        Self { role, llm, policy }
    }

    pub fn role(&self) -> &AgentRole {
        &self.role
    }

    pub async fn respond(&self, state: &SessionState) -> AgentOutput {
        let mut working: Vec<Message> = state.messages.messages().to_vec();
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let result = self
                .llm
                .complete(&self.role.instructions, &working, &self.role.tools)
                .await;

            match result {
                Ok(resp) if !resp.is_degenerate() => {
                    let LlmResponse { content, tool_calls } = resp;
                    tracing::debug!(
                        scope = %self.role.scope,
                        attempt,
                        tool_calls = tool_calls.len(),
                        "agent responded"
                    );
                    return AgentOutput {
                        content,
                        tool_calls,
                        attempts: attempt,
                        fallback: false,
                    };
                }
                Ok(_) => {
                    tracing::warn!(scope = %self.role.scope, attempt, "degenerate model output, retrying");
                    working.push(Message::user(CORRECTIVE_INSTRUCTION));
                }
                Err(e) => {
                    tracing::warn!(scope = %self.role.scope, attempt, "model call failed: {}", e);
                }
            }
        }

        tracing::warn!(
            scope = %self.role.scope,
            max_attempts,
            "agent gave up, using fallback reply"
        );
        AgentOutput {
            content: self.policy.fallback_reply.clone(),
            tool_calls: Vec::new(),
            attempts: max_attempts,
            fallback: true,
        }
    }
}
