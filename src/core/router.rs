//! 路由：根据最新一条助手输出决定下一跳
//!
//! 调度助手只看第一个 tool call（转交账单 / 转交套餐 / 自己的工具节点）；
//! 专家助手只要任一调用是 CompleteOrEscalate 就交还调度助手，否则走自己的工具节点。

use crate::core::{RoutingError, Scope, SessionState};
use crate::memory::Role;
use crate::tools::{COMPLETE_OR_ESCALATE, TO_BILLING_ASSISTANT, TO_RECOMMENDATION_ASSISTANT};

/// 路由变体
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouterKind {
    Dispatcher,
    Specialist,
}

/// 下一跳
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    /// 本步结束，回复用户
    Terminate,
    /// 执行当前助手自己的工具，然后回到该助手
    Tools,
    /// 进入专家（push 栈）
    Enter(Scope),
    /// 离开专家（pop 栈），回到调度助手
    Exit,
}

pub fn route(kind: RouterKind, state: &SessionState) -> Result<Destination, RoutingError> {
    let last = state.messages.last().ok_or(RoutingError::NoAgentOutput)?;
    if last.role != Role::Assistant {
        return Err(RoutingError::NoAgentOutput);
    }
    if let Some(bad) = last.tool_calls.iter().find(|c| c.name.trim().is_empty()) {
        return Err(RoutingError::MalformedToolCall(bad.id.clone()));
    }

    let Some(first) = last.tool_calls.first() else {
        return Ok(Destination::Terminate);
    };

    let dest = match kind {
        RouterKind::Dispatcher => match first.name.as_str() {
            TO_BILLING_ASSISTANT => Destination::Enter(Scope::Billing),
            TO_RECOMMENDATION_ASSISTANT => Destination::Enter(Scope::Recommendation),
            _ => Destination::Tools,
        },
        RouterKind::Specialist => {
            if last.tool_calls.iter().any(|c| c.name == COMPLETE_OR_ESCALATE) {
                Destination::Exit
            } else {
                Destination::Tools
            }
        }
    };
    tracing::debug!(router = ?kind, destination = ?dest, "route");
    Ok(dest)
}
