//! 进入 / 离开专家的过渡节点
//!
//! 进入：push 栈，并以工具结果形式注入一条重定向说明（回指触发转交的调用）；
//! 离开：pop 栈，若触发消息带调用则对第一个调用回一条「交还调度助手」说明。
//! 同一条消息里其余并行调用不会被执行，各自回一条失败结果，保证每个调用恰有一条结果。

use crate::core::{Scope, SessionState, StackUpdate};
use crate::memory::{Message, ToolCall};

const RESUME_DISPATCHER: &str = "Resuming dialog with the primary assistant. Please reflect on the past conversation and assist the user as needed.";

fn specialist_title(scope: Scope) -> &'static str {
    match scope {
        Scope::Dispatcher => "primary assistant",
        Scope::Billing => "billing assistant",
        Scope::Recommendation => "recommendation assistant",
    }
}

/// 重定向说明：措辞属于提示词策略，机制（恰好一条回指结果）属于路由核心
pub fn reorientation_text(scope: Scope) -> String {
    let name = specialist_title(scope);
    format!(
        "The assistant is now the {name}. Reflect on the above conversation between the primary assistant and the user. \
         The user's intent is unsatisfied. Use the provided tools to assist the user. Remember, you are the {name}, \
         and the identification, resolution, or any other action is not complete until after you have successfully invoked the appropriate tool. \
         If the user changes their mind or needs help for other tasks, call the CompleteOrEscalate function to let the primary assistant take control. \
         Do not mention who you are - just act as the proxy for the assistant."
    )
}

fn skipped(call: &ToolCall) -> Message {
    Message::tool_error(
        call.id.clone(),
        format!(
            "Error: tool call {} ({}) was not executed because control of the dialog was transferred.",
            call.id, call.name
        ),
    )
    .with_name(call.name.clone())
}

/// 进入专家：push scope，回指第一个调用注入重定向说明
pub fn enter_specialist(state: &mut SessionState, scope: Scope) {
    let calls = state
        .messages
        .last()
        .map(|m| m.tool_calls.clone())
        .unwrap_or_default();

    state.dialog_state.apply(StackUpdate::Push(scope));
    tracing::info!(
        thread_id = %state.thread_id,
        scope = %scope,
        stack = ?state.dialog_state.scopes(),
        "enter specialist"
    );

    let mut iter = calls.iter();
    if let Some(trigger) = iter.next() {
        state.messages.push(
            Message::tool_result(trigger.id.clone(), reorientation_text(scope))
                .with_name(trigger.name.clone()),
        );
    }
    state.messages.extend(iter.map(skipped));
}

/// 离开专家：pop 栈；触发消息无调用时不追加任何消息
pub fn leave_specialist(state: &mut SessionState) {
    let calls = state
        .messages
        .last()
        .map(|m| m.tool_calls.clone())
        .unwrap_or_default();

    let left = state.dialog_state.apply(StackUpdate::Pop);
    tracing::info!(
        thread_id = %state.thread_id,
        left = ?left,
        stack = ?state.dialog_state.scopes(),
        "leave specialist"
    );

    let mut iter = calls.iter();
    if let Some(first) = iter.next() {
        state.messages.push(
            Message::tool_result(first.id.clone(), RESUME_DISPATCHER).with_name(first.name.clone()),
        );
    }
    state.messages.extend(iter.map(skipped));
}
