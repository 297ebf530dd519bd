//! 会话状态：对话日志 + 对话栈 + 已验证客户 id
//!
//! 对话栈记录「当前由谁接管」：空栈即调度助手；只有进入节点 push、离开节点 pop，助手本身不改栈。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::memory::ConversationLog;

/// 会话所有权范围
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Dispatcher,
    Billing,
    Recommendation,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Dispatcher => "dispatcher",
            Scope::Billing => "billing",
            Scope::Recommendation => "recommendation",
        }
    }

    pub fn is_specialist(&self) -> bool {
        !matches!(self, Scope::Dispatcher)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对话栈的一次更新
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackUpdate {
    Push(Scope),
    Pop,
}

/// 对话栈
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogStack {
    scopes: Vec<Scope>,
}

impl DialogStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    /// 弹出栈顶；空栈上 pop 为空操作，返回 None
    pub fn pop(&mut self) -> Option<Scope> {
        let popped = self.scopes.pop();
        if popped.is_none() {
            tracing::warn!("pop on empty dialog stack ignored");
        }
        popped
    }

    pub fn apply(&mut self, update: StackUpdate) -> Option<Scope> {
        match update {
            StackUpdate::Push(scope) => {
                self.push(scope);
                None
            }
            StackUpdate::Pop => self.pop(),
        }
    }

    pub fn top(&self) -> Option<Scope> {
        self.scopes.last().copied()
    }

    /// 当前接管的助手：栈顶，空栈即调度助手
    pub fn active_scope(&self) -> Scope {
        self.top().unwrap_or(Scope::Dispatcher)
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl From<Vec<Scope>> for DialogStack {
    fn from(scopes: Vec<Scope>) -> Self {
        Self { scopes }
    }
}

/// 一个线程的完整会话状态；一步之内由 Orchestrator 独占，步结束整体落盘
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub thread_id: String,
    pub messages: ConversationLog,
    pub dialog_state: DialogStack,
    /// validate_customer 成功后写入，fetch_spending_events 缺省 customer_id 时读取
    #[serde(default)]
    pub customer_id: Option<i64>,
}

impl SessionState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: ConversationLog::new(),
            dialog_state: DialogStack::new(),
            customer_id: None,
        }
    }

    pub fn active_scope(&self) -> Scope {
        self.dialog_state.active_scope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_law_top_is_latest_unmatched_push() {
        let mut stack = DialogStack::new();
        let ops = [
            StackUpdate::Push(Scope::Billing),
            StackUpdate::Push(Scope::Recommendation),
            StackUpdate::Pop,
            StackUpdate::Push(Scope::Recommendation),
            StackUpdate::Push(Scope::Billing),
            StackUpdate::Pop,
        ];
        let mut model: Vec<Scope> = Vec::new();
        for op in ops {
            stack.apply(op);
            match op {
                StackUpdate::Push(s) => model.push(s),
                StackUpdate::Pop => {
                    model.pop();
                }
            }
            assert_eq!(stack.top(), model.last().copied());
        }
        assert_eq!(stack.scopes(), &[Scope::Billing, Scope::Recommendation]);
    }

    #[test]
    fn test_pop_on_empty_is_noop() {
        let mut stack = DialogStack::new();
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
        assert_eq!(stack.active_scope(), Scope::Dispatcher);
    }

    #[test]
    fn test_pop_removes_only_last() {
        let mut stack = DialogStack::from(vec![Scope::Billing, Scope::Recommendation]);
        assert_eq!(stack.pop(), Some(Scope::Recommendation));
        assert_eq!(stack.scopes(), &[Scope::Billing]);
        assert_eq!(stack.active_scope(), Scope::Billing);
    }

    #[test]
    fn test_stack_serializes_as_list() {
        let stack = DialogStack::from(vec![Scope::Recommendation]);
        assert_eq!(serde_json::to_string(&stack).unwrap(), r#"["recommendation"]"#);
    }
}
