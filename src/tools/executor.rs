//! 工具执行节点
//!
//! 持有本角色可用的 ToolRegistry 与全局超时；依次执行最新助手消息里的每个调用，
//! 每个调用恰好追加一条结果。未知工具、超时、工具返回 Err 都转为失败结果（带调用 id 的诊断），
//! 不向上传播；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::SessionState;
use crate::memory::{Message, ToolCall};
use crate::tools::billing::{FETCH_SPENDING_EVENTS, VALIDATE_CUSTOMER};
use crate::tools::ToolRegistry;

/// 单个调用的执行结果
enum Outcome {
    Ok(Value),
    Failed(String),
    TimedOut,
    Panicked,
    Unknown,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Ok(_) => "ok",
            Outcome::Failed(_) => "error",
            Outcome::TimedOut => "timeout",
            Outcome::Panicked => "panic",
            Outcome::Unknown => "unknown_tool",
        }
    }
}

/// 工具执行节点：对每次调用施加超时，失败转为 success=false 的工具结果
#[derive(Clone)]
pub struct ToolNode {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolNode {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行最新消息里的全部调用，结果按调用顺序追加到会话日志
    pub async fn run(&self, state: &mut SessionState) {
        let calls = match state.messages.last() {
            Some(last) => last.tool_calls.clone(),
            None => return,
        };

        for call in &calls {
            let msg = self.invoke(state, call).await;
            state.messages.push(msg);
        }
    }

    async fn invoke(&self, state: &mut SessionState, call: &ToolCall) -> Message {
        let args = inject_customer_id(call, state.customer_id);
        let args_preview = args_preview(&args);
        let start = Instant::now();

        // 每次调用跑在独立任务里，工具 panic 只会让该任务失败
        let outcome = match self.registry.get(&call.name) {
            None => Outcome::Unknown,
            Some(tool) => {
                let mut task = tokio::spawn(async move { tool.execute(args).await });
                match timeout(self.timeout, &mut task).await {
                    Ok(Ok(Ok(value))) => Outcome::Ok(value),
                    Ok(Ok(Err(e))) => Outcome::Failed(e),
                    Ok(Err(join)) if join.is_panic() => Outcome::Panicked,
                    Ok(Err(join)) => Outcome::Failed(format!("tool task failed: {join}")),
                    Err(_) => {
                        task.abort();
                        Outcome::TimedOut
                    }
                }
            }
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "thread_id": state.thread_id,
            "tool": call.name,
            "call_id": call.id,
            "ok": matches!(outcome, Outcome::Ok(_)),
            "outcome": outcome.label(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match outcome {
            Outcome::Ok(value) => {
                if call.name == VALIDATE_CUSTOMER {
                    capture_customer_id(state, &value);
                }
                Message::tool_result(call.id.clone(), value).with_name(call.name.clone())
            }
            Outcome::Failed(e) => failure(call, &e),
            Outcome::TimedOut => failure(
                call,
                &format!("timed out after {}s", self.timeout.as_secs()),
            ),
            Outcome::Panicked => failure(call, "tool panicked"),
            Outcome::Unknown => failure(call, &format!("Unknown tool: {}", call.name)),
        }
    }
}

fn failure(call: &ToolCall, reason: &str) -> Message {
    tracing::warn!(tool = %call.name, call_id = %call.id, "tool call failed: {}", reason);
    Message::tool_error(
        call.id.clone(),
        format!(
            "Error: tool call {} ({}) failed: {}. Please fix your mistakes.",
            call.id, call.name, reason
        ),
    )
    .with_name(call.name.clone())
}

/// 账单查询缺省 customer_id 时用已验证身份补齐；会话里记录的调用本身不变
fn inject_customer_id(call: &ToolCall, customer_id: Option<i64>) -> Value {
    let mut args = call.args.clone();
    if call.name != FETCH_SPENDING_EVENTS {
        return args;
    }
    let Some(id) = customer_id else {
        return args;
    };
    if args.is_null() {
        args = Value::Object(Default::default());
    }
    if let Some(obj) = args.as_object_mut() {
        let missing = obj.get("customer_id").map_or(true, Value::is_null);
        if missing {
            obj.insert("customer_id".to_string(), Value::from(id));
            tracing::debug!(customer_id = id, "injected validated customer id");
        }
    }
    args
}

/// validate_customer 返回 {"valid": true, "customer_id": N} 时记录身份
fn capture_customer_id(state: &mut SessionState, result: &Value) {
    let valid = result.get("valid").and_then(Value::as_bool).unwrap_or(false);
    let id = result.get("customer_id").and_then(Value::as_i64);
    if let (true, Some(id)) = (valid, id) {
        if state.customer_id != Some(id) {
            tracing::info!(thread_id = %state.thread_id, customer_id = id, "customer validated");
        }
        state.customer_id = Some(id);
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
