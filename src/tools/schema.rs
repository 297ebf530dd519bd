//! 工具参数 Schema（schemars 自动生成）与路由专用工具声明
//!
//! ToBillingAssistant / ToRecommendationAssistant / CompleteOrEscalate 不会被执行：
//! 模型调用它们只是为了让路由转交或交还会话。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolSpec;

pub const TO_BILLING_ASSISTANT: &str = "ToBillingAssistant";
pub const TO_RECOMMENDATION_ASSISTANT: &str = "ToRecommendationAssistant";
pub const COMPLETE_OR_ESCALATE: &str = "CompleteOrEscalate";

/// Transfer the conversation to the specialized billing assistant that handles inquiries about electricity bills and spending.
#[allow(dead_code)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ToBillingAssistant {
    /// Any necessary followup questions the billing assistant should clarify before proceeding.
    pub request: String,
}

/// Transfer the conversation to the specialized recommendation assistant that helps users find the most suitable electricity plan.
#[allow(dead_code)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ToRecommendationAssistant {
    /// Any necessary followup questions the recommendation assistant should clarify before proceeding.
    pub request: String,
}

/// Mark the current task as completed or escalate control of the dialog to the primary assistant.
#[allow(dead_code)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct CompleteOrEscalate {
    /// Whether to cancel the current assistant and return to the primary assistant.
    #[serde(default = "default_cancel")]
    pub cancel: bool,
    /// The reason for completing or continuing the task.
    pub reason: String,
}

fn default_cancel() -> bool {
    true
}

/// 由结构体的 JSON Schema 生成 function tool 声明；description 取结构体文档
fn spec_for<T: JsonSchema>(name: &str) -> ToolSpec {
    let schema = schema_for!(T);
    let mut parameters = serde_json::to_value(&schema).unwrap_or_else(|_| Value::Object(Default::default()));
    let description = parameters
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string();
    if let Some(obj) = parameters.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("description");
    }
    ToolSpec::new(name, description, parameters)
}

/// 参数结构体的 JSON Schema（去掉 $schema / title / description 顶层字段）
pub fn parameters_for<T: JsonSchema>() -> Value {
    spec_for::<T>("").parameters
}

/// 解析工具参数；模型不带参数时（null）按空对象处理
pub fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, String> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))
}

pub fn to_billing_spec() -> ToolSpec {
    spec_for::<ToBillingAssistant>(TO_BILLING_ASSISTANT)
}

pub fn to_recommendation_spec() -> ToolSpec {
    spec_for::<ToRecommendationAssistant>(TO_RECOMMENDATION_ASSISTANT)
}

pub fn complete_or_escalate_spec() -> ToolSpec {
    spec_for::<CompleteOrEscalate>(COMPLETE_OR_ESCALATE)
}
