//! 工具注册表
//!
//! 所有可执行工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找；
//! ToolNode 在调用时加超时、补参并把失败转为失败结果。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// 提供给模型的工具声明（function tool）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
///
/// 返回 JSON 字符串视为文本结果，其它 JSON 值视为结构化结果；Err 为失败诊断。
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String>;

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 只保留指定名称的工具（按角色裁剪可用工具集）
    pub fn subset(&self, names: &[&str]) -> ToolRegistry {
        let tools = names
            .iter()
            .filter_map(|n| self.tools.get(*n).map(|t| (n.to_string(), t.clone())))
            .collect();
        ToolRegistry { tools }
    }

    /// 按名称排序的工具声明，保证每次请求里工具顺序稳定
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase text"
        }

        async fn execute(&self, args: Value) -> Result<Value, String> {
            let text = args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(Value::String(text.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(Upper);
        let tool = reg.get("upper").unwrap();
        let out = tool.execute(serde_json::json!({"text": "kwh"})).await.unwrap();
        assert_eq!(out, Value::String("KWH".into()));
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn test_subset_keeps_only_named() {
        let mut reg = ToolRegistry::new();
        reg.register(Upper);
        let specs = reg.subset(&["upper", "nope"]).specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "upper");
        assert!(reg.subset(&["nope"]).specs().is_empty());
    }
}
