//! 编排器构建器：统一的初始化逻辑
//!
//! 终端前端与测试共用：按配置为三个 scope 组装助手（提示词 + 工具声明）与工具节点。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::{executable_tools, Agent, AgentRole, RetryPolicy};
use crate::config::AppConfig;
use crate::core::orchestrator::{Orchestrator, ScopeRuntime};
use crate::core::Scope;
use crate::llm::LlmClient;
use crate::memory::{CheckpointStore, MemoryCheckpointStore};
use crate::tools::{ToolNode, ToolRegistry};

/// 编排器构建器
pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    store: Option<Arc<dyn CheckpointStore>>,
    prompt_dir: Option<PathBuf>,
    instructions: HashMap<Scope, String>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            config,
            llm,
            tools: ToolRegistry::new(),
            store: None,
            prompt_dir: None,
            instructions: HashMap::new(),
        }
    }

    /// 业务工具（各 scope 再按角色取子集）
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 提示词覆盖目录：`<dir>/<scope>.txt`
    pub fn with_prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// 直接指定某个 scope 的系统提示词
    pub fn with_instructions(mut self, scope: Scope, instructions: impl Into<String>) -> Self {
        self.instructions.insert(scope, instructions.into());
        self
    }

    fn build_runtime(&self, scope: Scope, policy: &RetryPolicy) -> ScopeRuntime {
        let mut role = AgentRole::for_scope(scope, &self.tools, self.prompt_dir.as_deref());
        if let Some(text) = self.instructions.get(&scope) {
            role = role.with_instructions(text.clone());
        }
        let node_tools = self.tools.subset(executable_tools(scope));
        ScopeRuntime {
            agent: Agent::new(role, self.llm.clone(), policy.clone()),
            tools: ToolNode::new(node_tools, self.config.tools.tool_timeout_secs),
        }
    }

    pub fn build(self) -> Orchestrator {
        let policy = RetryPolicy {
            max_attempts: self.config.agent.max_attempts,
            fallback_reply: self.config.agent.fallback_reply.clone(),
        };

        let runtimes = [Scope::Dispatcher, Scope::Billing, Scope::Recommendation]
            .into_iter()
            .map(|scope| (scope, self.build_runtime(scope, &policy)))
            .collect();

        let store = self.store.clone().unwrap_or_else(|| {
            tracing::warn!("No checkpoint store configured, using in-memory store");
            Arc::new(MemoryCheckpointStore::new())
        });

        Orchestrator::new(
            runtimes,
            store,
            self.config.agent.max_step_hops,
            self.config.agent.fallback_reply.clone(),
        )
    }
}
