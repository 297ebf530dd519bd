//! 编排器：驱动一步（一条用户消息）直到结束
//!
//! 状态机：入口按对话栈顶选择助手 → 助手 → 路由 →（工具 ⇄ 同一助手）|（进入 / 离开专家）| 结束。
//! 一步开始时从检查点整体恢复会话状态，结束时整体保存一条新检查点；中途放弃的步不落盘。
//! 同一线程的步串行执行（每线程一把异步锁），不同线程互不影响。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::agent::Agent;
use crate::core::router::{route, Destination};
use crate::core::transitions::{enter_specialist, leave_specialist};
use crate::core::{RoutingError, Scope, SessionState, StepError};
use crate::memory::{Checkpoint, CheckpointStore, Content, Message, StoreError};
use crate::tools::ToolNode;

/// 单步内最大跳数，防止助手与工具 / 过渡节点之间死循环
pub const DEFAULT_MAX_STEP_HOPS: u32 = 25;

/// 每个 scope 的助手与其工具节点
pub struct ScopeRuntime {
    pub agent: Agent,
    pub tools: ToolNode,
}

/// 状态机节点
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Node {
    Agent(Scope),
    Tools(Scope),
    Enter(Scope),
    Exit,
}

/// 一步的结果
#[derive(Debug, Clone)]
pub struct StepReply {
    pub reply: String,
    /// 步结束时持有会话的 scope
    pub active_scope: Scope,
    /// 本步经过的节点数
    pub hops: u32,
    /// 是否因跳数上限提前结束
    pub hop_limit_reached: bool,
    /// 本步保存的检查点
    pub checkpoint: Checkpoint,
}

pub struct Orchestrator {
    runtimes: HashMap<Scope, ScopeRuntime>,
    store: Arc<dyn CheckpointStore>,
    max_step_hops: u32,
    fallback_reply: String,
    thread_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        runtimes: HashMap<Scope, ScopeRuntime>,
        store: Arc<dyn CheckpointStore>,
        max_step_hops: u32,
        fallback_reply: impl Into<String>,
    ) -> Self {
        Self {
            runtimes,
            store,
            max_step_hops: max_step_hops.max(1),
            fallback_reply: fallback_reply.into(),
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 线程最新的持久状态（检查、导出用）
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.store.load_latest(thread_id).await?.map(|cp| cp.state))
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// 步结束后若没有其它步持有或等待这把锁，就从表里移除
    fn release_thread_lock(&self, thread_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let idle = locks
            .get(thread_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(thread_id);
        }
    }

    fn runtime(&self, scope: Scope) -> Result<&ScopeRuntime, RoutingError> {
        self.runtimes.get(&scope).ok_or(RoutingError::UnknownAgent(scope))
    }

    /// 处理一条用户消息：恢复 → 驱动状态机 → 保存检查点 → 返回回复
    pub async fn submit_message(&self, thread_id: &str, text: &str) -> Result<StepReply, StepError> {
        let lock = self.thread_lock(thread_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_step(thread_id, text).await
        };
        self.release_thread_lock(thread_id, lock);
        result
    }

    async fn run_step(&self, thread_id: &str, text: &str) -> Result<StepReply, StepError> {
        let mut state = self
            .store
            .load_latest(thread_id)
            .await
            .map_err(|source| StepError::CheckpointLoad {
                thread_id: thread_id.to_string(),
                source,
            })?
            .map(|cp| cp.state)
            .unwrap_or_else(|| SessionState::new(thread_id));

        tracing::info!(
            thread_id,
            scope = %state.active_scope(),
            history = state.messages.len(),
            "step started"
        );
        state.messages.push(Message::user(text));

        let (hops, hop_limit_reached) = self.drive(&mut state).await?;

        let reply = state.messages.last_assistant_text().unwrap_or_default();
        let active_scope = state.active_scope();
        let checkpoint = Checkpoint::capture(state);

        if let Err(source) = self.store.save(&checkpoint).await {
            tracing::error!(thread_id, "checkpoint save failed: {}", source);
            return Err(StepError::CheckpointSave { reply, source });
        }
        tracing::info!(
            thread_id,
            scope = %active_scope,
            hops,
            checkpoint = %checkpoint.record_key(),
            "step finished"
        );

        Ok(StepReply {
            reply,
            active_scope,
            hops,
            hop_limit_reached,
            checkpoint,
        })
    }

    /// 从栈顶助手开始跑到结束；返回（跳数，是否触顶）
    async fn drive(&self, state: &mut SessionState) -> Result<(u32, bool), StepError> {
        let mut node = Node::Agent(state.active_scope());
        let mut hops = 0;

        loop {
            if hops >= self.max_step_hops {
                self.abort_step(state);
                return Ok((hops, true));
            }
            hops += 1;

            node = match node {
                Node::Agent(scope) => {
                    let runtime = self.runtime(scope)?;
                    let output = runtime.agent.respond(state).await;
                    state.messages.push(output.into_message(scope));
                    match route(runtime.agent.role().router, state)? {
                        Destination::Terminate => return Ok((hops, false)),
                        Destination::Tools => Node::Tools(scope),
                        Destination::Enter(target) => Node::Enter(target),
                        Destination::Exit => Node::Exit,
                    }
                }
                Node::Tools(scope) => {
                    self.runtime(scope)?.tools.run(state).await;
                    Node::Agent(scope)
                }
                Node::Enter(target) => {
                    self.runtime(target)?;
                    enter_specialist(state, target);
                    Node::Agent(target)
                }
                Node::Exit => {
                    leave_specialist(state);
                    Node::Agent(Scope::Dispatcher)
                }
            };
        }
    }

    /// 跳数触顶：为未应答的调用补失败结果，再以兜底回复结束本步
    fn abort_step(&self, state: &mut SessionState) {
        tracing::warn!(
            thread_id = %state.thread_id,
            max_step_hops = self.max_step_hops,
            "step hop limit reached, ending with fallback reply"
        );
        let pending = state.messages.unanswered_call_ids();
        state.messages.extend(pending.into_iter().map(|id| {
            let diag = format!("Error: tool call {id} was not executed because the step was aborted.");
            Message::tool_error(id, diag)
        }));
        let scope = state.active_scope();
        state.messages.push(Message::assistant(
            scope.as_str(),
            Content::text(self.fallback_reply.clone()),
            Vec::new(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::OrchestratorBuilder;
    use crate::llm::{LlmResponse, ScriptedLlmClient};
    use crate::memory::MemoryCheckpointStore;

    fn orchestrator(script: Vec<LlmResponse>) -> (Orchestrator, Arc<MemoryCheckpointStore>) {
        let store = Arc::new(MemoryCheckpointStore::new());
        let llm = Arc::new(ScriptedLlmClient::new(script));
        let orchestrator = OrchestratorBuilder::new(AppConfig::default(), llm)
            .with_store(store.clone())
            .build();
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_same_thread_steps_are_serialized() {
        let (orchestrator, _store) = orchestrator(vec![
            LlmResponse::text("first"),
            LlmResponse::text("second"),
        ]);

        let (a, b) = tokio::join!(
            orchestrator.submit_message("t-1", "one"),
            orchestrator.submit_message("t-1", "two"),
        );
        a.unwrap();
        b.unwrap();

        let state = orchestrator.get_state("t-1").await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 4);
    }

    fn lock_count(orchestrator: &Orchestrator) -> usize {
        orchestrator.thread_locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_thread_locks_are_released_after_steps() {
        let (orchestrator, _store) = orchestrator(vec![
            LlmResponse::text("a"),
            LlmResponse::text("b"),
            LlmResponse::text("c"),
        ]);

        let (a, b) = tokio::join!(
            orchestrator.submit_message("t-1", "one"),
            orchestrator.submit_message("t-1", "two"),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(lock_count(&orchestrator), 0);

        orchestrator.submit_message("t-2", "three").await.unwrap();
        assert_eq!(lock_count(&orchestrator), 0);

        // 失败的步同样释放
        orchestrator.submit_message("../etc", "hi").await.unwrap_err();
        assert_eq!(lock_count(&orchestrator), 0);
    }

    #[tokio::test]
    async fn test_waiting_step_keeps_the_lock_entry() {
        let (orchestrator, _store) = orchestrator(vec![]);
        let held = orchestrator.thread_lock("t-1");
        let waiter = orchestrator.thread_lock("t-1");
        orchestrator.release_thread_lock("t-1", held);
        assert_eq!(lock_count(&orchestrator), 1);
        orchestrator.release_thread_lock("t-1", waiter);
        assert_eq!(lock_count(&orchestrator), 0);
    }

    #[tokio::test]
    async fn test_unknown_thread_starts_fresh() {
        let (orchestrator, _store) = orchestrator(vec![LlmResponse::text("Hello!")]);
        assert!(orchestrator.get_state("t-new").await.unwrap().is_none());

        let step = orchestrator.submit_message("t-new", "hi").await.unwrap();
        assert_eq!(step.reply, "Hello!");
        assert_eq!(step.active_scope, Scope::Dispatcher);
        assert_eq!(step.hops, 1);
    }

    #[tokio::test]
    async fn test_invalid_thread_id_fails_on_load() {
        let (orchestrator, _store) = orchestrator(vec![]);
        let err = orchestrator.submit_message("../etc", "hi").await.unwrap_err();
        assert!(matches!(err, StepError::CheckpointLoad { .. }));
    }
}
