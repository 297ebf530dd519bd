//! 多助手路由端到端场景：脚本化模型 + 内存示例数据库 + 检查点存储

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use voltdesk::agent::prompts::{dispatcher_prompt, BILLING_PROMPT, RECOMMENDATION_PROMPT};
use voltdesk::agent::CORRECTIVE_INSTRUCTION;
use voltdesk::config::AppConfig;
use voltdesk::core::{RoutingError, Scope, SessionState, StepError};
use voltdesk::data::{seed_sample_data, Database};
use voltdesk::llm::{LlmResponse, ScriptedLlmClient};
use voltdesk::memory::{
    Checkpoint, CheckpointStore, Content, FileCheckpointStore, MemoryCheckpointStore, Message, Role,
    StoreError, ToolCall, ToolStatus, Transcript,
};
use voltdesk::tools::{
    domain_registry, COMPLETE_OR_ESCALATE, FETCH_SPENDING_EVENTS, LIST_SUPPORTED_PLANS,
    TO_BILLING_ASSISTANT, TO_RECOMMENDATION_ASSISTANT, VALIDATE_CUSTOMER,
};
use voltdesk::{Orchestrator, OrchestratorBuilder};

fn seeded_db() -> Arc<Database> {
    let db = Database::open_in_memory().unwrap();
    seed_sample_data(&db).unwrap();
    Arc::new(db)
}

fn build(
    config: AppConfig,
    llm: Arc<ScriptedLlmClient>,
    store: Arc<dyn CheckpointStore>,
) -> Orchestrator {
    OrchestratorBuilder::new(config, llm)
        .with_tools(domain_registry(seeded_db()))
        .with_store(store)
        .build()
}

fn harness(
    script: Vec<LlmResponse>,
) -> (Orchestrator, Arc<ScriptedLlmClient>, Arc<MemoryCheckpointStore>) {
    let llm = Arc::new(ScriptedLlmClient::new(script));
    let store = Arc::new(MemoryCheckpointStore::new());
    let orchestrator = build(AppConfig::default(), llm.clone(), store.clone());
    (orchestrator, llm, store)
}

fn call(id: &str, name: &str, args: serde_json::Value) -> LlmResponse {
    LlmResponse::tool_calls(vec![ToolCall::new(id, name, args)])
}

/// 预置一个停在某个专家上的线程
async fn seed_thread(store: &dyn CheckpointStore, thread_id: &str, scope: Scope) {
    let mut state = SessionState::new(thread_id);
    state.messages.push(Message::user("hi"));
    state.messages.push(Message::assistant(
        "dispatcher",
        Content::default(),
        vec![ToolCall::new("h0", TO_BILLING_ASSISTANT, json!({"request": "help"}))],
    ));
    state.messages.push(Message::tool_result("h0", "transferred"));
    state.dialog_state.push(scope);
    store.save(&Checkpoint::capture(state)).await.unwrap();
}

#[tokio::test]
async fn test_plan_question_enters_recommendation_and_stays() {
    let (orchestrator, llm, store) = harness(vec![
        call("h1", TO_RECOMMENDATION_ASSISTANT, json!({"request": "list plans"})),
        call("c1", LIST_SUPPORTED_PLANS, json!({})),
        LlmResponse::text("We offer the Standard Plan, the Eco Plan and the Night Plan."),
    ]);

    let step = orchestrator
        .submit_message("thread-a", "What plans do you offer?")
        .await
        .unwrap();

    assert_eq!(step.reply, "We offer the Standard Plan, the Eco Plan and the Night Plan.");
    assert_eq!(step.active_scope, Scope::Recommendation);
    assert_eq!(step.hops, 5);
    assert!(!step.hop_limit_reached);

    let state = &step.checkpoint.state;
    assert_eq!(state.dialog_state.scopes(), &[Scope::Recommendation]);
    let roles: Vec<Role> = state.messages.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert!(state.messages.unanswered_call_ids().is_empty());

    let reorientation = &state.messages.messages()[2];
    assert_eq!(reorientation.tool_call_id.as_deref(), Some("h1"));
    assert!(reorientation.content.as_text().contains("recommendation assistant"));

    let plans = &state.messages.messages()[4];
    assert_eq!(plans.status, Some(ToolStatus::Success));
    assert!(plans.content.as_text().contains("Night Plan"));

    let requests = llm.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].system, dispatcher_prompt());
    assert!(requests[0].tool_names.contains(&TO_BILLING_ASSISTANT.to_string()));
    assert_eq!(requests[1].system, RECOMMENDATION_PROMPT);
    assert!(requests[1].tool_names.contains(&COMPLETE_OR_ESCALATE.to_string()));
    assert!(!requests[1].tool_names.contains(&TO_BILLING_ASSISTANT.to_string()));

    let saved = store.load_latest("thread-a").await.unwrap().unwrap();
    assert_eq!(saved, step.checkpoint);
}

#[tokio::test]
async fn test_billing_asks_for_identity_then_injects_validated_id() {
    let (orchestrator, llm, store) = harness(vec![
        LlmResponse::text("Sure. Could you share your customer ID or the email on your account?"),
        call("v1", VALIDATE_CUSTOMER, json!({"customer_id": 1})),
        call("f1", FETCH_SPENDING_EVENTS, json!({"months": 3})),
        LlmResponse::text("Your last three bills were 65.00, 68.00 and 69.00."),
    ]);
    seed_thread(&*store, "thread-b", Scope::Billing).await;

    let step = orchestrator.submit_message("thread-b", "show my bill").await.unwrap();
    assert!(step.reply.contains("customer ID"));
    assert_eq!(step.active_scope, Scope::Billing);
    assert_eq!(step.checkpoint.state.customer_id, None);
    assert_eq!(llm.requests()[0].system, BILLING_PROMPT);

    let step = orchestrator.submit_message("thread-b", "my id is 1").await.unwrap();
    assert_eq!(step.reply, "Your last three bills were 65.00, 68.00 and 69.00.");

    let state = &step.checkpoint.state;
    assert_eq!(state.customer_id, Some(1));
    let messages = state.messages.messages();
    let fetch_call = messages
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .find(|c| c.id == "f1")
        .unwrap();
    assert_eq!(fetch_call.args, json!({"months": 3}));

    let fetch_result = messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("f1"))
        .unwrap();
    assert_eq!(fetch_result.status, Some(ToolStatus::Success));
    let text = fetch_result.content.as_text();
    assert!(text.starts_with("Spending events:"));
    assert!(text.contains("customer_id: 1"));
    assert!(text.contains("billing_end: 2024-12-31"));
}

#[tokio::test]
async fn test_escalation_returns_control_to_dispatcher_in_same_step() {
    let (orchestrator, llm, store) = harness(vec![
        call("e1", COMPLETE_OR_ESCALATE, json!({"cancel": true, "reason": "user wants plan advice"})),
        LlmResponse::text("Happy to help with plans. What matters most to you?"),
    ]);
    seed_thread(&*store, "thread-d", Scope::Billing).await;

    let step = orchestrator
        .submit_message("thread-d", "actually, which plan is greenest?")
        .await
        .unwrap();

    assert_eq!(step.active_scope, Scope::Dispatcher);
    assert!(step.checkpoint.state.dialog_state.is_empty());
    assert_eq!(step.reply, "Happy to help with plans. What matters most to you?");

    let ack = step
        .checkpoint
        .state
        .messages
        .messages()
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("e1"))
        .unwrap();
    assert!(ack.content.as_text().starts_with("Resuming dialog with the primary assistant"));

    let requests = llm.requests();
    assert_eq!(requests[0].system, BILLING_PROMPT);
    assert_eq!(requests[1].system, dispatcher_prompt());
}

#[tokio::test]
async fn test_escalation_alongside_a_lookup_keeps_every_call_answered() {
    let (orchestrator, llm, store) = harness(vec![
        LlmResponse::tool_calls(vec![
            ToolCall::new("f1", FETCH_SPENDING_EVENTS, json!({"customer_id": 1})),
            ToolCall::new("e1", COMPLETE_OR_ESCALATE, json!({"cancel": true, "reason": "plans"})),
        ]),
        LlmResponse::text("Sure, let's talk about plans."),
    ]);
    seed_thread(&*store, "thread-m", Scope::Billing).await;

    let step = orchestrator
        .submit_message("thread-m", "never mind the bill, show me plans")
        .await
        .unwrap();

    assert_eq!(step.active_scope, Scope::Dispatcher);
    assert_eq!(step.reply, "Sure, let's talk about plans.");

    let messages = step.checkpoint.state.messages.messages();
    let result_for = |id: &str| {
        messages
            .iter()
            .filter(|m| m.tool_call_id.as_deref() == Some(id))
            .collect::<Vec<_>>()
    };
    let f1 = result_for("f1");
    let e1 = result_for("e1");
    assert_eq!(f1.len(), 1);
    assert_eq!(e1.len(), 1);
    assert!(f1[0].content.as_text().starts_with("Resuming dialog with the primary assistant"));
    assert_eq!(e1[0].status, Some(ToolStatus::Error));
    assert!(e1[0].content.as_text().contains("was not executed"));

    // 调度助手被再次调用前，所有调用都已配对
    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].system, dispatcher_prompt());
    let sent = &requests[1].messages;
    for c in sent.iter().flat_map(|m| m.tool_calls.iter()) {
        let answers = sent
            .iter()
            .filter(|m| m.tool_call_id.as_deref() == Some(c.id.as_str()))
            .count();
        assert_eq!(answers, 1, "call {} must have exactly one result", c.id);
    }
}

#[tokio::test]
async fn test_tool_failure_is_reported_back_to_agent() {
    let (orchestrator, llm, store) = harness(vec![
        call("f1", FETCH_SPENDING_EVENTS, json!({})),
        LlmResponse::text("I need your customer ID before I can look up your bills."),
    ]);
    seed_thread(&*store, "thread-e", Scope::Billing).await;

    let step = orchestrator.submit_message("thread-e", "how much did I pay?").await.unwrap();
    assert_eq!(step.reply, "I need your customer ID before I can look up your bills.");

    let failure = step
        .checkpoint
        .state
        .messages
        .messages()
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("f1"))
        .unwrap()
        .clone();
    assert_eq!(failure.status, Some(ToolStatus::Error));
    assert!(failure.content.as_text().starts_with("Error: tool call f1 (fetch_spending_events) failed"));

    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.last(), Some(&failure));
}

#[tokio::test]
async fn test_parallel_handoff_calls_each_get_one_result() {
    let (orchestrator, _llm, _store) = harness(vec![
        LlmResponse::tool_calls(vec![
            ToolCall::new("h1", TO_BILLING_ASSISTANT, json!({"request": "bill"})),
            ToolCall::new("h2", TO_RECOMMENDATION_ASSISTANT, json!({"request": "plans"})),
        ]),
        LlmResponse::text("Let's look at your bill first. What is your customer ID?"),
    ]);

    let step = orchestrator
        .submit_message("thread-p", "bill and plans please")
        .await
        .unwrap();
    assert_eq!(step.active_scope, Scope::Billing);

    let messages = step.checkpoint.state.messages.messages();
    let results: Vec<_> = messages.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].tool_call_id.as_deref(), Some("h1"));
    assert_eq!(results[1].tool_call_id.as_deref(), Some("h2"));
    assert_eq!(results[1].status, Some(ToolStatus::Error));
    assert!(step.checkpoint.state.messages.unanswered_call_ids().is_empty());
}

#[tokio::test]
async fn test_hop_limit_ends_step_with_fallback() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        call("c1", LIST_SUPPORTED_PLANS, json!({})),
        call("c2", LIST_SUPPORTED_PLANS, json!({})),
        call("c3", LIST_SUPPORTED_PLANS, json!({})),
    ]));
    let store = Arc::new(MemoryCheckpointStore::new());
    let mut config = AppConfig::default();
    config.agent.max_step_hops = 3;
    let orchestrator = build(config.clone(), llm.clone(), store.clone());
    seed_thread(&*store, "thread-h", Scope::Recommendation).await;

    let step = orchestrator.submit_message("thread-h", "plans?").await.unwrap();
    assert!(step.hop_limit_reached);
    assert_eq!(step.hops, 3);
    assert_eq!(step.reply, config.agent.fallback_reply);
    assert!(step.checkpoint.state.messages.unanswered_call_ids().is_empty());

    let c2 = step
        .checkpoint
        .state
        .messages
        .messages()
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c2"))
        .unwrap();
    assert_eq!(c2.status, Some(ToolStatus::Error));
    assert_eq!(llm.remaining(), 1);
}

#[tokio::test]
async fn test_routing_error_aborts_without_saving() {
    let (orchestrator, _llm, store) = harness(vec![call("bad", " ", json!({}))]);

    let err = orchestrator.submit_message("thread-r", "hello").await.unwrap_err();
    assert!(matches!(
        err,
        StepError::Routing(RoutingError::MalformedToolCall(ref id)) if id == "bad"
    ));
    assert!(store.list("thread-r").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_degenerate_output_is_retried_without_polluting_history() {
    let (orchestrator, llm, _store) = harness(vec![
        LlmResponse::text("   "),
        LlmResponse::text("Hello! How can I help with your electricity account?"),
    ]);

    let step = orchestrator.submit_message("thread-g", "hi").await.unwrap();
    assert_eq!(step.reply, "Hello! How can I help with your electricity account?");
    assert_eq!(step.checkpoint.state.messages.len(), 2);

    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].messages.last().map(|m| m.content.as_text()),
        Some(CORRECTIVE_INSTRUCTION.to_string())
    );
}

struct FailingStore;

#[async_trait]
impl CheckpointStore for FailingStore {
    async fn save(&self, _checkpoint: &Checkpoint) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn load_latest(&self, _thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(None)
    }

    async fn list(&self, _thread_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_save_failure_still_surfaces_reply() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![LlmResponse::text("Hello!")]));
    let orchestrator = build(AppConfig::default(), llm, Arc::new(FailingStore));

    let err = orchestrator.submit_message("thread-s", "hi").await.unwrap_err();
    assert!(matches!(err, StepError::CheckpointSave { .. }));
    assert_eq!(err.unsaved_reply(), Some("Hello!"));
}

#[tokio::test]
async fn test_thread_resumes_mid_specialist_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = Arc::new(ScriptedLlmClient::new(vec![
        call("h1", TO_BILLING_ASSISTANT, json!({"request": "bill"})),
        LlmResponse::text("What is your customer ID?"),
    ]));
    let orchestrator = build(
        AppConfig::default(),
        first,
        Arc::new(FileCheckpointStore::new(dir.path())),
    );
    orchestrator.submit_message("thread-f", "show my bill").await.unwrap();
    drop(orchestrator);

    let second = Arc::new(ScriptedLlmClient::new(vec![LlmResponse::text(
        "Thanks, let me check that.",
    )]));
    let store = Arc::new(FileCheckpointStore::new(dir.path()));
    let orchestrator = build(AppConfig::default(), second.clone(), store.clone());
    let step = orchestrator.submit_message("thread-f", "it is 1").await.unwrap();

    assert_eq!(step.active_scope, Scope::Billing);
    let requests = second.requests();
    assert_eq!(requests[0].system, BILLING_PROMPT);
    assert_eq!(requests[0].messages.len(), 5);
    assert_eq!(store.list("thread-f").await.unwrap().len(), 2);

    let transcript = Transcript::from_checkpoint(&step.checkpoint);
    let turns: Vec<&str> = transcript.conversation.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(
        turns,
        vec!["show my bill", "What is your customer ID?", "it is 1", "Thanks, let me check that."]
    );
}

#[tokio::test]
async fn test_threads_are_independent() {
    let (orchestrator, _llm, _store) = harness(vec![
        call("h1", TO_BILLING_ASSISTANT, json!({"request": "bill"})),
        LlmResponse::text("Your customer ID please?"),
        LlmResponse::text("Hi! How can I help?"),
    ]);

    let a = orchestrator.submit_message("thread-x", "bill").await.unwrap();
    let b = orchestrator.submit_message("thread-y", "hello").await.unwrap();

    assert_eq!(a.active_scope, Scope::Billing);
    assert_eq!(b.active_scope, Scope::Dispatcher);
    assert_eq!(b.checkpoint.state.messages.len(), 2);
}
