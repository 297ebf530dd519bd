//! 可读会话记录导出
//!
//! 从检查点提取 user / assistant 的文本轮次（不含工具调用与工具结果），
//! 写成 `<dir>/<thread_id>/<timestamp>.json`，便于人工查看；同一线程同一秒内的导出以后写者为准。

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::memory::persistence::{validate_thread_id, Checkpoint, StoreError};
use crate::memory::Role;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptTurn {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub thread_id: String,
    /// 秒级，冒号换成 `-`
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    pub conversation: Vec<TranscriptTurn>,
}

impl Transcript {
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        let conversation = checkpoint
            .state
            .messages
            .messages()
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => return None,
                };
                let content = m.content.as_text();
                if content.trim().is_empty() {
                    return None;
                }
                Some(TranscriptTurn { role, content })
            })
            .collect();

        Self {
            thread_id: checkpoint.state.thread_id.clone(),
            timestamp: checkpoint.timestamp.format("%Y-%m-%dT%H-%M-%S").to_string(),
            customer_id: checkpoint.state.customer_id,
            conversation,
        }
    }

    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        validate_thread_id(&self.thread_id)?;
        let thread_dir = dir.as_ref().join(&self.thread_id);
        std::fs::create_dir_all(&thread_dir)?;
        let path = thread_dir.join(format!("{}.json", self.timestamp));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionState;
    use crate::memory::{Content, Message, ToolCall};
    use serde_json::json;

    #[test]
    fn test_transcript_keeps_only_text_turns() {
        let mut state = SessionState::new("t-1");
        state.customer_id = Some(1);
        state.messages.push(Message::user("What plans do you offer?"));
        state.messages.push(Message::assistant(
            "dispatcher",
            Content::default(),
            vec![ToolCall::new("c1", "ToRecommendationAssistant", json!({"request": "plans"}))],
        ));
        state.messages.push(Message::tool_result("c1", "reoriented"));
        state.messages.push(Message::assistant(
            "recommendation",
            Content::text("We offer Standard, Eco and Night plans."),
            vec![],
        ));
        let cp = Checkpoint::capture(state);

        let transcript = Transcript::from_checkpoint(&cp);

        assert_eq!(transcript.conversation.len(), 2);
        assert_eq!(transcript.conversation[1].role, "assistant");
        assert_eq!(transcript.customer_id, Some(1));
        assert!(!transcript.timestamp.contains(':'));

        let dir = tempfile::tempdir().unwrap();
        let path = transcript.write_to(dir.path()).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["thread_id"], "t-1");
        assert_eq!(written["conversation"][0]["content"], "What plans do you offer?");
    }

    fn transcript_for(thread_id: &str) -> Transcript {
        let mut state = SessionState::new(thread_id);
        state.messages.push(Message::user(format!("hello from {thread_id}")));
        Transcript::from_checkpoint(&Checkpoint::capture(state))
    }

    #[test]
    fn test_exports_of_different_threads_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = transcript_for("thread-a");
        let mut b = transcript_for("thread-b");
        b.timestamp = a.timestamp.clone();

        let path_a = a.write_to(dir.path()).unwrap();
        let path_b = b.write_to(dir.path()).unwrap();

        assert_ne!(path_a, path_b);
        assert!(path_a.starts_with(dir.path().join("thread-a")));
        let written_a = std::fs::read_to_string(&path_a).unwrap();
        assert!(written_a.contains("hello from thread-a"));

        a.thread_id = "../escape".to_string();
        assert!(a.write_to(dir.path()).is_err());
    }
}
