//! 核心编排层：会话状态与对话栈、路由、进入 / 离开专家、单步编排与错误

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod router;
pub mod state;
pub mod transitions;

pub use builder::OrchestratorBuilder;
pub use error::{RoutingError, StepError};
pub use orchestrator::{Orchestrator, ScopeRuntime, StepReply, DEFAULT_MAX_STEP_HOPS};
pub use router::{route, Destination, RouterKind};
pub use state::{DialogStack, Scope, SessionState, StackUpdate};
pub use transitions::{enter_specialist, leave_specialist, reorientation_text};
