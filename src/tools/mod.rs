pub mod billing;
pub mod executor;
pub mod plans;
pub mod registry;
pub mod schema;

use std::sync::Arc;

use crate::data::{DataError, Database};

pub use billing::{FetchSpendingEventsTool, ValidateCustomerTool, FETCH_SPENDING_EVENTS, VALIDATE_CUSTOMER};
pub use executor::ToolNode;
pub use plans::{
    FetchPlanInformationTool, ListSupportedPlansTool, FETCH_PLAN_INFORMATION, LIST_SUPPORTED_PLANS,
};
pub use registry::{Tool, ToolRegistry, ToolSpec};
pub use schema::{
    complete_or_escalate_spec, to_billing_spec, to_recommendation_spec,
    COMPLETE_OR_ESCALATE, TO_BILLING_ASSISTANT, TO_RECOMMENDATION_ASSISTANT,
};

/// 注册全部业务工具；各角色再用 subset 取自己的那部分
pub fn domain_registry(db: Arc<Database>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ValidateCustomerTool::new(db.clone()));
    registry.register(FetchSpendingEventsTool::new(db.clone()));
    registry.register(ListSupportedPlansTool::new(db.clone()));
    registry.register(FetchPlanInformationTool::new(db));
    registry
}

/// rusqlite 是同步 API：查询放到 blocking 线程池执行，错误转成工具诊断
pub(crate) async fn query_db<T, F>(db: &Arc<Database>, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> Result<T, DataError> + Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || f(&db).map_err(|e| e.to_string()))
        .await
        .map_err(|e| format!("database task failed: {e}"))?
}
