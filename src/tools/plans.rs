//! 套餐专家的工具：套餐列表、套餐详情

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::data::Database;
use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::{query_db, Tool};

pub const LIST_SUPPORTED_PLANS: &str = "list_supported_plans";
pub const FETCH_PLAN_INFORMATION: &str = "fetch_plan_information";

/// 数据库无数据或不可用时的兜底套餐列表
const FALLBACK_PLANS: [&str; 3] = ["Standard Plan", "Eco Plan", "Night Plan"];

pub struct ListSupportedPlansTool {
    db: Arc<Database>,
}

impl ListSupportedPlansTool {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ListSupportedPlansTool {
    fn name(&self) -> &str {
        LIST_SUPPORTED_PLANS
    }

    fn description(&self) -> &str {
        "Returns the list of electricity plans offered by the company."
    }

    async fn execute(&self, _args: Value) -> Result<Value, String> {
        let names = match query_db(&self.db, |db| db.plan_names()).await {
            Ok(names) if !names.is_empty() => names,
            Ok(_) => FALLBACK_PLANS.iter().map(|s| s.to_string()).collect(),
            Err(e) => {
                tracing::warn!("plan catalog unavailable, using fallback list: {}", e);
                FALLBACK_PLANS.iter().map(|s| s.to_string()).collect()
            }
        };
        Ok(json!(names))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PlanInfoArgs {
    /// The name of the plan to look up.
    plan_name: String,
}

pub struct FetchPlanInformationTool {
    db: Arc<Database>,
}

impl FetchPlanInformationTool {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for FetchPlanInformationTool {
    fn name(&self) -> &str {
        FETCH_PLAN_INFORMATION
    }

    fn description(&self) -> &str {
        "Fetches detailed information (description and selling points) about a specific electricity plan."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<PlanInfoArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let args: PlanInfoArgs = parse_args(args)?;
        let plan_name = args.plan_name.trim().to_string();
        let lookup = plan_name.clone();
        let plan = query_db(&self.db, move |db| db.plan_by_name(&lookup)).await?;

        Ok(Value::String(match plan {
            Some(p) => format!(
                "Information for {}:\n\nplan_name: {}\nplan_description: {}\nselling_points: {}\n",
                p.plan_name, p.plan_name, p.plan_description, p.selling_points
            ),
            None => format!("No information found for plan: {plan_name}"),
        }))
    }
}
