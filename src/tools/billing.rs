//! 账单专家的工具：客户身份验证、账单事件查询

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::data::Database;
use crate::tools::schema::{parameters_for, parse_args};
use crate::tools::{query_db, Tool};

pub const VALIDATE_CUSTOMER: &str = "validate_customer";
pub const FETCH_SPENDING_EVENTS: &str = "fetch_spending_events";

/// 验证参数：customer_id 与 email 二选一
#[derive(Debug, Deserialize, JsonSchema)]
struct ValidateCustomerArgs {
    /// The customer's ID number.
    customer_id: Option<i64>,
    /// The email address registered with the customer's account.
    email: Option<String>,
}

/// 按客户 id 或邮箱验证身份；返回 {"valid", "customer_id", "name"}
pub struct ValidateCustomerTool {
    db: Arc<Database>,
}

impl ValidateCustomerTool {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ValidateCustomerTool {
    fn name(&self) -> &str {
        VALIDATE_CUSTOMER
    }

    fn description(&self) -> &str {
        "Validates a customer's identity using either their customer ID or their registered email address. \
         Must succeed before any billing information can be accessed."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<ValidateCustomerArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let args: ValidateCustomerArgs = parse_args(args)?;
        let email = args
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        let found = match (args.customer_id, email) {
            (Some(id), _) => query_db(&self.db, move |db| db.customer_by_id(id)).await?,
            (None, Some(email)) => {
                query_db(&self.db, move |db| db.customer_by_email(&email)).await?
            }
            (None, None) => return Err("Either customer_id or email must be provided".to_string()),
        };

        Ok(match found {
            Some(customer) => json!({
                "valid": true,
                "customer_id": customer.customer_id,
                "name": customer.name,
            }),
            None => json!({
                "valid": false,
                "reason": "No customer found with the provided customer ID or email.",
            }),
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FetchSpendingArgs {
    /// The ID of the validated customer.
    customer_id: Option<i64>,
    /// Optional number of most recent months to retrieve.
    months: Option<u32>,
    /// Optional plan name to filter by.
    plan_name: Option<String>,
}

/// 账单事件查询；customer_id 缺省时由 ToolNode 从已验证身份注入
pub struct FetchSpendingEventsTool {
    db: Arc<Database>,
}

impl FetchSpendingEventsTool {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for FetchSpendingEventsTool {
    fn name(&self) -> &str {
        FETCH_SPENDING_EVENTS
    }

    fn description(&self) -> &str {
        "Fetches spending events (billing periods and amounts due) for a validated customer, \
         newest first, with optional filtering by number of months or by plan name."
    }

    fn parameters_schema(&self) -> Value {
        parameters_for::<FetchSpendingArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let args: FetchSpendingArgs = parse_args(args)?;
        let customer_id = args
            .customer_id
            .ok_or_else(|| "customer_id is required; validate the customer first".to_string())?;
        let plan = args.plan_name.filter(|p| !p.trim().is_empty());
        let months = args.months.filter(|m| *m > 0);

        let events = query_db(&self.db, move |db| {
            db.spending_events(customer_id, months, plan.as_deref())
        })
        .await?;

        if events.is_empty() {
            return Ok(Value::String(
                "No spending events found with the given criteria.".to_string(),
            ));
        }

        let mut out = String::from("Spending events:\n");
        for e in &events {
            let amount = e
                .amount_due
                .map(|a| format!("{a:.2}"))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = write!(
                out,
                "\nevent_id: {}\ncustomer_id: {}\nplan_name: {}\nbilling_start: {}\nbilling_end: {}\namount_due: {}\n----------",
                e.event_id, e.customer_id, e.plan_name, e.billing_start, e.billing_end, amount
            );
        }
        Ok(Value::String(out))
    }
}
