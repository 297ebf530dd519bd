//! 示例数据：两位客户、24 个账单周期、三个电价套餐

use crate::data::{DataError, Database};

const CUSTOMERS: &[(&str, &str)] = &[
    ("Alice Johnson", "alice.johnson@example.com"),
    ("Bob Smith", "bob.smith@example.com"),
];

const PLANS: &[(&str, &str, &str)] = &[
    (
        "Standard Plan",
        "A well-rounded electricity plan designed for typical households, offering stable pricing and reliable service without any peak-hour surcharges.",
        "Affordable rates, predictable billing, ideal for families",
    ),
    (
        "Eco Plan",
        "A renewable energy plan that prioritizes sustainability by sourcing electricity from solar, wind, and hydroelectric power. Perfect for environmentally conscious consumers.",
        "100% green energy, reduces carbon footprint, government incentives may apply",
    ),
    (
        "Night Plan",
        "An electricity plan that provides significant cost savings for customers who consume most of their energy during off-peak nighttime hours. Ideal for night-shift workers and EV owners.",
        "Lower rates at night, great for electric vehicle charging, smart meter integration",
    ),
];

/// 2024 年每月（套餐, 计费起, 计费止, 金额）；客户 1 与客户 2 各 12 条
const ALICE_EVENTS: &[(&str, &str, &str, f64)] = &[
    ("Standard Plan", "2024-01-01", "2024-01-31", 50.00),
    ("Night Plan", "2024-02-01", "2024-02-29", 30.00),
    ("Night Plan", "2024-03-01", "2024-03-31", 35.00),
    ("Night Plan", "2024-04-01", "2024-04-30", 32.00),
    ("Standard Plan", "2024-05-01", "2024-05-31", 54.00),
    ("Standard Plan", "2024-06-01", "2024-06-30", 56.00),
    ("Standard Plan", "2024-07-01", "2024-07-31", 57.00),
    ("Standard Plan", "2024-08-01", "2024-08-31", 58.00),
    ("Standard Plan", "2024-09-01", "2024-09-30", 70.00),
    ("Standard Plan", "2024-10-01", "2024-10-31", 65.00),
    ("Standard Plan", "2024-11-01", "2024-11-30", 68.00),
    ("Standard Plan", "2024-12-01", "2024-12-31", 69.00),
];

const BOB_EVENTS: &[(&str, &str, &str, f64)] = &[
    ("Eco Plan", "2024-01-01", "2024-01-31", 69.00),
    ("Eco Plan", "2024-02-01", "2024-02-29", 67.00),
    ("Eco Plan", "2024-03-01", "2024-03-31", 70.00),
    ("Standard Plan", "2024-04-01", "2024-04-30", 50.00),
    ("Standard Plan", "2024-05-01", "2024-05-31", 53.00),
    ("Eco Plan", "2024-06-01", "2024-06-30", 63.00),
    ("Eco Plan", "2024-07-01", "2024-07-31", 64.00),
    ("Eco Plan", "2024-08-01", "2024-08-31", 65.00),
    ("Eco Plan", "2024-09-01", "2024-09-30", 66.00),
    ("Eco Plan", "2024-10-01", "2024-10-31", 67.00),
    ("Eco Plan", "2024-11-01", "2024-11-30", 68.00),
    ("Eco Plan", "2024-12-01", "2024-12-31", 69.00),
];

/// 写入示例数据；已有套餐数据时跳过，重复执行不会产生重复行
pub fn seed_sample_data(db: &Database) -> Result<bool, DataError> {
    if !db.plan_names()?.is_empty() {
        tracing::info!("Database already seeded, skipping");
        return Ok(false);
    }

    let mut ids = Vec::with_capacity(CUSTOMERS.len());
    for (name, email) in CUSTOMERS {
        ids.push(db.insert_customer(name, Some(*email))?);
    }
    tracing::info!("Added {} customers", ids.len());

    let mut events = 0;
    for (customer_id, rows) in ids.iter().zip([ALICE_EVENTS, BOB_EVENTS]) {
        for (plan, start, end, amount) in rows {
            db.insert_spending_event(*customer_id, plan, start, end, *amount)?;
            events += 1;
        }
    }
    tracing::info!("Added {} spending events", events);

    for (name, description, points) in PLANS {
        db.insert_plan(name, description, points)?;
    }
    tracing::info!("Added {} electricity plans", PLANS.len());

    Ok(true)
}
