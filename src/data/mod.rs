//! 业务数据层：客户、账单事件、电价套餐（SQLite）
//!
//! 工具通过 Database 读取数据；seed 提供示例数据供本地运行与测试。

pub mod db;
pub mod seed;

pub use db::{Customer, DataError, Database, ElectricityPlan, SpendingEvent};
pub use seed::seed_sample_data;
