//! 示例数据初始化：`voltdesk-seed [db_path]`
//!
//! 未指定路径时使用配置中的 tools.database_path；重复执行不会写入重复数据。

use std::path::PathBuf;

use anyhow::Context;
use voltdesk::config::load_config;
use voltdesk::data::{seed_sample_data, Database};
use voltdesk::observability;

fn main() -> anyhow::Result<()> {
    observability::init();

    let path = match std::env::args().nth(1) {
        Some(p) => PathBuf::from(p),
        None => load_config(None).context("Failed to load config")?.tools.database_path,
    };

    let db = Database::open(&path).with_context(|| format!("Failed to open database {:?}", path))?;
    if seed_sample_data(&db).context("Failed to seed sample data")? {
        println!("Seeded sample data into {}", path.display());
    } else {
        println!("{} already contains sample data", path.display());
    }
    Ok(())
}
