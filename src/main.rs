//! VoltDesk - 电力客服终端对话程序
//!
//! 用法：`voltdesk [--thread <id>] [--config <path>]`
//! 从标准输入逐行读取用户消息，输入 exit 退出；传入已有的 thread id 即从最新检查点继续。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use voltdesk::config::load_config;
use voltdesk::data::{seed_sample_data, Database};
use voltdesk::llm::create_llm_from_config;
use voltdesk::memory::{create_checkpoint_store, validate_thread_id, Transcript};
use voltdesk::tools::domain_registry;
use voltdesk::{observability, Orchestrator, OrchestratorBuilder, StepError};

struct CliArgs {
    thread_id: Option<String>,
    config_path: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut parsed = CliArgs {
        thread_id: None,
        config_path: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--thread" => parsed.thread_id = Some(args.next().context("--thread needs a value")?),
            "--config" => parsed.config_path = Some(args.next().context("--config needs a value")?.into()),
            other => bail!("Unknown argument: {other}\nUsage: voltdesk [--thread <id>] [--config <path>]"),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = parse_args()?;

    let cfg = load_config(args.config_path).context("Failed to load config")?;

    let db = Database::open(&cfg.tools.database_path)
        .with_context(|| format!("Failed to open database {:?}", cfg.tools.database_path))?;
    seed_sample_data(&db).context("Failed to seed sample data")?;
    let db = Arc::new(db);

    let llm = create_llm_from_config(&cfg).context("Failed to create LLM client")?;
    let store = create_checkpoint_store(&cfg.checkpoint).context("Failed to open checkpoint store")?;

    let mut builder = OrchestratorBuilder::new(cfg.clone(), llm)
        .with_tools(domain_registry(db))
        .with_store(store);
    if Path::new("config/prompts").is_dir() {
        builder = builder.with_prompt_dir("config/prompts");
    }
    let orchestrator = builder.build();

    let thread_id = args
        .thread_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    validate_thread_id(&thread_id).context("Invalid thread id")?;

    let resumed = orchestrator
        .get_state(&thread_id)
        .await
        .context("Failed to read thread state")?;
    match resumed {
        Some(state) => println!(
            "Resuming thread {} ({} messages, active: {})",
            thread_id,
            state.messages.len(),
            state.active_scope()
        ),
        None => println!("New thread {}", thread_id),
    }
    println!("Type your message, or 'exit' to quit.");

    run_loop(&orchestrator, &thread_id, cfg.app.export_dir.as_deref()).await
}

async fn run_loop(orchestrator: &Orchestrator, thread_id: &str, export_dir: Option<&Path>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") {
            break;
        }

        match orchestrator.submit_message(thread_id, input).await {
            Ok(step) => {
                println!("{}", step.reply);
                if let Some(dir) = export_dir {
                    match Transcript::from_checkpoint(&step.checkpoint).write_to(dir) {
                        Ok(path) => tracing::debug!("Transcript written to {:?}", path),
                        Err(e) => tracing::warn!("Transcript export failed: {}", e),
                    }
                }
            }
            Err(e @ StepError::CheckpointSave { .. }) => {
                println!("{}", e.unsaved_reply().unwrap_or_default());
                eprintln!("Warning: this turn was not saved ({e})");
            }
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    println!("Bye. Resume later with: voltdesk --thread {}", thread_id);
    Ok(())
}
