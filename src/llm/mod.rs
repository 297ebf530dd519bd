//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Ollama / Mock / Scripted）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use mock::{MockLlmClient, RecordedRequest, ScriptedLlmClient};
pub use openai::{OpenAiClient, OPENAI_BASE_URL};
pub use traits::{LlmClient, LlmError, LlmResponse, RetryConfig, RetryingLlmClient};

/// Ollama 的 OpenAI 兼容端点
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// 启动时读到的 API Key
#[derive(Debug, Clone, Default)]
struct ApiKeys {
    openai: Option<String>,
    deepseek: Option<String>,
}

impl ApiKeys {
    fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|k| !k.is_empty());
        Self {
            openai: read("OPENAI_API_KEY"),
            deepseek: read("DEEPSEEK_API_KEY"),
        }
    }
}

/// 按配置创建 LLM 客户端（启动时调用一次；核心逻辑不再读取环境）
///
/// - openai：需要 `OPENAI_API_KEY`，配置了 base_url 时允许无 Key（自建兼容端点）
/// - deepseek：需要 `DEEPSEEK_API_KEY`（或 `OPENAI_API_KEY`）
/// - ollama：无 Key，base_url 缺省为本机 11434 端口
/// - mock：显式指定时才使用
/// - 其它 provider 或缺少 Key 返回 `LlmError::Config`
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    build_client(cfg, &ApiKeys::from_env())
}

fn build_client(cfg: &AppConfig, keys: &ApiKeys) -> Result<Arc<dyn LlmClient>, LlmError> {
    let provider = cfg.llm.provider.trim().to_lowercase();
    let timeout = Duration::from_secs(cfg.llm.timeouts.request);
    let base_url = cfg.llm.base_url.as_deref().filter(|u| !u.trim().is_empty());

    let client: Arc<dyn LlmClient> = match provider.as_str() {
        "openai" => {
            if keys.openai.is_none() && base_url.is_none() {
                return Err(LlmError::Config(
                    "OPENAI_API_KEY is not set and no llm.base_url is configured".to_string(),
                ));
            }
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                base_url,
                &cfg.llm.model,
                keys.openai.as_deref(),
                timeout,
            )?)
        }
        "deepseek" => {
            let key = keys
                .deepseek
                .as_deref()
                .or(keys.openai.as_deref())
                .ok_or_else(|| LlmError::Config("DEEPSEEK_API_KEY is not set".to_string()))?;
            let model = if cfg.llm.model.starts_with("deepseek") {
                cfg.llm.model.as_str()
            } else {
                DEEPSEEK_CHAT
            };
            tracing::info!("Using DeepSeek LLM ({})", model);
            Arc::new(create_deepseek_client(Some(model), key, timeout)?)
        }
        "ollama" => {
            let url = base_url.unwrap_or(OLLAMA_BASE_URL);
            tracing::info!("Using Ollama LLM ({}) at {}", cfg.llm.model, url);
            Arc::new(OpenAiClient::new(Some(url), &cfg.llm.model, None, timeout)?)
        }
        "mock" => {
            tracing::info!("Using Mock LLM");
            return Ok(Arc::new(MockLlmClient));
        }
        other => {
            return Err(LlmError::Config(format!("Unsupported model provider: {other}")));
        }
    };

    let retry = RetryConfig {
        max_retries: cfg.llm.retry.max_retries,
        initial_backoff_ms: cfg.llm.retry.initial_backoff_ms,
        max_backoff_ms: cfg.llm.retry.max_backoff_ms,
    };
    Ok(Arc::new(RetryingLlmClient::new(client, retry)))
}
