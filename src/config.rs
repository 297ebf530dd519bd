//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `VOLTDESK__*` 覆盖（双下划线表示嵌套，如 `VOLTDESK__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub checkpoint: CheckpointSection,
}

/// [app] 段：应用名、会话导出目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 每轮结束后把可读会话记录写到该目录；未设置则不导出
    pub export_dir: Option<PathBuf>,
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / ollama / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    #[serde(default)]
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [llm.retry] 段：限流 / 网络错误的指数退避
#[derive(Debug, Clone, Deserialize)]
pub struct LlmRetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

/// [agent] 段：空回复重试上限、单步跳数上限、兜底回复
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单次 respond 内模型调用的最大次数（含首次）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 一步内 Agent / 工具 / 过渡节点的最大跳数
    #[serde(default = "default_max_step_hops")]
    pub max_step_hops: u32,
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_step_hops: default_max_step_hops(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_step_hops() -> u32 {
    crate::core::DEFAULT_MAX_STEP_HOPS
}

fn default_fallback_reply() -> String {
    "Sorry, I couldn't produce an answer just now. Could you rephrase your request?".to_string()
}

/// [tools] 段：工具超时、业务数据库路径
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            database_path: default_database_path(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data.db")
}

/// 检查点后端
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    File,
    Sqlite,
    Memory,
}

/// [checkpoint] 段
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointSection {
    #[serde(default)]
    pub backend: CheckpointBackend,
    /// file 后端：<dir>/<thread_id>/<timestamp>.json
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,
    /// sqlite 后端的数据库文件
    #[serde(default = "default_checkpoint_db")]
    pub database_path: PathBuf,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            dir: default_checkpoint_dir(),
            database_path: default_checkpoint_db(),
        }
    }
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_checkpoint_db() -> PathBuf {
    PathBuf::from("checkpoints.db")
}

/// 从 config 目录加载配置，环境变量 VOLTDESK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 VOLTDESK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("VOLTDESK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
