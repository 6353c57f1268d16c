//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WASP__*` 覆盖（双下划线表示嵌套，如 `WASP__LLM__MODEL=phi3.5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub guardian: GuardianSection,
}

/// [app] 段：应用名、项目根目录、任务目录文件
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 工具与任务可见的项目根目录，未设置时用当前目录
    pub project_root: Option<PathBuf>,
    /// 任务目录 TOML 文件，未设置或不存在时使用内置目录
    pub catalog_path: Option<PathBuf>,
}

/// [llm] 段：Ollama 端点、模型与生成参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：ollama / mock
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    /// 单次请求超时（秒），同时是 AgentTask 的墙钟预算
    pub request_timeout_secs: u64,
    /// 批量任务的生成长度上限（token 数）
    pub task_num_predict: u32,
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://127.0.0.1:11434".to_string(),
            model: "phi3.5:3.8b-mini-instruct-fp16".to_string(),
            request_timeout_secs: 120,
            task_num_predict: 500,
            temperature: 0.7,
        }
    }
}

/// [tools] 段：bash 超时与 grep 匹配上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// bash 工具默认超时（秒），工具调用可自带 timeout 覆盖
    pub bash_timeout_secs: u64,
    /// 非 bash 工具的派发超时（秒）
    pub tool_timeout_secs: u64,
    /// grep 工具返回的最大匹配条数
    pub grep_max_matches: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            bash_timeout_secs: 120,
            tool_timeout_secs: 30,
            grep_max_matches: 200,
        }
    }
}

/// [chat] 段：交互路径的轮数与历史上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    /// 单次提问内最大工具轮数，超出返回已累计文本
    pub max_tool_iterations: usize,
    /// 保留的历史交换轮数（FIFO 截断）
    pub max_history_turns: usize,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            max_tool_iterations: 5,
            max_history_turns: 5,
        }
    }
}

/// [orchestrator] 段：并发上限、周期超时、休眠与退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 每周期最多并发的 AgentTask 数
    pub max_parallel: usize,
    /// 单周期整体超时（秒），超时的任务被放弃且不持久化
    pub cycle_timeout_secs: u64,
    /// 周期之间的休眠（秒）
    pub sleep_secs: u64,
    /// 周期故障后的退避（秒）
    pub backoff_secs: u64,
    /// 执行记录数据库路径
    pub db_path: PathBuf,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_parallel: 2,
            cycle_timeout_secs: 600,
            sleep_secs: 600,
            backoff_secs: 60,
            db_path: PathBuf::from("data/wasp.db"),
        }
    }
}

/// [guardian] 段：检查间隔、陈旧阈值与重启命令
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardianSection {
    /// 两次检查之间的间隔（秒）
    pub check_interval_secs: u64,
    /// 最新执行记录超过该秒数视为系统停滞
    pub staleness_threshold_secs: i64,
    /// 重启后恢复检查前的宽限期（秒）
    pub grace_secs: u64,
    /// 被监管进程的进程名（pgrep -x / pkill -x）
    pub process_name: String,
    /// 重启命令（argv 形式）
    pub spawn_command: Vec<String>,
    /// 被拉起进程的输出日志
    pub child_log_path: PathBuf,
}

impl Default for GuardianSection {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            staleness_threshold_secs: 15 * 60,
            grace_secs: 10,
            process_name: "wasp".to_string(),
            spawn_command: vec!["wasp".to_string()],
            child_log_path: PathBuf::from("data/wasp-child.log"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            tools: ToolsSection::default(),
            chat: ChatSection::default(),
            orchestrator: OrchestratorSection::default(),
            guardian: GuardianSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 WASP__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WASP__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("WASP")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_limits() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_parallel, 2);
        assert_eq!(cfg.orchestrator.cycle_timeout_secs, 600);
        assert_eq!(cfg.chat.max_tool_iterations, 5);
        assert_eq!(cfg.guardian.staleness_threshold_secs, 900);
    }

    #[test]
    fn load_without_files_uses_defaults() {
        let cfg = load_config(Some(PathBuf::from("/nonexistent/wasp.toml")))
            .unwrap_or_default();
        assert_eq!(cfg.llm.provider, "ollama");
    }
}
