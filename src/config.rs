//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MINDBRIDGE__*` 覆盖（双下划线表示嵌套，如 `MINDBRIDGE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、工作目录
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 工作目录，未设置时用当前目录；prompts/ 相对于 <workspace_root>/config 查找
    pub workspace_root: Option<PathBuf>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    /// 省略时按后端取默认模型（openai: gpt-4o-mini，deepseek: deepseek-chat）
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次 LLM 请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [orchestrator] 段：修复 / 重规划预算、Oracle 重试次数、整体运行超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_repair_attempts: u32,
    pub max_replans: u32,
    /// 每次 Oracle 调用在格式错误 / 不可用时的额外重试次数
    pub oracle_retries: u32,
    /// 整个运行的超时（秒），0 或缺省表示不限
    pub run_timeout_secs: Option<u64>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_repair_attempts: 3,
            max_replans: 3,
            oracle_retries: 2,
            run_timeout_secs: None,
        }
    }
}

impl OrchestratorSection {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// [tools] 段：工具超时、Shell 白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub shell: ShellSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            shell: ShellSection::default(),
        }
    }
}

/// [tools.shell] 段：是否启用、允许执行的命令名（仅首词）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub enabled: bool,
    pub allowed_commands: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_commands: ["ls", "cat", "head", "tail", "wc", "grep", "echo", "date"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MINDBRIDGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在，可覆盖前面的键）
/// 3. 最后叠加环境变量 MINDBRIDGE__*（双下划线表示嵌套键）
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

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MINDBRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.orchestrator.max_repair_attempts, 3);
        assert_eq!(config.orchestrator.max_replans, 3);
        assert_eq!(config.orchestrator.oracle_retries, 2);
        assert_eq!(config.tools.tool_timeout_secs, 30);
        assert_eq!(config.llm.provider, "mock");
        assert!(config.llm.model.is_none());
        assert!(!config.tools.shell.enabled);
        assert!(config.orchestrator.run_timeout().is_none());
    }

    #[test]
    fn test_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[orchestrator]\nmax_replans = 1\nrun_timeout_secs = 90\n\n[tools.shell]\nenabled = true"
        )
        .unwrap();
        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.orchestrator.max_replans, 1);
        assert_eq!(config.orchestrator.max_repair_attempts, 3);
        assert_eq!(config.orchestrator.run_timeout(), Some(Duration::from_secs(90)));
        assert!(config.tools.shell.enabled);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(PathBuf::from("/nonexistent/mindbridge.toml"))).is_err());
    }
}
