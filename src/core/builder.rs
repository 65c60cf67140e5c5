//! 组件构建器：统一的运行初始化逻辑
//!
//! 从配置装配工具注册表、Reasoning Oracle（openai / deepseek / mock）与编排器；
//! 提示词可由 config/prompts/*.md 覆盖。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cognition::Prompts;
use crate::config::AppConfig;
use crate::core::{MindError, Orchestrator, OrchestratorSettings};
use crate::intent::{parse_intent_file, Intent};
use crate::oracle::{
    create_deepseek_client, LlmOracle, MockOracle, OpenAiClient, ReasoningOracle, OPENAI_DEFAULT_MODEL,
};
use crate::tools::{CalculatorTool, EchoTool, ShellTool, ToolRegistry};

/// 构建器：持有配置、工作目录与各阶段提示词
pub struct MindBridgeBuilder {
    config: AppConfig,
    workspace: PathBuf,
    prompts: Prompts,
}

impl MindBridgeBuilder {
    pub fn new(config: AppConfig, workspace: PathBuf) -> Self {
        Self {
            config,
            workspace,
            prompts: Prompts::default(),
        }
    }

    /// 从 prompts 目录加载提示词（工作目录下的 config/prompts 优先）
    pub fn with_prompts_from_dir(mut self) -> Self {
        let candidates = [
            self.workspace.join("config/prompts"),
            PathBuf::from("config/prompts"),
            PathBuf::from("../config/prompts"),
        ];
        if let Some(dir) = candidates.iter().find(|p| p.is_dir()) {
            tracing::debug!(dir = %dir.display(), "loading prompts");
            self.prompts = Prompts::load_from_dir(dir);
        }
        self
    }

    /// 每次运行构建一份新的注册表，工具的作用域资源不会跨运行共享
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        tools.register(CalculatorTool);
        if self.config.tools.shell.enabled {
            tools.register(ShellTool::new(self.config.tools.shell.allowed_commands.clone()));
        }
        tools
    }

    /// 按 llm.provider 选择 oracle 后端；真实后端缺少 API Key 时报配置错误
    pub fn build_oracle(&self) -> Result<Arc<dyn ReasoningOracle>, MindError> {
        let llm = &self.config.llm;
        let provider = llm.provider.to_lowercase();
        match provider.as_str() {
            "mock" => {
                tracing::info!("Using Mock oracle");
                Ok(Arc::new(MockOracle))
            }
            "deepseek" => {
                if std::env::var("DEEPSEEK_API_KEY").is_err() && std::env::var("OPENAI_API_KEY").is_err() {
                    return Err(MindError::ConfigError(
                        "provider 'deepseek' needs DEEPSEEK_API_KEY".to_string(),
                    ));
                }
                let client = create_deepseek_client(llm.model.as_deref())
                    .with_request_timeout(llm.timeouts.request);
                tracing::info!(model = %client.model(), "Using DeepSeek oracle");
                Ok(Arc::new(LlmOracle::new(Arc::new(client))))
            }
            "openai" => {
                let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
                    MindError::ConfigError("provider 'openai' needs OPENAI_API_KEY".to_string())
                })?;
                let model = llm.model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL);
                let client = OpenAiClient::new(llm.base_url.as_deref(), model, Some(api_key.as_str()))
                    .with_request_timeout(llm.timeouts.request);
                tracing::info!(model = %client.model(), "Using OpenAI-compatible oracle");
                Ok(Arc::new(LlmOracle::new(Arc::new(client))))
            }
            other => Err(MindError::ConfigError(format!(
                "unknown llm provider '{}', expected openai, deepseek or mock",
                other
            ))),
        }
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings::from_config(&self.config, self.prompts.clone())
    }

    pub fn build_orchestrator(&self, oracle: Arc<dyn ReasoningOracle>) -> Orchestrator {
        let registry = Arc::new(self.build_tool_registry());
        tracing::debug!(tools = ?registry.tool_names(), "tool registry ready");
        Orchestrator::new(oracle, registry, self.settings())
    }

    /// 读取 Intent 文件；相对路径按工作目录解析
    pub fn load_intent(&self, path: &Path) -> Result<Intent, MindError> {
        let resolved = if path.is_relative() && !path.exists() {
            self.workspace.join(path)
        } else {
            path.to_path_buf()
        };
        Ok(parse_intent_file(&resolved)?)
    }
}

/// 便捷函数：加载配置并创建构建器
pub fn create_builder(config_path: Option<PathBuf>) -> Result<MindBridgeBuilder, MindError> {
    let config =
        crate::config::load_config(config_path).map_err(|e| MindError::ConfigError(e.to_string()))?;

    let workspace = match config.app.workspace_root.clone() {
        Some(root) => root,
        None => std::env::current_dir().map_err(|e| MindError::ConfigError(e.to_string()))?,
    };
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    Ok(MindBridgeBuilder::new(config, workspace).with_prompts_from_dir())
}
