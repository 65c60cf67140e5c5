//! MindBridge - 自主任务执行的认知控制循环
//!
//! 模块划分：
//! - **cognition**: Planner、Error Repair、Evaluator 与提示词
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 数据模型、状态机编排器、错误与恢复、运行监管、组件构建
//! - **intent**: Intent 文本解析
//! - **memory**: 单次运行的 Working Memory
//! - **observability**: 日志初始化
//! - **oracle**: Reasoning Oracle 抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 脚本化）
//! - **tools**: 工具注册表、执行器与内置工具（echo、calculator、shell）

pub mod cognition;
pub mod config;
pub mod core;
pub mod intent;
pub mod memory;
pub mod observability;
pub mod oracle;
pub mod tools;

pub use crate::core::{MindError, Orchestrator, RunOutcome, TerminalState};
pub use crate::intent::{parse_intent, Intent};
