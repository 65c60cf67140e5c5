//! 核心错误分类与恢复动作
//!
//! 工具层错误（ToolNotFound / ToolExecutionFault）先交给 Error Repair；只有预算耗尽、Oracle 失败或取消
//! 才变成终态。编排器从不把 MindError 抛给调用方，而是折叠进 RunOutcome。

use std::time::Duration;

use thiserror::Error;

use crate::core::types::StepId;
use crate::core::Interrupted;
use crate::intent::IntentError;
use crate::oracle::OracleError;

#[derive(Error, Debug)]
pub enum MindError {
    #[error("Intent malformed: {0}")]
    IntentMalformed(#[from] IntentError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution fault: {0}")]
    ToolExecutionFault(String),

    #[error("Repair exhausted for step {step_id} after {attempts} attempt(s)")]
    RepairExhausted { step_id: StepId, attempts: u32 },

    #[error("Replan exhausted after {0} replan(s)")]
    ReplanExhausted(u32),

    #[error("Cancelled: {0}")]
    Cancelled(#[from] Interrupted),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 恢复引擎根据 Oracle 错误给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 原样重试（网络抖动等）
    Retry,
    /// 等待后重试（限流）
    Backoff(Duration),
    /// 把纠正提示注入下一次请求的上下文后重试（输出格式错误）
    RetryWithHint(String),
    /// 不可重试（请求被拒绝）
    Abort,
}
