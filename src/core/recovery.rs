//! 错误恢复引擎
//!
//! 根据 OracleError 类型返回 RecoveryAction，供 Planner / Error Repair / Evaluator 的有界重试决定
//! 是原样重试、退避、带纠正提示重试还是放弃。

use std::time::Duration;

use crate::core::RecoveryAction;
use crate::oracle::OracleError;

/// 限流时未给出等待时间时的默认退避
const DEFAULT_BACKOFF_MS: u64 = 1_000;
/// 单次退避上限，避免被异常的 retry-after 拖住整个运行
const MAX_BACKOFF_MS: u64 = 30_000;

/// 语义化错误恢复：将 Oracle 错误映射为可执行动作
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &OracleError) -> RecoveryAction {
        match err {
            OracleError::Unavailable(_) => RecoveryAction::Retry,
            OracleError::RateLimited { retry_after_ms } => {
                let ms = retry_after_ms
                    .unwrap_or(DEFAULT_BACKOFF_MS)
                    .min(MAX_BACKOFF_MS);
                RecoveryAction::Backoff(Duration::from_millis(ms))
            }
            OracleError::Unparseable { reason, .. } => RecoveryAction::RetryWithHint(format!(
                "Your previous reply was not valid JSON ({reason}). \
                 Reply with exactly one JSON object and nothing else: no Markdown, no prose."
            )),
            OracleError::InvalidShape(reason) => RecoveryAction::RetryWithHint(format!(
                "Your previous reply did not match the required schema: {reason}. \
                 Reply with one JSON object that follows the schema given in the context."
            )),
            OracleError::Rejected(_) => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_unparseable_gives_hint() {
        let engine = RecoveryEngine::new();
        let err = OracleError::Unparseable {
            raw: "sure! here is the plan".to_string(),
            reason: "no JSON object found".to_string(),
        };
        match engine.handle(&err) {
            RecoveryAction::RetryWithHint(msg) => assert!(msg.contains("JSON")),
            other => panic!("Expected RetryWithHint, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_invalid_shape_mentions_reason() {
        let engine = RecoveryEngine::new();
        let err = OracleError::InvalidShape("missing field `steps`".to_string());
        match engine.handle(&err) {
            RecoveryAction::RetryWithHint(msg) => assert!(msg.contains("missing field `steps`")),
            other => panic!("Expected RetryWithHint, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_unavailable_retries() {
        let engine = RecoveryEngine::new();
        let err = OracleError::Unavailable("connection reset".to_string());
        assert_eq!(engine.handle(&err), RecoveryAction::Retry);
    }

    #[test]
    fn test_recovery_rate_limited_caps_backoff() {
        let engine = RecoveryEngine::new();
        let err = OracleError::RateLimited {
            retry_after_ms: Some(600_000),
        };
        assert_eq!(
            engine.handle(&err),
            RecoveryAction::Backoff(Duration::from_millis(MAX_BACKOFF_MS))
        );
        let err = OracleError::RateLimited { retry_after_ms: None };
        assert_eq!(
            engine.handle(&err),
            RecoveryAction::Backoff(Duration::from_millis(DEFAULT_BACKOFF_MS))
        );
    }

    #[test]
    fn test_recovery_rejected_aborts() {
        let engine = RecoveryEngine::new();
        let err = OracleError::Rejected("invalid api key".to_string());
        assert_eq!(engine.handle(&err), RecoveryAction::Abort);
    }
}
