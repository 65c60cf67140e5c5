//! 有界重试：Planner / Error Repair / Evaluator 共用
//!
//! 每次失败交给 RecoveryEngine 决定动作；格式类错误把纠正提示写入 context 的 `correction` 字段。

use serde_json::Value;

use crate::core::{RecoveryAction, RecoveryEngine};
use crate::oracle::{OracleError, ReasoningOracle};

/// 调用 oracle 并用 `parse` 校验结果；最多额外重试 `max_retries` 次
pub async fn ask_with_retries<T, F>(
    oracle: &dyn ReasoningOracle,
    recovery: &RecoveryEngine,
    prompt: &str,
    mut context: Value,
    max_retries: u32,
    parse: F,
) -> Result<T, OracleError>
where
    F: Fn(Value) -> Result<T, OracleError>,
{
    let mut attempt = 0u32;
    loop {
        let err = match oracle.complete(prompt, &context).await.and_then(&parse) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= max_retries {
            tracing::warn!(error = %err, attempts = attempt + 1, "oracle retries exhausted");
            return Err(err);
        }
        attempt += 1;

        match recovery.handle(&err) {
            RecoveryAction::Abort => {
                tracing::warn!(error = %err, "oracle error is not retryable");
                return Err(err);
            }
            RecoveryAction::Retry => {}
            RecoveryAction::Backoff(delay) => tokio::time::sleep(delay).await,
            RecoveryAction::RetryWithHint(hint) => {
                if let Value::Object(map) = &mut context {
                    map.insert("correction".to_string(), Value::String(hint));
                }
            }
        }
        tracing::info!(error = %err, attempt, max_retries, "retrying oracle call");
    }
}
