//! 运行监管：取消与运行级超时
//!
//! RunGuard 持有 CancellationToken 与可选截止时间；每个挂起点（Oracle 调用、工具调用）都经由
//! `RunGuard::run` 包裹，取消或超时时丢弃正在等待的 future 并返回 Interrupted。

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("run cancelled")]
    Cancelled,
    #[error("run timed out")]
    TimedOut,
}

/// 单次运行的中断监管
#[derive(Debug, Clone)]
pub struct RunGuard {
    cancel_token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunGuard {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            deadline: None,
        }
    }

    /// 从现在起计时的运行级超时；None 表示不限时
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|t| Instant::now() + t);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消（如用户 Ctrl+C）
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// 非阻塞检查：已取消或已超过截止时间
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.cancel_token.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(Interrupted::TimedOut);
        }
        Ok(())
    }

    /// 在取消 / 超时监管下等待 fut；中断时 fut 被丢弃
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::TimedOut),
            out = fut => Ok(out),
        }
    }
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
