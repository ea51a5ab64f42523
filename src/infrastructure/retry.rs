//! 统一重试组合器
//! 钱包服务、提现提交、链上客户端和后台Worker共用同一套退避逻辑，
//! 不在调用点各写一份

use std::{future::Future, time::Duration};

use tokio::time::sleep;

use crate::service::error::ServiceError;

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 初始退避时间（毫秒）
    pub base_delay_ms: u64,
    /// 退避倍数
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 第 attempt 次失败后的等待时间（attempt 从 1 开始）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.base_delay_ms as f64 * factor) as u64)
    }
}

/// 带退避的重试执行
///
/// 只对 `ServiceError::is_retryable()` 为真的错误重试；
/// 校验/授权/合规类错误第一次就原样返回
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, will retry"
                );
                sleep(delay).await;
            }
            Err(err) => {
                if attempt > 1 {
                    tracing::error!(
                        op = op_name,
                        attempt,
                        error = %err,
                        "Operation failed after retries"
                    );
                }
                return Err(err);
            }
        }
    }
}
