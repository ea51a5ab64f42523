//! 服务层错误分类
//! 重试策略依赖这里的分类：只有网络/超时/存储错误可重试

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// 输入形状或范围非法，不重试
    #[error("validation failed: {0}")]
    Validation(String),

    /// 身份与目标用户不匹配，不重试，必须触发安全审计
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 业务规则：余额不足，不重试
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    /// 合规策略拦截，不重试
    #[error("compliance blocked: {0}")]
    ComplianceBlocked(String),

    /// Memo 哈希/校验和/时效校验失败，按疑似篡改处理，不重试
    #[error("memo integrity violation: {0}")]
    MemoIntegrity(String),

    #[error("wallet not found")]
    WalletNotFound,

    #[error("wallet already exists")]
    WalletAlreadyExists,

    #[error("not found: {0}")]
    NotFound(String),

    /// 外部依赖网络错误，可重试
    #[error("network error: {0}")]
    Network(String),

    /// 外部依赖超时，可重试
    #[error("timeout: {0}")]
    Timeout(String),

    /// 存储不可用，可重试；绝不静默返回部分/过期数据
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// 重试组合器据此判断是否值得再试一次
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Network(_) | ServiceError::Timeout(_) | ServiceError::Storage(_)
        )
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ServiceError::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ServiceError::Internal(msg.into())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else {
            ServiceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Validation(format!("invalid payload: {}", err))
    }
}
