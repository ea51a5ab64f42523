use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::service::error::ServiceError;

#[derive(Debug, Clone)]
pub enum AppErrorCode {
    // HTTP 基础错误码
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Timeout,
    Network,
    Internal,

    // 业务错误码
    WalletNotFound,
    WalletAlreadyExists,
    InsufficientBalance,
    InvalidAddress,
    InvalidAmount,
    ComplianceBlocked,
    MemoIntegrity,
    JobNotCancellable,
    DatabaseError,
    ValidationFailed,
    ServiceUnavailable,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
    pub status: StatusCode,
    pub trace_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    trace_id: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code_str = match self.code {
            AppErrorCode::BadRequest => "bad_request",
            AppErrorCode::Unauthorized => "unauthorized",
            AppErrorCode::Forbidden => "forbidden",
            AppErrorCode::NotFound => "not_found",
            AppErrorCode::Timeout => "timeout",
            AppErrorCode::Network => "network",
            AppErrorCode::Internal => "internal",

            AppErrorCode::WalletNotFound => "wallet_not_found",
            AppErrorCode::WalletAlreadyExists => "wallet_already_exists",
            AppErrorCode::InsufficientBalance => "insufficient_balance",
            AppErrorCode::InvalidAddress => "invalid_address",
            AppErrorCode::InvalidAmount => "invalid_amount",
            AppErrorCode::ComplianceBlocked => "compliance_blocked",
            AppErrorCode::MemoIntegrity => "memo_integrity",
            AppErrorCode::JobNotCancellable => "job_not_cancellable",
            AppErrorCode::DatabaseError => "database_error",
            AppErrorCode::ValidationFailed => "validation_failed",
            AppErrorCode::ServiceUnavailable => "service_unavailable",
        };
        let body = ErrorBody {
            code: code_str,
            message: &self.message,
            trace_id: self.trace_id.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::BadRequest,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::NotFound,
            message: msg.into(),
            status: StatusCode::NOT_FOUND,
            trace_id: None,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::Unauthorized,
            message: msg.into(),
            status: StatusCode::UNAUTHORIZED,
            trace_id: None,
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::Forbidden,
            message: msg.into(),
            status: StatusCode::FORBIDDEN,
            trace_id: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::Internal,
            message: msg.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            trace_id: None,
        }
    }

    /// 设置追踪ID
    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn wallet_not_found(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::WalletNotFound,
            message: msg.into(),
            status: StatusCode::NOT_FOUND,
            trace_id: None,
        }
    }

    pub fn wallet_already_exists(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::WalletAlreadyExists,
            message: msg.into(),
            status: StatusCode::CONFLICT,
            trace_id: None,
        }
    }

    pub fn insufficient_balance(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InsufficientBalance,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InvalidAddress,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InvalidAmount,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn compliance_blocked(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::ComplianceBlocked,
            message: msg.into(),
            status: StatusCode::FORBIDDEN,
            trace_id: None,
        }
    }

    pub fn memo_integrity(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::MemoIntegrity,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn job_not_cancellable(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::JobNotCancellable,
            message: msg.into(),
            status: StatusCode::CONFLICT,
            trace_id: None,
        }
    }

    pub fn database_error(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::DatabaseError,
            message: msg.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            trace_id: None,
        }
    }

    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::ValidationFailed,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::ServiceUnavailable,
            message: msg.into(),
            status: StatusCode::SERVICE_UNAVAILABLE,
            trace_id: None,
        }
    }
}

// 服务层错误在API边界统一转换，对外消息不携带内部存储细节
impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::validation_failed(msg),
            ServiceError::Unauthorized(_) => {
                Self::forbidden("You are not allowed to access this resource")
            }
            ServiceError::InsufficientBalance {
                available,
                requested,
            } => Self::insufficient_balance(format!(
                "Insufficient balance: available {}, requested {}",
                available, requested
            )),
            ServiceError::ComplianceBlocked(msg) => Self::compliance_blocked(msg),
            ServiceError::MemoIntegrity(_) => {
                Self::memo_integrity("Deposit memo failed verification")
            }
            ServiceError::WalletNotFound => Self::wallet_not_found("Wallet not found"),
            ServiceError::WalletAlreadyExists => {
                Self::wallet_already_exists("Wallet already exists for this user")
            }
            ServiceError::NotFound(msg) => Self::not_found(msg),
            ServiceError::Timeout(_) => Self {
                code: AppErrorCode::Timeout,
                message: "Upstream request timed out, please retry later".into(),
                status: StatusCode::GATEWAY_TIMEOUT,
                trace_id: None,
            },
            ServiceError::Network(_) => Self {
                code: AppErrorCode::Network,
                message: "Upstream service unavailable, please retry later".into(),
                status: StatusCode::BAD_GATEWAY,
                trace_id: None,
            },
            ServiceError::Storage(_) => {
                Self::database_error("Service temporarily unavailable, please retry later")
            }
            ServiceError::Internal(msg) => Self::internal(msg),
        }
    }
}

// 从 serde_json 错误转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("JSON serialization error: {}", err))
    }
}

// 从 SQLx 错误转换
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Resource not found"),
            sqlx::Error::Database(ref db_err) => {
                if let Some(code) = db_err.code() {
                    if code == "23505" {
                        // PostgreSQL unique_violation
                        return Self::bad_request("Resource already exists");
                    }
                }
                Self::database_error("Service temporarily unavailable, please retry later")
            }
            _ => Self::database_error("Service temporarily unavailable, please retry later"),
        }
    }
}

// 从 anyhow 错误转换
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{}", err))
    }
}
