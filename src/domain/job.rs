//! 后台任务实体
//! payload 必须带 user_scoped 标记和归属用户ID，Worker执行前双重校验

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务类型：每种类型一个Worker池
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    WalletCreate,
    DepositConfirm,
    BalanceRefresh,
    WithdrawalReconcile,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::WalletCreate => "wallet_create",
            JobType::DepositConfirm => "deposit_confirm",
            JobType::BalanceRefresh => "balance_refresh",
            JobType::WithdrawalReconcile => "withdrawal_reconcile",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wallet_create" => Some(JobType::WalletCreate),
            "deposit_confirm" => Some(JobType::DepositConfirm),
            "balance_refresh" => Some(JobType::BalanceRefresh),
            "withdrawal_reconcile" => Some(JobType::WithdrawalReconcile),
            _ => None,
        }
    }

    pub fn all() -> [JobType; 4] {
        [
            JobType::WalletCreate,
            JobType::DepositConfirm,
            JobType::BalanceRefresh,
            JobType::WithdrawalReconcile,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "retrying" => Some(JobStatus::Retrying),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: i64,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// payload 归属校验：user_id 一致且带 user_scoped 标记
    /// 存储损坏或编程错误导致的错配都在这里拦下
    pub fn payload_matches_owner(&self) -> bool {
        let scoped = self
            .payload
            .get("user_scoped")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let payload_user = self.payload.get("user_id").and_then(|v| v.as_i64());
        scoped && payload_user == Some(self.user_id)
    }
}
