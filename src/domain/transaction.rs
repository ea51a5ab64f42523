//! 账本交易实体
//! 余额是读取时从 completed 记录推导出来的，不在任何地方单独累加

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 交易类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Withdrawal,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::Withdrawal => "withdrawal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TxKind::Deposit),
            "withdrawal" => Some(TxKind::Withdrawal),
            _ => None,
        }
    }
}

/// 交易状态机
/// pending -> processing/confirmed/completed，终态 completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Processing,
    Confirmed,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Processing => "processing",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TxStatus::Pending),
            "processing" => Some(TxStatus::Processing),
            "confirmed" => Some(TxStatus::Confirmed),
            "completed" => Some(TxStatus::Completed),
            "failed" => Some(TxStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Completed | TxStatus::Failed)
    }

    /// 合法状态迁移；终态不可再变更
    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        match self {
            TxStatus::Pending => matches!(
                next,
                TxStatus::Processing | TxStatus::Confirmed | TxStatus::Completed | TxStatus::Failed
            ),
            TxStatus::Processing => matches!(next, TxStatus::Completed | TxStatus::Failed),
            TxStatus::Confirmed => matches!(next, TxStatus::Completed | TxStatus::Failed),
            TxStatus::Completed | TxStatus::Failed => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: i64,
    pub kind: TxKind,
    pub amount: Decimal,
    pub status: TxStatus,
    /// 链上交易哈希（充值去重键）
    pub tx_hash: Option<String>,
    /// 提现目标地址
    pub destination_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
