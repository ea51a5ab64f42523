//! 钱包实体
//! 每个用户最多一个活跃钱包；地址一经分配永不转给其他用户

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: i64,
    /// 收款/提现地址
    pub address: String,
    /// 链上余额快照，由后台任务刷新；非账本余额
    pub cached_balance: Decimal,
    pub balance_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
