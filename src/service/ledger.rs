//! 钱包账本
//! 可用余额是读取时从 completed 交易推导的，这是"还能提多少"的权威答案

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{repository::TransactionRepository, service::error::ServiceError};

#[derive(Debug, Clone, Serialize)]
pub struct BalanceBreakdown {
    pub deposited: Decimal,
    pub withdrawn: Decimal,
    pub available: Decimal,
}

pub struct LedgerService {
    transactions: Arc<dyn TransactionRepository>,
}

impl LedgerService {
    pub fn new(transactions: Arc<dyn TransactionRepository>) -> Self {
        Self { transactions }
    }

    /// available = max(0, completed充值 - completed提现)
    ///
    /// 聚合查询在存储层按 user_id 过滤；存储不可用时向上抛可重试错误，
    /// 不会退回过期或部分数据
    pub async fn get_available_balance(
        &self,
        user_id: i64,
    ) -> Result<BalanceBreakdown, ServiceError> {
        let (deposited, withdrawn) = self.transactions.balance_components(user_id).await?;
        let available = (deposited - withdrawn).max(Decimal::ZERO);

        Ok(BalanceBreakdown {
            deposited,
            withdrawn,
            available,
        })
    }
}
