// 账本交易数据访问 Repository
//
// 两个关键点都落在这一层：
// - 余额聚合的 user_id 过滤写死在SQL里
// - 提现的"查余额再记账"在单个数据库事务内完成，按用户行锁串行化

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::{Transaction, TxKind, TxStatus},
    service::error::ServiceError,
};

/// 提现预留结果
#[derive(Debug)]
pub enum WithdrawalReservation {
    /// 余额充足，pending 记录已落库
    Reserved(Transaction),
    /// 余额不足，账本未变更
    Insufficient { available: Decimal },
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// completed 充值总额与 completed 提现总额
    async fn balance_components(&self, user_id: i64) -> Result<(Decimal, Decimal), ServiceError>;

    /// 校验余额并插入 pending 提现，整体在一个事务内。
    ///
    /// 事务先对该用户的钱包行加锁，再计算可动用余额
    /// （completed 充值 - completed 提现 - 未终结的提现），
    /// 因此并发的第二笔请求必然观察到第一笔的 pending 扣减。
    async fn reserve_withdrawal(
        &self,
        user_id: i64,
        amount: Decimal,
        destination: &str,
    ) -> Result<WithdrawalReservation, ServiceError>;

    /// 条件状态迁移；from 不匹配时不更新（防止重复记账与非法迁移）
    async fn transition_status(
        &self,
        tx_id: Uuid,
        from: TxStatus,
        to: TxStatus,
        tx_hash: Option<&str>,
    ) -> Result<bool, ServiceError>;

    /// 按链上交易哈希去重的充值入账；重复哈希返回 false，账本不变
    async fn credit_deposit_once(
        &self,
        user_id: i64,
        amount: Decimal,
        tx_hash: &str,
    ) -> Result<bool, ServiceError>;

    async fn find_by_id_for_user(
        &self,
        tx_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Transaction>, ServiceError>;

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, ServiceError>;

    /// 指定时间之后的交易笔数（AML启发式用）
    async fn count_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, ServiceError>;

    /// 某用户的未终结提现（对账任务用）
    async fn list_open_withdrawals(&self, user_id: i64) -> Result<Vec<Transaction>, ServiceError>;
}

pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TxRow {
    id: Uuid,
    user_id: i64,
    kind: String,
    amount: Decimal,
    status: String,
    tx_hash: Option<String>,
    destination_address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TxRow {
    fn into_domain(self) -> Result<Transaction, ServiceError> {
        let kind = TxKind::parse(&self.kind)
            .ok_or_else(|| ServiceError::internal(format!("unknown tx kind: {}", self.kind)))?;
        let status = TxStatus::parse(&self.status)
            .ok_or_else(|| ServiceError::internal(format!("unknown tx status: {}", self.status)))?;
        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            kind,
            amount: self.amount,
            status,
            tx_hash: self.tx_hash,
            destination_address: self.destination_address,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

const TX_COLUMNS: &str = "id, user_id, kind, amount, status, tx_hash, destination_address, \
                          created_at, updated_at, completed_at";

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn balance_components(&self, user_id: i64) -> Result<(Decimal, Decimal), ServiceError> {
        let (deposited, withdrawn): (Decimal, Decimal) = sqlx::query_as(
            "SELECT
                COALESCE(SUM(amount) FILTER (WHERE kind = 'deposit'), 0),
                COALESCE(SUM(amount) FILTER (WHERE kind = 'withdrawal'), 0)
             FROM transactions
             WHERE user_id = $1 AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((deposited, withdrawn))
    }

    async fn reserve_withdrawal(
        &self,
        user_id: i64,
        amount: Decimal,
        destination: &str,
    ) -> Result<WithdrawalReservation, ServiceError> {
        let mut tx = self.pool.begin().await?;

        // 按用户串行化：锁住钱包行，并发提现在这里排队
        let wallet: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM wallets WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if wallet.is_none() {
            return Err(ServiceError::WalletNotFound);
        }

        // 可动用余额要扣掉尚未终结的提现，否则两笔并发都会基于同一份旧余额通过校验
        let (deposited, withdrawn, open_withdrawals): (Decimal, Decimal, Decimal) = sqlx::query_as(
            "SELECT
                COALESCE(SUM(amount) FILTER (WHERE kind = 'deposit' AND status = 'completed'), 0),
                COALESCE(SUM(amount) FILTER (WHERE kind = 'withdrawal' AND status = 'completed'), 0),
                COALESCE(SUM(amount) FILTER (WHERE kind = 'withdrawal'
                                             AND status IN ('pending', 'processing')), 0)
             FROM transactions
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let spendable = deposited - withdrawn - open_withdrawals;
        if spendable < amount {
            tx.rollback().await?;
            return Ok(WithdrawalReservation::Insufficient {
                available: spendable.max(Decimal::ZERO),
            });
        }

        let row = sqlx::query_as::<_, TxRow>(&format!(
            "INSERT INTO transactions (id, user_id, kind, amount, status, destination_address)
             VALUES ($1, $2, 'withdrawal', $3, 'pending', $4)
             RETURNING {TX_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .bind(destination)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(WithdrawalReservation::Reserved(row.into_domain()?))
    }

    async fn transition_status(
        &self,
        tx_id: Uuid,
        from: TxStatus,
        to: TxStatus,
        tx_hash: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE transactions
             SET status = $3,
                 tx_hash = COALESCE($4, tx_hash),
                 completed_at = CASE WHEN $3 = 'completed' THEN CURRENT_TIMESTAMP
                                     ELSE completed_at END,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND status = $2",
        )
        .bind(tx_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(tx_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn credit_deposit_once(
        &self,
        user_id: i64,
        amount: Decimal,
        tx_hash: &str,
    ) -> Result<bool, ServiceError> {
        // tx_hash 上的唯一索引是"恰好一次入账"的保证
        let result = sqlx::query(
            "INSERT INTO transactions (id, user_id, kind, amount, status, tx_hash, completed_at)
             VALUES ($1, $2, 'deposit', $3, 'completed', $4, CURRENT_TIMESTAMP)
             ON CONFLICT (tx_hash) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .bind(tx_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id_for_user(
        &self,
        tx_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Transaction>, ServiceError> {
        let row = sqlx::query_as::<_, TxRow>(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE id = $1 AND user_id = $2"
        ))
        .bind(tx_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TxRow::into_domain).transpose()
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, ServiceError> {
        let rows = sqlx::query_as::<_, TxRow>(&format!(
            "SELECT {TX_COLUMNS} FROM transactions
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TxRow::into_domain).collect()
    }

    async fn count_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND created_at > $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list_open_withdrawals(&self, user_id: i64) -> Result<Vec<Transaction>, ServiceError> {
        let rows = sqlx::query_as::<_, TxRow>(&format!(
            "SELECT {TX_COLUMNS} FROM transactions
             WHERE user_id = $1 AND kind = 'withdrawal' AND status IN ('pending', 'processing')
             ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TxRow::into_domain).collect()
    }
}
