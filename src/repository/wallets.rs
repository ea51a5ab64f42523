// 钱包数据访问 Repository
// 所有查询在SQL层按 user_id 过滤，隔离不依赖应用层代码

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{domain::Wallet, service::error::ServiceError};

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn find_by_user(&self, user_id: i64) -> Result<Option<Wallet>, ServiceError>;

    /// 创建钱包；users.id 外键 + user_id 唯一约束保证一人一钱包
    async fn insert(&self, user_id: i64, address: &str) -> Result<Wallet, ServiceError>;

    /// 刷新链上余额快照
    async fn update_cached_balance(
        &self,
        user_id: i64,
        balance: Decimal,
    ) -> Result<(), ServiceError>;
}

pub struct PgWalletRepository {
    pool: PgPool,
}

impl PgWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    user_id: i64,
    address: String,
    cached_balance: Decimal,
    balance_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            id: row.id,
            user_id: row.user_id,
            address: row.address,
            cached_balance: row.cached_balance,
            balance_synced_at: row.balance_synced_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl WalletRepository for PgWalletRepository {
    async fn find_by_user(&self, user_id: i64) -> Result<Option<Wallet>, ServiceError> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT id, user_id, address, cached_balance, balance_synced_at, created_at
             FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, user_id: i64, address: &str) -> Result<Wallet, ServiceError> {
        let result = sqlx::query_as::<_, WalletRow>(
            "INSERT INTO wallets (id, user_id, address, cached_balance)
             VALUES ($1, $2, $3, 0)
             RETURNING id, user_id, address, cached_balance, balance_synced_at, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(address)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(ServiceError::WalletAlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_cached_balance(
        &self,
        user_id: i64,
        balance: Decimal,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE wallets
             SET cached_balance = $2, balance_synced_at = CURRENT_TIMESTAMP
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(balance)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
