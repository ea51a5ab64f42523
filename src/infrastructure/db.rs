//! SQLx Postgres 连接池初始化与健康检查
//!
//! 用法：
//! let pool = init_pool(&config.database).await?;
//! health_check(&pool).await?;

use std::time::Duration;

use anyhow::Result;

use crate::config::DatabaseConfig;

pub type PgPool = sqlx::Pool<sqlx::Postgres>;

/// 初始化连接池
pub async fn init_pool(cfg: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool_opts = sqlx::postgres::PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .min_connections(cfg.min_connections)
        .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(cfg.idle_timeout_secs))
        // 确保连接在使用前是有效的，避免使用已断开的连接
        .test_before_acquire(true);

    let pool = pool_opts.connect(&cfg.url).await.map_err(|e| {
        tracing::error!("Failed to connect to database: {}", e);
        e
    })?;

    health_check(&pool).await?;

    Ok(pool)
}

/// 健康检查：简单查询验证连接与数据库响应
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    let _: (chrono::DateTime<chrono::Utc>,) = sqlx::query_as("SELECT CURRENT_TIMESTAMP")
        .fetch_one(pool)
        .await?;
    Ok(())
}
