//! 集成测试辅助
//! 数据库相关测试需要 TEST_DATABASE_URL 指向可用的Postgres，
//! 并用 `cargo test -- --ignored` 显式运行

use giftmarket::infrastructure::db::PgPool;

pub fn test_database_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost:5432/giftmarket_test".into())
}

/// 连接测试库并保证迁移已执行
pub async fn create_test_pool() -> PgPool {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_database_url())
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations on test database");

    pool
}

/// 清掉某个测试用户的全部数据再重建用户行，保证用例可重复执行
pub async fn reset_user(pool: &PgPool, user_id: i64) {
    for table in ["transactions", "jobs", "wallets", "compliance_records"] {
        sqlx::query(&format!("DELETE FROM {} WHERE user_id = $1", table))
            .bind(user_id)
            .execute(pool)
            .await
            .expect("cleanup failed");
    }
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .expect("cleanup failed");

    sqlx::query(
        "INSERT INTO users (id, display_name, username, auth_method)
         VALUES ($1, $2, $3, 'telegram')",
    )
    .bind(user_id)
    .bind(format!("test-user-{}", user_id))
    .bind(format!("tester{}", user_id))
    .execute(pool)
    .await
    .expect("failed to seed test user");
}
