//! 用户通知服务
//! fire-and-forget：通知失败绝不回滚触发它的资金状态变更

use sqlx::PgPool;

/// 通知投递接口
pub trait Notifier: Send + Sync {
    fn notify_user(&self, user_id: i64, kind: &str, body: String);
}

pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Notifier for NotificationService {
    /// 投递一条用户通知（尽力而为）
    fn notify_user(&self, user_id: i64, kind: &str, body: String) {
        let pool = self.pool.clone();
        let kind = kind.to_string();
        tokio::spawn(async move {
            let result = sqlx::query(
                "INSERT INTO notifications (id, user_id, kind, body)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(uuid::Uuid::new_v4())
            .bind(user_id)
            .bind(&kind)
            .bind(&body)
            .execute(&pool)
            .await;

            if let Err(e) = result {
                tracing::warn!(user_id, kind, error = %e, "Failed to deliver notification");
            }
        });
    }
}
