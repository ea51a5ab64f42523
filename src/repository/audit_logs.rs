// 审计日志数据访问 Repository
// 只有 INSERT 和 SELECT，没有 UPDATE/DELETE

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::{AuditLogEntry, SecurityEvent},
    service::error::ServiceError,
};

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: i64,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub session_id: Option<String>,
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn insert(&self, entry: NewAuditLog) -> Result<Uuid, ServiceError>;

    /// 跨用户访问事件写入独立表；blocked 是结构化列，
    /// 真实越权与被拦截的尝试在存储层可区分
    async fn insert_security_event(
        &self,
        attempting_user_id: i64,
        target_user_id: i64,
        resource: &str,
        blocked: bool,
    ) -> Result<Uuid, ServiceError>;

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLogEntry>, ServiceError>;

    async fn list_security_events(
        &self,
        blocked: Option<bool>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError>;
}

pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: i64,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    details: Option<serde_json::Value>,
    session_id: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SecurityEventRow {
    id: Uuid,
    attempting_user_id: i64,
    target_user_id: i64,
    resource: String,
    blocked: bool,
    severity: String,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl AuditLogRepository for PgAuditLogRepository {
    async fn insert(&self, entry: NewAuditLog) -> Result<Uuid, ServiceError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO audit_logs
             (id, user_id, action, resource_type, resource_id, details, session_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.details)
        .bind(&entry.session_id)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn insert_security_event(
        &self,
        attempting_user_id: i64,
        target_user_id: i64,
        resource: &str,
        blocked: bool,
    ) -> Result<Uuid, ServiceError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO security_events
             (id, attempting_user_id, target_user_id, resource, blocked, severity)
             VALUES ($1, $2, $3, $4, $5, 'critical')",
        )
        .bind(id)
        .bind(attempting_user_id)
        .bind(target_user_id)
        .bind(resource)
        .bind(blocked)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLogEntry>, ServiceError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, user_id, action, resource_type, resource_id, details, session_id, created_at
             FROM audit_logs
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| AuditLogEntry {
                id: r.id,
                user_id: r.user_id,
                action: r.action,
                resource_type: r.resource_type,
                resource_id: r.resource_id,
                details: r.details,
                session_id: r.session_id,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn list_security_events(
        &self,
        blocked: Option<bool>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        let rows = sqlx::query_as::<_, SecurityEventRow>(
            "SELECT id, attempting_user_id, target_user_id, resource, blocked, severity, created_at
             FROM security_events
             WHERE ($1::BOOLEAN IS NULL OR blocked = $1)
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(blocked)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SecurityEvent {
                id: r.id,
                attempting_user_id: r.attempting_user_id,
                target_user_id: r.target_user_id,
                resource: r.resource,
                blocked: r.blocked,
                severity: r.severity,
                created_at: r.created_at,
            })
            .collect())
    }
}
