//! 审计日志实体
//! 追加写入，正常操作下永不修改或删除

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: i64,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 跨用户访问安全事件
/// blocked=false 表示实际越权已经发生，必须能在存储层与被拦截的尝试区分开
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub attempting_user_id: i64,
    pub target_user_id: i64,
    pub resource: String,
    pub blocked: bool,
    pub severity: String,
    pub created_at: DateTime<Utc>,
}
