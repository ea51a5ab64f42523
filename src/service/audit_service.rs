//! 审计日志服务
//! 追加写入；普通审计是尽力而为的异步写，写失败只记录本地日志，
//! 绝不让审计本身变成被审计功能的故障点

use std::sync::Arc;

use uuid::Uuid;

use crate::repository::{audit_logs::NewAuditLog, AuditLogRepository};

pub struct AuditService {
    logs: Arc<dyn AuditLogRepository>,
}

impl AuditService {
    pub fn new(logs: Arc<dyn AuditLogRepository>) -> Self {
        Self { logs }
    }

    /// 记录审计事件（fire-and-forget）
    pub fn log(
        &self,
        user_id: i64,
        action: &str,
        resource_type: &str,
        resource_id: Option<String>,
        details: Option<serde_json::Value>,
    ) {
        let logs = self.logs.clone();
        let entry = NewAuditLog {
            user_id,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            details,
            session_id: None,
        };
        tokio::spawn(async move {
            if let Err(e) = logs.insert(entry).await {
                tracing::warn!(user_id, error = %e, "Failed to write audit log");
            }
        });
    }

    /// 记录跨用户访问安全事件
    ///
    /// 同步等待写入：安全响应排查依赖这条记录。
    /// 写失败仍不向调用方传播，但以 error 级别落本地日志。
    pub async fn log_cross_user_access(
        &self,
        attempting_user_id: i64,
        target_user_id: i64,
        resource: &str,
        blocked: bool,
    ) -> Option<Uuid> {
        tracing::warn!(
            attempting_user_id,
            target_user_id,
            resource,
            blocked,
            "Cross-user access attempt detected"
        );
        match self
            .logs
            .insert_security_event(attempting_user_id, target_user_id, resource, blocked)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(
                    attempting_user_id,
                    target_user_id,
                    error = %e,
                    "Failed to persist security event"
                );
                None
            }
        }
    }
}
