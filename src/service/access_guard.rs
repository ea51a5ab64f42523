//! 所有权断言
//! 每个触碰钱包数据的操作都要先过这里，没有旁路

use std::sync::Arc;

use crate::service::{audit_service::AuditService, error::ServiceError};

pub struct AccessGuard {
    audit: Arc<AuditService>,
}

impl AccessGuard {
    pub fn new(audit: Arc<AuditService>) -> Self {
        Self { audit }
    }

    /// 调用方身份必须等于目标用户
    ///
    /// 不匹配时除了返回错误，还会落一条 critical 安全事件，
    /// 而不是悄悄拒绝
    pub async fn assert_owner(
        &self,
        caller_id: i64,
        target_user_id: i64,
        resource: &str,
    ) -> Result<(), ServiceError> {
        if caller_id == target_user_id {
            return Ok(());
        }

        self.audit
            .log_cross_user_access(caller_id, target_user_id, resource, true)
            .await;

        Err(ServiceError::unauthorized(format!(
            "caller {} attempted to access data of user {}",
            caller_id, target_user_id
        )))
    }
}
