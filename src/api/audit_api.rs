//! 审计查询API
//! 用户只能看自己的审计轨迹；安全事件供安全响应人员（admin角色）排查

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::{
        middleware::auth::AuthInfoExtractor,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    error::AppError,
    repository::AuditLogRepository,
};

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SecurityEventQuery {
    /// 只看被拦截/未被拦截的事件；缺省两者都返回
    pub blocked: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SecurityEventResponse {
    pub id: String,
    pub attempting_user_id: i64,
    pub target_user_id: i64,
    pub resource: String,
    pub blocked: bool,
    pub severity: String,
    pub created_at: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/logs", get(list_own_logs))
        .route("/security-events", get(list_security_events))
}

/// GET /api/audit/logs
pub async fn list_own_logs(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLogResponse>>>, AppError> {
    let logs = state
        .audit_logs
        .list_by_user(
            auth.0.user_id,
            query.limit.unwrap_or(100).clamp(1, 500),
            query.offset.unwrap_or(0).max(0),
        )
        .await?;

    success_response(
        logs.into_iter()
            .map(|l| AuditLogResponse {
                id: l.id.to_string(),
                action: l.action,
                resource_type: l.resource_type,
                resource_id: l.resource_id,
                details: l.details,
                created_at: l.created_at.to_rfc3339(),
            })
            .collect(),
    )
}

/// GET /api/audit/security-events
///
/// blocked=false 的记录意味着实际越权已发生，排查时优先处理
pub async fn list_security_events(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
    Query(query): Query<SecurityEventQuery>,
) -> Result<Json<ApiResponse<Vec<SecurityEventResponse>>>, AppError> {
    if auth.0.role != "admin" {
        return Err(AppError::forbidden(
            "Security events are restricted to responders",
        ));
    }

    let events = state
        .audit_logs
        .list_security_events(query.blocked, query.limit.unwrap_or(100).clamp(1, 500))
        .await?;

    success_response(
        events
            .into_iter()
            .map(|e| SecurityEventResponse {
                id: e.id.to_string(),
                attempting_user_id: e.attempting_user_id,
                target_user_id: e.target_user_id,
                resource: e.resource,
                blocked: e.blocked,
                severity: e.severity,
                created_at: e.created_at.to_rfc3339(),
            })
            .collect(),
    )
}
