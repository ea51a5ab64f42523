//! 认证中间件
//! 验证Bearer Token并把认证上下文注入请求扩展
//! 这是唯一的身份解析路径，后续组件不得从客户端字段重推身份

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::{api::middleware::trace::TraceId, app_state::AppState, error::AppError};

/// 认证信息（从Token中提取）
#[derive(Clone)]
pub struct AuthInfo {
    pub user_id: i64,
    pub username: String,
    pub auth_method: String,
    pub role: String,
}

/// 认证中间件
///
/// 认证流程：
/// 1. 提取 Authorization 头
/// 2. 验证 Bearer Token 格式
/// 3. 验证 JWT 签名与过期时间
/// 4. 提取 user_id / username / role 注入请求扩展
pub async fn auth_middleware(
    State(_st): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // CORS 预检请求（OPTIONS）直接放行，不需要认证
    if req.method() == axum::http::Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    // 认证失败的响应体带上追踪ID，便于把报障对回服务端日志
    let trace_id = req.extensions().get::<TraceId>().map(|t| t.0.clone());
    let tag = |err: AppError| match trace_id.clone() {
        Some(id) => err.with_trace_id(id),
        None => err,
    };

    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tag(AppError {
                code: crate::error::AppErrorCode::Unauthorized,
                message: "Authorization header required".into(),
                status: StatusCode::UNAUTHORIZED,
                trace_id: None,
            })
        })?;

    if !auth_header.starts_with("Bearer ") {
        return Err(tag(AppError::unauthorized(
            "Invalid authorization header format",
        )));
    }

    let token = auth_header[7..].trim();

    let claims = crate::infrastructure::jwt::verify_token(token)
        .map_err(|e| tag(AppError::unauthorized(format!("Invalid token: {}", e))))?;

    let user_id = claims
        .user_id()
        .map_err(|_| tag(AppError::unauthorized("Invalid user_id in token")))?;

    let auth_info = AuthInfo {
        user_id,
        username: claims.username.clone(),
        auth_method: claims.auth_method.clone(),
        role: claims.role.clone(),
    };

    req.extensions_mut().insert(auth_info);
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// 认证信息提取器（用于handler函数）
#[derive(Clone)]
pub struct AuthInfoExtractor(pub AuthInfo);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthInfoExtractor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let auth_info = parts
            .extensions
            .get::<AuthInfo>()
            .ok_or_else(|| AppError::unauthorized("Not authenticated"))?
            .clone();
        Ok(AuthInfoExtractor(auth_info))
    }
}
