//! 认证API
//! 平台侧已完成登录校验，这里把平台身份换成本服务的访问Token；
//! 用户在首次认证时落库

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::response::{success_response, ApiResponse},
    app_state::AppState,
    error::AppError,
    repository::{users::UpsertUserParams, UserRepository},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// 平台用户ID（Telegram）
    pub telegram_id: i64,
    pub display_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: i64,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/login", post(login))
}

/// POST /api/auth/login
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse)
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    if req.telegram_id <= 0 {
        return Err(AppError::bad_request("Invalid telegram_id"));
    }
    if req.display_name.trim().is_empty() {
        return Err(AppError::bad_request("display_name must not be empty"));
    }

    let user = state
        .users
        .upsert(UpsertUserParams {
            id: req.telegram_id,
            display_name: req.display_name.trim().to_string(),
            username: req.username,
            auth_method: "telegram".to_string(),
        })
        .await
        .map_err(AppError::from)?;

    let token = crate::infrastructure::jwt::generate_token(
        user.id,
        user.username.clone().unwrap_or_else(|| user.display_name.clone()),
        user.auth_method.clone(),
        user.role.clone(),
    )?;

    state.audit.log(user.id, "login", "session", None, None);

    success_response(LoginResponse {
        access_token: token,
        user_id: user.id,
    })
}
