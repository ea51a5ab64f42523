//! 钱包助手API

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    api::{
        middleware::auth::AuthInfoExtractor,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    error::AppError,
    service::assistant::AssistantResponse,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssistantQueryRequest {
    pub query: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/query", post(process_query))
}

/// POST /api/assistant/query
pub async fn process_query(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
    Json(req): Json<AssistantQueryRequest>,
) -> Result<Json<ApiResponse<AssistantResponse>>, AppError> {
    if req.query.trim().is_empty() {
        return Err(AppError::bad_request("Query must not be empty"));
    }
    if req.query.len() > 2000 {
        return Err(AppError::bad_request("Query too long"));
    }

    let response = state
        .assistant
        .process_query(auth.0.user_id, &auth.0.username, &req.query)
        .await?;

    success_response(response)
}
