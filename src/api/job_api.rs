//! 后台任务API
//! 查询与取消都只作用于调用方自己的任务

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        middleware::auth::AuthInfoExtractor,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    error::AppError,
    queue::CancelOutcome,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id", get(get_job))
        .route("/:id/cancel", post(cancel_job))
}

/// GET /api/jobs/:id
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<JobResponse>>, AppError> {
    let job_id = Uuid::parse_str(&id).map_err(|_| AppError::bad_request("Invalid job id"))?;

    let job = state
        .queue
        .get_job(auth.0.user_id, job_id)
        .await?
        .ok_or_else(|| AppError::not_found("Job not found"))?;

    success_response(JobResponse {
        job_id: job.id.to_string(),
        job_type: job.job_type.as_str().to_string(),
        status: job.status.as_str().to_string(),
        attempts: job.attempts,
        max_attempts: job.max_attempts,
        last_error: job.last_error,
        created_at: job.created_at.to_rfc3339(),
    })
}

/// POST /api/jobs/:id/cancel
///
/// 只有 pending 任务可取消；执行中的任务跑完为止
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let job_id = Uuid::parse_str(&id).map_err(|_| AppError::bad_request("Invalid job id"))?;

    match state.queue.cancel(auth.0.user_id, job_id).await? {
        CancelOutcome::Cancelled => {
            success_response(serde_json::json!({ "cancelled": true }))
        }
        CancelOutcome::NotCancellable => Err(AppError::job_not_cancellable(
            "Job is already running or finished",
        )),
        CancelOutcome::NotFound => Err(AppError::not_found("Job not found")),
    }
}
