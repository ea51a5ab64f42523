//! 充值API
//! 下发加密Memo并安排后台确认任务

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::{
        middleware::auth::AuthInfoExtractor,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    domain::JobType,
    error::AppError,
    service::deposit_memo::EncryptedMemo,
    utils::address_validator::AddressValidator,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositIntentRequest {
    /// 预期充值金额（字符串十进制）
    pub amount: String,
    /// 付款方地址
    pub payer_address: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositIntentResponse {
    /// 充值时附带的加密Memo
    pub memo: EncryptedMemo,
    /// 收款地址
    pub deposit_address: String,
    /// 后台确认任务ID
    pub job_id: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/intent", post(create_deposit_intent))
}

/// POST /api/deposits/intent
///
/// Memo绑定(金额, 付款地址, 时间戳)；确认任务轮询链上入账，
/// 校验通过后按交易哈希恰好一次入账
#[utoipa::path(
    post,
    path = "/api/deposits/intent",
    request_body = DepositIntentRequest,
    responses(
        (status = 200, description = "Deposit intent created", body = DepositIntentResponse)
    )
)]
pub async fn create_deposit_intent(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
    Json(req): Json<DepositIntentRequest>,
) -> Result<Json<ApiResponse<DepositIntentResponse>>, AppError> {
    let amount: Decimal = req
        .amount
        .parse()
        .map_err(|_| AppError::invalid_amount("Invalid amount"))?;
    if amount <= Decimal::ZERO {
        return Err(AppError::invalid_amount("Amount must be greater than zero"));
    }
    if !AddressValidator::validate(&req.payer_address) {
        return Err(AppError::invalid_address("Invalid payer address"));
    }

    let deposit_address = state
        .wallet_service
        .get_deposit_address(auth.0.user_id, auth.0.user_id)
        .await?;

    let memo = state
        .memo_cipher
        .encrypt_memo(amount, &req.payer_address, Utc::now().timestamp())?;

    let job = state
        .queue
        .add_job(
            auth.0.user_id,
            JobType::DepositConfirm,
            serde_json::json!({
                "memo": memo,
                "expected_payer_address": req.payer_address,
            }),
            5,
            Some(Utc::now() + Duration::seconds(30)),
        )
        .await?;

    state.audit.log(
        auth.0.user_id,
        "deposit_intent_created",
        "deposit",
        Some(job.id.to_string()),
        Some(serde_json::json!({ "amount": amount.to_string() })),
    );

    success_response(DepositIntentResponse {
        memo,
        deposit_address,
        job_id: job.id.to_string(),
    })
}
