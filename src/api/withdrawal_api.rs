//! 提现API

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        middleware::auth::AuthInfoExtractor,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    error::AppError,
    repository::TransactionRepository,
    service::withdrawal_service::WithdrawalRequest,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWithdrawalRequest {
    /// 目标用户；缺省为调用方自己
    pub user_id: Option<i64>,
    /// 金额（字符串十进制）
    pub amount: String,
    /// 目标地址
    pub destination_address: String,
    /// 当前连接的钱包地址；提现只允许打到这个地址
    pub connected_wallet_address: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateWithdrawalResponse {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalStatusResponse {
    pub transaction_id: String,
    pub kind: String,
    pub amount: String,
    pub status: String,
    pub tx_hash: Option<String>,
    pub destination_address: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create", post(create_withdrawal))
        .route("/status/:id", get(get_withdrawal_status))
        .route("/list", get(list_transactions))
}

/// POST /api/withdrawals/create
#[utoipa::path(
    post,
    path = "/api/withdrawals/create",
    request_body = CreateWithdrawalRequest,
    responses(
        (status = 200, description = "Withdrawal processed", body = CreateWithdrawalResponse)
    )
)]
pub async fn create_withdrawal(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
    Json(req): Json<CreateWithdrawalRequest>,
) -> Result<Json<ApiResponse<CreateWithdrawalResponse>>, AppError> {
    let amount: Decimal = req
        .amount
        .parse()
        .map_err(|_| AppError::invalid_amount("Invalid amount"))?;

    let outcome = state
        .withdrawal_service
        .process_withdrawal(
            auth.0.user_id,
            WithdrawalRequest {
                user_id: req.user_id.unwrap_or(auth.0.user_id),
                amount,
                destination_address: req.destination_address,
                connected_wallet_address: req.connected_wallet_address,
            },
        )
        .await?;

    success_response(CreateWithdrawalResponse {
        success: outcome.success,
        transaction_id: outcome.transaction_id.map(|id| id.to_string()),
        message: outcome.message,
    })
}

/// GET /api/withdrawals/status/:id
pub async fn get_withdrawal_status(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<WithdrawalStatusResponse>>, AppError> {
    let tx_id =
        Uuid::parse_str(&id).map_err(|_| AppError::bad_request("Invalid transaction id"))?;

    // user_id过滤在查询里，其他用户的交易等同不存在
    let tx = state
        .transactions
        .find_by_id_for_user(tx_id, auth.0.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    success_response(to_status_response(tx))
}

/// GET /api/withdrawals/list
///
/// 调用方自己的交易历史（充值与提现）
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
) -> Result<Json<ApiResponse<Vec<WithdrawalStatusResponse>>>, AppError> {
    let txs = state
        .transactions
        .list_by_user(auth.0.user_id, 50, 0)
        .await?;

    success_response(txs.into_iter().map(to_status_response).collect())
}

fn to_status_response(tx: crate::domain::Transaction) -> WithdrawalStatusResponse {
    WithdrawalStatusResponse {
        transaction_id: tx.id.to_string(),
        kind: tx.kind.as_str().to_string(),
        amount: tx.amount.to_string(),
        status: tx.status.as_str().to_string(),
        tx_hash: tx.tx_hash,
        destination_address: tx.destination_address,
        created_at: tx.created_at.to_rfc3339(),
        completed_at: tx.completed_at.map(|t| t.to_rfc3339()),
    }
}
