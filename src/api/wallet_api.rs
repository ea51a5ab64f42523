//! 钱包API

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
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
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    /// 目标用户；缺省为调用方自己。与调用方不一致会被拒绝并产生安全事件
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateWalletResponse {
    pub job_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub deposited: String,
    pub withdrawn: String,
    pub available: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletResponse {
    pub address: String,
    pub balance: BalanceResponse,
    pub chain_balance: String,
    pub balance_synced_at: Option<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_wallet))
        .route("/create", post(create_wallet))
        .route("/balance", get(get_balance))
        .route("/deposit-address", get(get_deposit_address))
}

/// GET /api/wallet
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
) -> Result<Json<ApiResponse<WalletResponse>>, AppError> {
    let overview = state
        .wallet_service
        .get_overview(auth.0.user_id, auth.0.user_id)
        .await?;

    success_response(WalletResponse {
        address: overview.address,
        balance: BalanceResponse {
            deposited: overview.ledger.deposited.to_string(),
            withdrawn: overview.ledger.withdrawn.to_string(),
            available: overview.ledger.available.to_string(),
        },
        chain_balance: overview.chain_balance.to_string(),
        balance_synced_at: overview.balance_synced_at.map(|t| t.to_rfc3339()),
    })
}

/// POST /api/wallet/create
///
/// 创建走后台任务，接口只返回任务受理结果
#[utoipa::path(
    post,
    path = "/api/wallet/create",
    request_body = CreateWalletRequest,
    responses(
        (status = 200, description = "Wallet creation queued", body = CreateWalletResponse)
    )
)]
pub async fn create_wallet(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
    Json(req): Json<CreateWalletRequest>,
) -> Result<Json<ApiResponse<CreateWalletResponse>>, AppError> {
    let target = req.user_id.unwrap_or(auth.0.user_id);
    let job = state
        .wallet_service
        .request_wallet_creation(auth.0.user_id, target)
        .await?;

    success_response(CreateWalletResponse {
        job_id: job.id.to_string(),
        status: job.status.as_str().to_string(),
    })
}

/// GET /api/wallet/balance
#[utoipa::path(
    get,
    path = "/api/wallet/balance",
    responses(
        (status = 200, description = "Ledger balance", body = BalanceResponse)
    )
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
) -> Result<Json<ApiResponse<BalanceResponse>>, AppError> {
    let balance = state
        .wallet_service
        .get_balance(auth.0.user_id, auth.0.user_id)
        .await?;

    success_response(BalanceResponse {
        deposited: balance.deposited.to_string(),
        withdrawn: balance.withdrawn.to_string(),
        available: balance.available.to_string(),
    })
}

/// GET /api/wallet/deposit-address
pub async fn get_deposit_address(
    State(state): State<Arc<AppState>>,
    auth: AuthInfoExtractor,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let address = state
        .wallet_service
        .get_deposit_address(auth.0.user_id, auth.0.user_id)
        .await?;

    success_response(serde_json::json!({ "address": address }))
}
