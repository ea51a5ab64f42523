//! API路由组装
//! 公开路由（登录、健康检查、文档）与认证路由分开；
//! 认证路由全部经过auth中间件，身份只从Bearer Token解析

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::app_state::AppState;

pub mod assistant_api;
pub mod audit_api;
pub mod auth_api;
pub mod deposit_api;
pub mod job_api;
pub mod middleware;
pub mod response;
pub mod wallet_api;
pub mod withdrawal_api;

#[derive(OpenApi)]
#[openapi(
    paths(
        auth_api::login,
        wallet_api::create_wallet,
        wallet_api::get_balance,
        withdrawal_api::create_withdrawal,
        deposit_api::create_deposit_intent,
    ),
    components(schemas(
        auth_api::LoginRequest,
        auth_api::LoginResponse,
        wallet_api::CreateWalletRequest,
        wallet_api::CreateWalletResponse,
        wallet_api::BalanceResponse,
        wallet_api::WalletResponse,
        withdrawal_api::CreateWithdrawalRequest,
        withdrawal_api::CreateWithdrawalResponse,
        withdrawal_api::WithdrawalStatusResponse,
        deposit_api::DepositIntentRequest,
        deposit_api::DepositIntentResponse,
        job_api::JobResponse,
        assistant_api::AssistantQueryRequest,
        audit_api::AuditLogResponse,
        audit_api::SecurityEventResponse,
        crate::service::deposit_memo::EncryptedMemo,
    )),
    tags(
        (name = "GiftMarket Wallet API", description = "User-scoped wallet ledger and withdrawal pipeline")
    )
)]
struct ApiDoc;

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}

/// GET /api/health
async fn api_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let db_ok = crate::infrastructure::db::health_check(&state.pool).await.is_ok();
    Json(serde_json::json!({
        "status": if db_ok { "healthy" } else { "degraded" },
        "database": db_ok,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    match frontend_url.and_then(|u| u.parse::<HeaderValue>().ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    }
}

pub fn routes(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/health", get(api_health))
        .nest("/api/auth", auth_api::routes())
        .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));

    let protected = Router::new()
        .nest("/api/wallet", wallet_api::routes())
        .nest("/api/withdrawals", withdrawal_api::routes())
        .nest("/api/deposits", deposit_api::routes())
        .nest("/api/jobs", job_api::routes())
        .nest("/api/assistant", assistant_api::routes())
        .nest("/api/audit", audit_api::routes())
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let cors = cors_layer(state.config.server.frontend_url.as_deref());

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(middleware::trace::trace_id_middleware))
                .layer(cors)
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}
