//! GiftMarket 主入口

use std::sync::Arc;

use anyhow::Result;
use giftmarket::{
    api,
    app_state::AppState,
    config::Config,
    infrastructure::{db, logging},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量与配置（CONFIG_PATH 指定的TOML覆盖环境默认值）
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env_and_file(
        std::env::var("CONFIG_PATH").ok().as_deref(),
    )?);

    // JWT模块从环境变量取密钥；配置文件提供时同步过去
    if std::env::var("JWT_SECRET").is_err() && !config.jwt.secret.is_empty() {
        std::env::set_var("JWT_SECRET", &config.jwt.secret);
    }

    // 2. 初始化日志
    logging::init_logging(&config.logging);
    tracing::info!("Starting GiftMarket wallet service");

    // 3. 数据库连接与迁移
    let pool = db::init_pool(&config.database).await?;
    tracing::info!("Database connected");

    if std::env::var("SKIP_MIGRATIONS").is_err() {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations completed");
    } else {
        tracing::info!("Database migrations skipped (SKIP_MIGRATIONS set)");
    }

    // 4. 组装应用状态（所有服务在这里构建一次，显式注入）
    let state = Arc::new(AppState::new(pool, config.clone())?);

    // 5. 启动Worker池：每种任务类型一个轮询循环
    let worker_pool = Arc::new(state.build_worker_pool());
    let _workers = worker_pool.spawn_all();
    tracing::info!("Job workers started");

    // 6. 构建路由并启动服务器
    let app = api::routes(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!("Server listening on http://{}", config.server.bind_addr);
    tracing::info!("Swagger UI: http://{}/docs", config.server.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
