//! 请求追踪ID中间件
//! 每个请求分配一个追踪ID，写入请求扩展与响应头；
//! 错误响应体里的 trace_id 便于把用户报障对回服务端日志

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// 请求作用域的追踪ID
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

pub async fn trace_id_middleware(mut req: Request, next: Next) -> Response {
    // 客户端带了就沿用，方便网关侧串联
    let trace_id = req
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        res.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    res
}
