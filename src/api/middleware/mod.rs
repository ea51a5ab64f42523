pub mod auth;
pub mod trace;

pub use auth::{auth_middleware, AuthInfo, AuthInfoExtractor};
pub use trace::{trace_id_middleware, TraceId};
