//! GiftMarket - Telegram频道与礼物交易市场的钱包核心后端
//!
//! 用户级钱包账本与安全提现管线：余额从充值/提现账本推导，
//! 每条数据访问路径按用户隔离，慢工作走带重试的后台任务队列

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod queue;
pub mod repository;
pub mod service;
pub mod utils;

pub use app_state::AppState;
pub use error::{AppError, AppErrorCode};
