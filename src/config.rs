//! 配置管理模块
//! 支持从环境变量和TOML配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub memo: MemoConfig,
    #[serde(default)]
    pub withdrawal: WithdrawalConfig,
    #[serde(default)]
    pub compliance: ComplianceConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    #[serde(default)]
    pub frontend_url: Option<String>,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub token_expiry_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 链上数据源配置（只读HTTP API + 转账提交）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    /// 外部请求显式超时，超时的提现提交绝不视为成功
    pub request_timeout_secs: u64,
}

/// 充值Memo协议配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoConfig {
    pub secret: String,
    /// 有效期窗口，超过后拒绝（重放防护）
    pub ttl_secs: i64,
    /// 观测金额与期望金额的容差，吸收链上精度取整
    pub amount_tolerance: String,
}

/// 提现限额配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalConfig {
    pub min_amount: String,
    pub max_amount: String,
    pub submit_max_attempts: u32,
    pub submit_base_delay_ms: u64,
}

/// 合规引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// 按验证等级的单笔交易上限
    pub daily_limit_none: String,
    pub daily_limit_basic: String,
    pub daily_limit_enhanced: String,
    pub daily_limit_full: String,
    /// AML启发式：24小时交易笔数阈值
    pub aml_tx_count_threshold: i64,
    /// AML启发式：单笔大额阈值
    pub aml_large_amount: String,
}

/// 任务队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub poll_interval_ms: u64,
    pub max_concurrent_jobs: usize,
    pub max_attempts: i32,
    pub retry_base_delay_secs: i64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://postgres@localhost:5432/giftmarket".into()),
            max_connections: env_or("DB_MAX_CONNS", 16),
            min_connections: env_or("DB_MIN_CONNS", 2),
            acquire_timeout_secs: env_or("DB_ACQ_TIMEOUT_SECS", 5),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            frontend_url: std::env::var("FRONTEND_URL").ok(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: std::env::var("JWT_SECRET").unwrap_or_default(),
            token_expiry_secs: env_or("JWT_TOKEN_EXPIRY_SECS", 3600),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "giftmarket=debug,tower_http=info,sqlx=warn".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("CHAIN_API_URL")
                .unwrap_or_else(|_| "https://toncenter.com/api/v2".into()),
            api_key: std::env::var("CHAIN_API_KEY").ok(),
            request_timeout_secs: env_or("CHAIN_REQUEST_TIMEOUT_SECS", 10),
        }
    }
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            secret: std::env::var("MEMO_SECRET").unwrap_or_default(),
            ttl_secs: env_or("MEMO_TTL_SECS", 3600),
            amount_tolerance: std::env::var("MEMO_AMOUNT_TOLERANCE")
                .unwrap_or_else(|_| "0.001".into()),
        }
    }
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            min_amount: std::env::var("WITHDRAWAL_MIN").unwrap_or_else(|_| "0.1".into()),
            max_amount: std::env::var("WITHDRAWAL_MAX").unwrap_or_else(|_| "10000".into()),
            submit_max_attempts: env_or("WITHDRAWAL_SUBMIT_MAX_ATTEMPTS", 3),
            submit_base_delay_ms: env_or("WITHDRAWAL_SUBMIT_BASE_DELAY_MS", 1000),
        }
    }
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            daily_limit_none: std::env::var("COMPLIANCE_LIMIT_NONE").unwrap_or_else(|_| "100".into()),
            daily_limit_basic: std::env::var("COMPLIANCE_LIMIT_BASIC")
                .unwrap_or_else(|_| "1000".into()),
            daily_limit_enhanced: std::env::var("COMPLIANCE_LIMIT_ENHANCED")
                .unwrap_or_else(|_| "10000".into()),
            daily_limit_full: std::env::var("COMPLIANCE_LIMIT_FULL")
                .unwrap_or_else(|_| "100000".into()),
            aml_tx_count_threshold: env_or("COMPLIANCE_AML_TX_COUNT", 10),
            aml_large_amount: std::env::var("COMPLIANCE_AML_LARGE_AMOUNT")
                .unwrap_or_else(|_| "5000".into()),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: env_or("QUEUE_POLL_INTERVAL_MS", 1000),
            max_concurrent_jobs: env_or("QUEUE_MAX_CONCURRENT_JOBS", 4),
            max_attempts: env_or("QUEUE_MAX_ATTEMPTS", 3),
            retry_base_delay_secs: env_or("QUEUE_RETRY_BASE_DELAY_SECS", 30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            jwt: JwtConfig::default(),
            logging: LoggingConfig::default(),
            chain: ChainConfig::default(),
            memo: MemoConfig::default(),
            withdrawal: WithdrawalConfig::default(),
            compliance: ComplianceConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl Config {
    /// 从环境变量加载
    pub fn from_env() -> Result<Self> {
        Ok(Self::default())
    }

    /// 从环境变量和可选配置文件加载
    /// 文件中的值覆盖环境变量默认值
    pub fn from_env_and_file(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) if Path::new(p).exists() => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config file {}", p))?;
                let config: Config = toml::from_str(&content)
                    .with_context(|| format!("failed to parse config file {}", p))?;
                Ok(config)
            }
            _ => Self::from_env(),
        }
    }
}
