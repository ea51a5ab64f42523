//! 链上数据源客户端
//! 只读HTTP查询 + 转账提交；上游视为不可靠（超时、5xx），读取一律带重试

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    config::ChainConfig,
    infrastructure::retry::{retry_with_backoff, RetryPolicy},
    service::error::ServiceError,
};

/// 链上观察到的一笔转账
#[derive(Debug, Clone)]
pub struct ChainTransfer {
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub timestamp: i64,
}

/// 转账提交回执
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub tx_hash: String,
}

/// 链上数据源接口
/// Worker和服务依赖这个接口而不是具体HTTP实现
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// 查询地址链上余额
    async fn get_address_balance(&self, address: &str) -> Result<Decimal, ServiceError>;

    /// 查询某地址最近的入账转账
    async fn get_incoming_transfers(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<ChainTransfer>, ServiceError>;

    /// 提交转账。不在这里重试：提现管线带去重键控制重试边界
    async fn submit_transfer(
        &self,
        destination: &str,
        amount: Decimal,
        dedupe_key: Uuid,
    ) -> Result<TransferReceipt, ServiceError>;

    /// 按去重键查询此前提交的转账是否已上链（对账任务用）
    async fn find_transfer_by_dedupe_key(
        &self,
        dedupe_key: Uuid,
    ) -> Result<Option<TransferReceipt>, ServiceError>;
}

pub struct ChainClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct BalanceResponse {
    ok: bool,
    /// 纳单位余额（1 token = 1e9）
    result: String,
}

#[derive(Deserialize)]
struct TransfersResponse {
    ok: bool,
    result: Vec<TransferEntry>,
}

#[derive(Deserialize)]
struct TransferEntry {
    tx_hash: String,
    from: String,
    to: String,
    amount: String,
    utime: i64,
}

#[derive(Deserialize)]
struct SubmitResponse {
    ok: bool,
    tx_hash: Option<String>,
    error: Option<String>,
}

const NANO_PER_TOKEN: i64 = 1_000_000_000;

impl ChainClient {
    pub fn new(cfg: &ChainConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.api_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            retry: RetryPolicy::default(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }
        req
    }

    fn nano_to_tokens(nano: &str) -> Result<Decimal, ServiceError> {
        let value: i64 = nano
            .parse()
            .map_err(|_| ServiceError::Network(format!("invalid balance value: {}", nano)))?;
        Ok(Decimal::new(value, 0) / Decimal::new(NANO_PER_TOKEN, 0))
    }
}

#[async_trait]
impl ChainSource for ChainClient {
    async fn get_address_balance(&self, address: &str) -> Result<Decimal, ServiceError> {
        retry_with_backoff(&self.retry, "chain_balance", || async {
            let resp = self
                .request(reqwest::Method::GET, "/getAddressBalance")
                .query(&[("address", address)])
                .send()
                .await?
                .error_for_status()
                .map_err(ServiceError::from)?;

            let body: BalanceResponse = resp.json().await?;
            if !body.ok {
                return Err(ServiceError::Network("balance query rejected".into()));
            }
            Self::nano_to_tokens(&body.result)
        })
        .await
    }

    async fn get_incoming_transfers(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<ChainTransfer>, ServiceError> {
        retry_with_backoff(&self.retry, "chain_transfers", || async {
            let resp = self
                .request(reqwest::Method::GET, "/getTransactions")
                .query(&[("address", address), ("limit", &limit.to_string())])
                .send()
                .await?
                .error_for_status()
                .map_err(ServiceError::from)?;

            let body: TransfersResponse = resp.json().await?;
            if !body.ok {
                return Err(ServiceError::Network("transfer query rejected".into()));
            }

            body.result
                .into_iter()
                .map(|t| {
                    Ok(ChainTransfer {
                        tx_hash: t.tx_hash,
                        from_address: t.from,
                        to_address: t.to,
                        amount: Self::nano_to_tokens(&t.amount)?,
                        timestamp: t.utime,
                    })
                })
                .collect()
        })
        .await
    }

    async fn submit_transfer(
        &self,
        destination: &str,
        amount: Decimal,
        dedupe_key: Uuid,
    ) -> Result<TransferReceipt, ServiceError> {
        let nano = (amount * Decimal::new(NANO_PER_TOKEN, 0)).trunc();
        let resp = self
            .request(reqwest::Method::POST, "/sendTransfer")
            .json(&serde_json::json!({
                "destination": destination,
                "amount": nano.to_string(),
                "dedupe_key": dedupe_key.to_string(),
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(ServiceError::from)?;

        let body: SubmitResponse = resp.json().await?;
        match (body.ok, body.tx_hash) {
            (true, Some(hash)) => Ok(TransferReceipt { tx_hash: hash }),
            _ => Err(ServiceError::Network(
                body.error.unwrap_or_else(|| "transfer rejected".into()),
            )),
        }
    }

    async fn find_transfer_by_dedupe_key(
        &self,
        dedupe_key: Uuid,
    ) -> Result<Option<TransferReceipt>, ServiceError> {
        retry_with_backoff(&self.retry, "chain_transfer_lookup", || async {
            let resp = self
                .request(reqwest::Method::GET, "/getTransferByDedupeKey")
                .query(&[("key", &dedupe_key.to_string())])
                .send()
                .await?
                .error_for_status()
                .map_err(ServiceError::from)?;

            let body: SubmitResponse = resp.json().await?;
            Ok(body.tx_hash.map(|hash| TransferReceipt { tx_hash: hash }))
        })
        .await
    }
}
