//! 钱包管理
//! 创建走后台任务；所有查询先过所有权断言

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::{
    domain::{Job, JobType, Wallet},
    infrastructure::retry::{retry_with_backoff, RetryPolicy},
    queue::JobQueue,
    repository::WalletRepository,
    service::{
        access_guard::AccessGuard,
        audit_service::AuditService,
        chain_client::ChainSource,
        error::ServiceError,
        ledger::{BalanceBreakdown, LedgerService},
        notification_service::Notifier,
    },
};

/// 钱包概览：账本余额 + 链上快照
#[derive(Debug, Clone, serde::Serialize)]
pub struct WalletOverview {
    pub address: String,
    pub ledger: BalanceBreakdown,
    pub chain_balance: Decimal,
    pub balance_synced_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct WalletService {
    wallets: Arc<dyn WalletRepository>,
    ledger: Arc<LedgerService>,
    guard: Arc<AccessGuard>,
    audit: Arc<AuditService>,
    chain: Arc<dyn ChainSource>,
    queue: Arc<JobQueue>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl WalletService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallets: Arc<dyn WalletRepository>,
        ledger: Arc<LedgerService>,
        guard: Arc<AccessGuard>,
        audit: Arc<AuditService>,
        chain: Arc<dyn ChainSource>,
        queue: Arc<JobQueue>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            wallets,
            ledger,
            guard,
            audit,
            chain,
            queue,
            notifier,
            retry: RetryPolicy::default(),
        }
    }

    /// 请求创建钱包：校验一人一钱包后入队后台任务
    pub async fn request_wallet_creation(
        &self,
        caller_id: i64,
        target_user_id: i64,
    ) -> Result<Job, ServiceError> {
        self.guard
            .assert_owner(caller_id, target_user_id, "wallet")
            .await?;

        if self.wallets.find_by_user(target_user_id).await?.is_some() {
            return Err(ServiceError::WalletAlreadyExists);
        }

        let job = self
            .queue
            .add_job(
                target_user_id,
                JobType::WalletCreate,
                serde_json::json!({}),
                5,
                None,
            )
            .await?;

        self.audit.log(
            target_user_id,
            "wallet_create_requested",
            "wallet",
            None,
            Some(serde_json::json!({ "job_id": job.id })),
        );

        Ok(job)
    }

    /// 实际创建钱包（后台任务调用）
    ///
    /// 助记词生成委托给 bip39，仅用于派生收款地址；
    /// 本服务不保存任何密钥材料
    pub async fn create_wallet_now(&self, user_id: i64) -> Result<Wallet, ServiceError> {
        let address = derive_wallet_address()?;
        let wallet = self.wallets.insert(user_id, &address).await?;

        self.audit.log(
            user_id,
            "wallet_created",
            "wallet",
            Some(wallet.id.to_string()),
            Some(serde_json::json!({ "address": wallet.address })),
        );
        self.notifier.notify_user(
            user_id,
            "wallet_created",
            format!("Your wallet is ready. Deposit address: {}", wallet.address),
        );

        Ok(wallet)
    }

    pub async fn get_wallet(&self, caller_id: i64, target_user_id: i64) -> Result<Wallet, ServiceError> {
        self.guard
            .assert_owner(caller_id, target_user_id, "wallet")
            .await?;
        self.wallets
            .find_by_user(target_user_id)
            .await?
            .ok_or(ServiceError::WalletNotFound)
    }

    pub async fn get_deposit_address(
        &self,
        caller_id: i64,
        target_user_id: i64,
    ) -> Result<String, ServiceError> {
        Ok(self.get_wallet(caller_id, target_user_id).await?.address)
    }

    /// 账本余额（权威）+ 链上余额快照
    pub async fn get_overview(
        &self,
        caller_id: i64,
        target_user_id: i64,
    ) -> Result<WalletOverview, ServiceError> {
        let wallet = self.get_wallet(caller_id, target_user_id).await?;
        let ledger = self.ledger.get_available_balance(target_user_id).await?;

        Ok(WalletOverview {
            address: wallet.address,
            ledger,
            chain_balance: wallet.cached_balance,
            balance_synced_at: wallet.balance_synced_at,
        })
    }

    pub async fn get_balance(
        &self,
        caller_id: i64,
        target_user_id: i64,
    ) -> Result<BalanceBreakdown, ServiceError> {
        self.guard
            .assert_owner(caller_id, target_user_id, "balance")
            .await?;
        self.ledger.get_available_balance(target_user_id).await
    }

    /// 刷新链上余额快照（后台任务调用）
    pub async fn refresh_chain_balance(&self, user_id: i64) -> Result<Decimal, ServiceError> {
        let wallet = self
            .wallets
            .find_by_user(user_id)
            .await?
            .ok_or(ServiceError::WalletNotFound)?;

        let balance = retry_with_backoff(&self.retry, "balance_refresh", || {
            let address = wallet.address.clone();
            async move { self.chain.get_address_balance(&address).await }
        })
        .await?;

        self.wallets.update_cached_balance(user_id, balance).await?;
        Ok(balance)
    }
}

/// 派生user-friendly收款地址
///
/// 布局：tag(0x51) + workchain(0x00) + SHA-256(公钥) + 2字节校验尾，
/// 36字节base64url编码后恰好48字符
fn derive_wallet_address() -> Result<String, ServiceError> {
    let mut entropy = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut entropy);
    let mnemonic = bip39::Mnemonic::from_entropy(&entropy)
        .map_err(|e| ServiceError::internal(format!("mnemonic generation: {}", e)))?;

    let seed = mnemonic.to_seed("");
    let key_bytes: [u8; 32] = seed[..32]
        .try_into()
        .map_err(|_| ServiceError::internal("seed truncation"))?;
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&key_bytes);
    let public_key = signing_key.verifying_key();

    let mut buf = Vec::with_capacity(36);
    buf.push(0x51);
    buf.push(0x00);
    buf.extend_from_slice(&Sha256::digest(public_key.as_bytes()));
    let check = Sha256::digest(&buf);
    buf.extend_from_slice(&check[..2]);

    Ok(URL_SAFE_NO_PAD.encode(&buf))
}
