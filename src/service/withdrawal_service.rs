//! 安全提现管线
//!
//! validating -> recorded(pending) -> submitting -> completed
//!                     |                   |
//!                  rejected             failed
//!
//! 校验顺序固定，第一个违规即失败；校验阶段不自动重试（提现不是盲重试安全的），
//! 提交阶段用交易ID做去重键做有界重试

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::WithdrawalConfig,
    domain::{Transaction, TxStatus},
    infrastructure::retry::{retry_with_backoff, RetryPolicy},
    queue::JobQueue,
    repository::{TransactionRepository, WithdrawalReservation},
    service::{
        access_guard::AccessGuard,
        audit_service::AuditService,
        chain_client::ChainSource,
        compliance_engine::ComplianceEngine,
        error::ServiceError,
        ledger::LedgerService,
        notification_service::Notifier,
    },
    utils::address_validator::AddressValidator,
};

#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub user_id: i64,
    pub amount: Decimal,
    pub destination_address: String,
    /// 用户当前连接的钱包地址，由认证上下文带入
    pub connected_wallet_address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalOutcome {
    pub success: bool,
    pub transaction_id: Option<Uuid>,
    pub message: String,
}

/// 提现金额边界
#[derive(Debug, Clone)]
pub struct WithdrawalLimits {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
}

impl WithdrawalLimits {
    pub fn from_config(cfg: &WithdrawalConfig) -> anyhow::Result<Self> {
        Ok(Self {
            min_amount: cfg
                .min_amount
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid withdrawal min: {}", cfg.min_amount))?,
            max_amount: cfg
                .max_amount
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid withdrawal max: {}", cfg.max_amount))?,
        })
    }
}

pub struct WithdrawalService {
    transactions: Arc<dyn TransactionRepository>,
    ledger: Arc<LedgerService>,
    guard: Arc<AccessGuard>,
    compliance: Arc<ComplianceEngine>,
    audit: Arc<AuditService>,
    chain: Arc<dyn ChainSource>,
    notifier: Arc<dyn Notifier>,
    queue: Arc<JobQueue>,
    limits: WithdrawalLimits,
    submit_retry: RetryPolicy,
}

impl WithdrawalService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<LedgerService>,
        guard: Arc<AccessGuard>,
        compliance: Arc<ComplianceEngine>,
        audit: Arc<AuditService>,
        chain: Arc<dyn ChainSource>,
        notifier: Arc<dyn Notifier>,
        queue: Arc<JobQueue>,
        limits: WithdrawalLimits,
        submit_retry: RetryPolicy,
    ) -> Self {
        Self {
            transactions,
            ledger,
            guard,
            compliance,
            audit,
            chain,
            notifier,
            queue,
            limits,
            submit_retry,
        }
    }

    pub async fn process_withdrawal(
        &self,
        caller_id: i64,
        req: WithdrawalRequest,
    ) -> Result<WithdrawalOutcome, ServiceError> {
        // 1. 调用方身份必须等于目标用户
        self.guard
            .assert_owner(caller_id, req.user_id, "withdrawal")
            .await?;

        // 2. 金额形状与边界
        if req.amount <= Decimal::ZERO {
            return Err(ServiceError::validation("Amount must be greater than zero"));
        }
        if req.amount < self.limits.min_amount || req.amount > self.limits.max_amount {
            return Err(ServiceError::validation(format!(
                "Amount must be between {} and {}",
                self.limits.min_amount, self.limits.max_amount
            )));
        }

        // 3. 账本可用余额快速校验（权威校验在预留时按用户串行化重做）
        let balance = self.ledger.get_available_balance(req.user_id).await?;
        if balance.available < req.amount {
            return Err(ServiceError::InsufficientBalance {
                available: balance.available,
                requested: req.amount,
            });
        }

        // 4. 提现只能打到当前连接的钱包地址
        //    即使其他字段被客户端篡改，也到不了攻击者地址
        if req.destination_address != req.connected_wallet_address {
            return Err(ServiceError::validation(
                "Withdrawals may only target the currently connected wallet address",
            ));
        }

        // 5. 地址格式
        if !AddressValidator::validate(&req.destination_address) {
            return Err(ServiceError::validation(
                "Destination address is not a valid address",
            ));
        }

        // 6. 合规检查
        let compliance = self
            .compliance
            .check_user_compliance(req.user_id, "withdrawal", Some(req.amount))
            .await?;
        if !compliance.allowed {
            return Err(ServiceError::ComplianceBlocked(
                compliance.errors.join("; "),
            ));
        }
        for warning in &compliance.warnings {
            tracing::info!(user_id = req.user_id, warning, "Compliance warning on withdrawal");
        }

        // 7. 预留：锁内复核余额并落pending记录
        let tx = match self
            .transactions
            .reserve_withdrawal(req.user_id, req.amount, &req.destination_address)
            .await?
        {
            WithdrawalReservation::Reserved(tx) => tx,
            WithdrawalReservation::Insufficient { available } => {
                return Err(ServiceError::InsufficientBalance {
                    available,
                    requested: req.amount,
                });
            }
        };

        self.audit.log(
            req.user_id,
            "withdrawal_initiated",
            "transaction",
            Some(tx.id.to_string()),
            Some(serde_json::json!({
                "amount": req.amount.to_string(),
                "destination": req.destination_address,
            })),
        );

        self.submit(req.user_id, tx).await
    }

    /// 提交阶段：有界重试，交易ID做去重键；
    /// 超时绝不当作成功，留给对账任务裁决
    async fn submit(
        &self,
        user_id: i64,
        tx: Transaction,
    ) -> Result<WithdrawalOutcome, ServiceError> {
        self.transactions
            .transition_status(tx.id, TxStatus::Pending, TxStatus::Processing, None)
            .await?;

        let destination = tx
            .destination_address
            .clone()
            .ok_or_else(|| ServiceError::internal("withdrawal row missing destination"))?;

        let submit_result = retry_with_backoff(&self.submit_retry, "withdrawal_submit", || {
            let destination = destination.clone();
            async move {
                self.chain
                    .submit_transfer(&destination, tx.amount, tx.id)
                    .await
            }
        })
        .await;

        match submit_result {
            Ok(receipt) => {
                self.transactions
                    .transition_status(
                        tx.id,
                        TxStatus::Processing,
                        TxStatus::Completed,
                        Some(&receipt.tx_hash),
                    )
                    .await?;
                self.audit.log(
                    user_id,
                    "withdrawal_completed",
                    "transaction",
                    Some(tx.id.to_string()),
                    Some(serde_json::json!({ "tx_hash": receipt.tx_hash })),
                );
                self.notifier.notify_user(
                    user_id,
                    "withdrawal_completed",
                    format!("Your withdrawal of {} has been confirmed", tx.amount),
                );
                Ok(WithdrawalOutcome {
                    success: true,
                    transaction_id: Some(tx.id),
                    message: "Withdrawal completed".into(),
                })
            }
            Err(ServiceError::Timeout(_)) => {
                // 状态保持processing，由对账任务查询去重键的最终结果
                self.queue
                    .add_job(
                        user_id,
                        crate::domain::JobType::WithdrawalReconcile,
                        serde_json::json!({ "transaction_id": tx.id }),
                        10,
                        Some(chrono::Utc::now() + chrono::Duration::seconds(30)),
                    )
                    .await?;
                self.audit.log(
                    user_id,
                    "withdrawal_submit_timeout",
                    "transaction",
                    Some(tx.id.to_string()),
                    None,
                );
                Ok(WithdrawalOutcome {
                    success: false,
                    transaction_id: Some(tx.id),
                    message: "Transfer submission timed out; confirmation is pending".into(),
                })
            }
            Err(err) => {
                // failed 不计入completed扣减，余额不受失败尝试影响
                self.transactions
                    .transition_status(tx.id, TxStatus::Processing, TxStatus::Failed, None)
                    .await?;
                self.audit.log(
                    user_id,
                    "withdrawal_failed",
                    "transaction",
                    Some(tx.id.to_string()),
                    Some(serde_json::json!({ "error": err.to_string() })),
                );
                self.notifier.notify_user(
                    user_id,
                    "withdrawal_failed",
                    "Your withdrawal could not be submitted; your balance was not affected".into(),
                );
                Ok(WithdrawalOutcome {
                    success: false,
                    transaction_id: Some(tx.id),
                    message: "Withdrawal failed; your balance was not debited".into(),
                })
            }
        }
    }
}
