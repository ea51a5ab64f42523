//! 各任务类型的处理器
//! Worker只做领取与记账，业务动作全在这里

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    domain::{Job, TxStatus},
    repository::{TransactionRepository, WalletRepository},
    service::{
        audit_service::AuditService,
        chain_client::ChainSource,
        deposit_memo::{EncryptedMemo, MemoCipher},
        error::ServiceError,
        notification_service::Notifier,
        wallet_service::WalletService,
    },
};

use super::worker::JobHandler;

// ============ 钱包创建 ============

pub struct WalletCreateHandler {
    wallet_service: Arc<WalletService>,
}

impl WalletCreateHandler {
    pub fn new(wallet_service: Arc<WalletService>) -> Self {
        Self { wallet_service }
    }
}

#[async_trait]
impl JobHandler for WalletCreateHandler {
    async fn handle(&self, job: &Job) -> Result<(), ServiceError> {
        match self.wallet_service.create_wallet_now(job.user_id).await {
            Ok(_) => Ok(()),
            // 重试中重复执行：钱包已经建好就算成功
            Err(ServiceError::WalletAlreadyExists) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ============ 充值确认 ============

#[derive(Deserialize)]
struct DepositConfirmPayload {
    memo: EncryptedMemo,
    expected_payer_address: String,
}

pub struct DepositConfirmHandler {
    memo_cipher: Arc<MemoCipher>,
    chain: Arc<dyn ChainSource>,
    transactions: Arc<dyn TransactionRepository>,
    wallets: Arc<dyn WalletRepository>,
    audit: Arc<AuditService>,
    notifier: Arc<dyn Notifier>,
}

impl DepositConfirmHandler {
    pub fn new(
        memo_cipher: Arc<MemoCipher>,
        chain: Arc<dyn ChainSource>,
        transactions: Arc<dyn TransactionRepository>,
        wallets: Arc<dyn WalletRepository>,
        audit: Arc<AuditService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            memo_cipher,
            chain,
            transactions,
            wallets,
            audit,
            notifier,
        }
    }
}

#[async_trait]
impl JobHandler for DepositConfirmHandler {
    async fn handle(&self, job: &Job) -> Result<(), ServiceError> {
        let payload: DepositConfirmPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| ServiceError::validation(format!("malformed deposit payload: {}", e)))?;

        // Memo完整性先行：过期或被篡改的Memo不值得轮询链上，
        // 按疑似篡改记录并终止
        if let Err(e) = self.memo_cipher.decrypt_memo(&payload.memo) {
            self.audit.log(
                job.user_id,
                "deposit_memo_rejected",
                "deposit",
                None,
                Some(serde_json::json!({ "reason": e.to_string() })),
            );
            return Err(e);
        }

        let wallet = self
            .wallets
            .find_by_user(job.user_id)
            .await?
            .ok_or(ServiceError::WalletNotFound)?;

        let transfers = self.chain.get_incoming_transfers(&wallet.address, 50).await?;

        for transfer in &transfers {
            if transfer.from_address != payload.expected_payer_address {
                continue;
            }
            let validation = self.memo_cipher.validate_transaction(
                transfer.amount,
                &payload.memo,
                &payload.expected_payer_address,
            );
            if !validation.is_valid {
                continue;
            }

            // tx_hash唯一约束保证恰好一次入账；重复确认是无害的no-op
            let credited = self
                .transactions
                .credit_deposit_once(job.user_id, transfer.amount, &transfer.tx_hash)
                .await?;
            if credited {
                self.audit.log(
                    job.user_id,
                    "deposit_confirmed",
                    "transaction",
                    Some(transfer.tx_hash.clone()),
                    Some(serde_json::json!({ "amount": transfer.amount.to_string() })),
                );
                self.notifier.notify_user(
                    job.user_id,
                    "deposit_confirmed",
                    format!("Your deposit of {} has been credited", transfer.amount),
                );
            }
            return Ok(());
        }

        // 还没观察到匹配的转账：让重试机制稍后再查
        Err(ServiceError::Network(
            "matching transfer not yet observed on chain".into(),
        ))
    }
}

// ============ 余额刷新 ============

pub struct BalanceRefreshHandler {
    wallet_service: Arc<WalletService>,
}

impl BalanceRefreshHandler {
    pub fn new(wallet_service: Arc<WalletService>) -> Self {
        Self { wallet_service }
    }
}

#[async_trait]
impl JobHandler for BalanceRefreshHandler {
    async fn handle(&self, job: &Job) -> Result<(), ServiceError> {
        self.wallet_service
            .refresh_chain_balance(job.user_id)
            .await?;
        Ok(())
    }
}

// ============ 提现对账 ============

#[derive(Deserialize)]
struct ReconcilePayload {
    transaction_id: Uuid,
}

pub struct WithdrawalReconcileHandler {
    transactions: Arc<dyn TransactionRepository>,
    chain: Arc<dyn ChainSource>,
    audit: Arc<AuditService>,
    notifier: Arc<dyn Notifier>,
}

impl WithdrawalReconcileHandler {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        chain: Arc<dyn ChainSource>,
        audit: Arc<AuditService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            transactions,
            chain,
            audit,
            notifier,
        }
    }
}

#[async_trait]
impl JobHandler for WithdrawalReconcileHandler {
    async fn handle(&self, job: &Job) -> Result<(), ServiceError> {
        let payload: ReconcilePayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| ServiceError::validation(format!("malformed reconcile payload: {}", e)))?;

        let tx = self
            .transactions
            .find_by_id_for_user(payload.transaction_id, job.user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("withdrawal transaction not found".into()))?;

        if tx.status.is_terminal() {
            return Ok(());
        }

        match self.chain.find_transfer_by_dedupe_key(tx.id).await? {
            Some(receipt) => {
                self.transactions
                    .transition_status(tx.id, tx.status, TxStatus::Completed, Some(&receipt.tx_hash))
                    .await?;
                self.audit.log(
                    job.user_id,
                    "withdrawal_completed",
                    "transaction",
                    Some(tx.id.to_string()),
                    Some(serde_json::json!({ "tx_hash": receipt.tx_hash, "reconciled": true })),
                );
                self.notifier.notify_user(
                    job.user_id,
                    "withdrawal_completed",
                    format!("Your withdrawal of {} has been confirmed", tx.amount),
                );
                Ok(())
            }
            None if job.attempts >= job.max_attempts => {
                // 最后一次尝试仍未见到转账：判失败，余额不受影响
                self.transactions
                    .transition_status(tx.id, tx.status, TxStatus::Failed, None)
                    .await?;
                self.audit.log(
                    job.user_id,
                    "withdrawal_failed",
                    "transaction",
                    Some(tx.id.to_string()),
                    Some(serde_json::json!({ "reason": "transfer never confirmed on chain" })),
                );
                self.notifier.notify_user(
                    job.user_id,
                    "withdrawal_failed",
                    "Your withdrawal could not be confirmed; your balance was not affected".into(),
                );
                Ok(())
            }
            None => Err(ServiceError::Network(
                "transfer not yet visible on chain".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, sync::Arc};

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::{
        domain::{JobStatus, JobType},
        infrastructure::encryption::MemoSecret,
        service::{
            chain_client::ChainTransfer,
            testing::{
                FakeChain, InMemoryJobs, InMemoryTransactions, InMemoryWallets, NullNotifier,
                RecordingAuditLogs,
            },
        },
    };

    const PAYER: &str = "UQDrLq-X6jKZNHAScgghh0h1iog3StK71zn8dcmrOj8jPTk5";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn cipher() -> Arc<MemoCipher> {
        Arc::new(MemoCipher::new(
            MemoSecret::new(b"handler-test-secret".to_vec()).unwrap(),
            3600,
            dec("0.001"),
        ))
    }

    fn scoped_job(user_id: i64, job_type: JobType, mut payload: serde_json::Value) -> Job {
        payload["user_scoped"] = serde_json::json!(true);
        payload["user_id"] = serde_json::json!(user_id);
        Job {
            id: uuid::Uuid::new_v4(),
            user_id,
            job_type,
            payload,
            priority: 0,
            status: JobStatus::Processing,
            attempts: 1,
            max_attempts: 3,
            last_error: None,
            scheduled_for: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn deposit_is_credited_exactly_once() {
        let memo_cipher = cipher();
        let chain = Arc::new(FakeChain::new());
        let transactions = Arc::new(InMemoryTransactions::new());
        let wallets = Arc::new(InMemoryWallets::new());
        let audit = Arc::new(AuditService::new(Arc::new(RecordingAuditLogs::new())));

        let wallet = wallets.insert(7, "UQwallet").await.unwrap();
        transactions.add_wallet(7).await;

        let memo = memo_cipher
            .encrypt_memo(dec("5"), PAYER, Utc::now().timestamp())
            .unwrap();
        chain
            .push_incoming(
                &wallet.address,
                ChainTransfer {
                    tx_hash: "hash-1".into(),
                    from_address: PAYER.into(),
                    to_address: wallet.address.clone(),
                    amount: dec("5"),
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await;

        let handler = DepositConfirmHandler::new(
            memo_cipher,
            chain,
            transactions.clone(),
            wallets,
            audit,
            Arc::new(NullNotifier),
        );

        let job = scoped_job(
            7,
            JobType::DepositConfirm,
            serde_json::json!({
                "memo": memo,
                "expected_payer_address": PAYER,
            }),
        );

        // 第一次入账，第二次重复执行是no-op
        handler.handle(&job).await.unwrap();
        handler.handle(&job).await.unwrap();

        let (deposited, _) = transactions.balance_components(7).await.unwrap();
        assert_eq!(deposited, dec("5"));
    }

    #[tokio::test]
    async fn deposit_with_expired_memo_fails_non_retryably() {
        let memo_cipher = cipher();
        let transactions = Arc::new(InMemoryTransactions::new());
        let wallets = Arc::new(InMemoryWallets::new());
        wallets.insert(7, "UQwallet").await.unwrap();

        let stale = Utc::now().timestamp() - 7200;
        let memo = memo_cipher.encrypt_memo(dec("5"), PAYER, stale).unwrap();

        let handler = DepositConfirmHandler::new(
            memo_cipher,
            Arc::new(FakeChain::new()),
            transactions.clone(),
            wallets,
            Arc::new(AuditService::new(Arc::new(RecordingAuditLogs::new()))),
            Arc::new(NullNotifier),
        );

        let job = scoped_job(
            7,
            JobType::DepositConfirm,
            serde_json::json!({ "memo": memo, "expected_payer_address": PAYER }),
        );

        let err = handler.handle(&job).await.unwrap_err();
        assert!(matches!(err, ServiceError::MemoIntegrity(_)));
        assert!(!err.is_retryable());

        let (deposited, _) = transactions.balance_components(7).await.unwrap();
        assert_eq!(deposited, Decimal::ZERO);
    }

    #[tokio::test]
    async fn deposit_from_wrong_payer_is_not_credited() {
        let memo_cipher = cipher();
        let chain = Arc::new(FakeChain::new());
        let transactions = Arc::new(InMemoryTransactions::new());
        let wallets = Arc::new(InMemoryWallets::new());
        let wallet = wallets.insert(7, "UQwallet").await.unwrap();
        transactions.add_wallet(7).await;

        let memo = memo_cipher
            .encrypt_memo(dec("5"), PAYER, Utc::now().timestamp())
            .unwrap();
        // 另一个地址转来了同样的金额
        chain
            .push_incoming(
                &wallet.address,
                ChainTransfer {
                    tx_hash: "hash-2".into(),
                    from_address: "UQattacker".into(),
                    to_address: wallet.address.clone(),
                    amount: dec("5"),
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await;

        let handler = DepositConfirmHandler::new(
            memo_cipher,
            chain,
            transactions.clone(),
            wallets,
            Arc::new(AuditService::new(Arc::new(RecordingAuditLogs::new()))),
            Arc::new(NullNotifier),
        );

        let job = scoped_job(
            7,
            JobType::DepositConfirm,
            serde_json::json!({ "memo": memo, "expected_payer_address": PAYER }),
        );

        // 没有匹配转账，等待重试
        let err = handler.handle(&job).await.unwrap_err();
        assert!(err.is_retryable());
        let (deposited, _) = transactions.balance_components(7).await.unwrap();
        assert_eq!(deposited, Decimal::ZERO);
    }

    #[tokio::test]
    async fn reconcile_completes_withdrawal_once_visible() {
        let chain = Arc::new(FakeChain::new());
        let transactions = Arc::new(InMemoryTransactions::new());
        transactions.add_wallet(7).await;
        transactions.seed_completed_deposit(7, dec("10")).await;

        // 留一笔processing中的提现，链上已经能查到去重键
        let tx = match transactions
            .reserve_withdrawal(7, dec("4"), PAYER)
            .await
            .unwrap()
        {
            crate::repository::WithdrawalReservation::Reserved(tx) => tx,
            _ => panic!("reservation must succeed"),
        };
        transactions
            .transition_status(tx.id, TxStatus::Pending, TxStatus::Processing, None)
            .await
            .unwrap();
        chain
            .confirmed_keys
            .lock()
            .await
            .insert(tx.id, "chain-hash".into());

        let handler = WithdrawalReconcileHandler::new(
            transactions.clone(),
            chain,
            Arc::new(AuditService::new(Arc::new(RecordingAuditLogs::new()))),
            Arc::new(NullNotifier),
        );

        let job = scoped_job(
            7,
            JobType::WithdrawalReconcile,
            serde_json::json!({ "transaction_id": tx.id }),
        );
        handler.handle(&job).await.unwrap();

        let stored = transactions.get(tx.id).await.unwrap();
        assert_eq!(stored.status, TxStatus::Completed);
        assert_eq!(stored.tx_hash.as_deref(), Some("chain-hash"));
    }

    #[tokio::test]
    async fn reconcile_fails_withdrawal_after_final_attempt() {
        let transactions = Arc::new(InMemoryTransactions::new());
        transactions.add_wallet(7).await;
        transactions.seed_completed_deposit(7, dec("10")).await;
        let tx = match transactions
            .reserve_withdrawal(7, dec("4"), PAYER)
            .await
            .unwrap()
        {
            crate::repository::WithdrawalReservation::Reserved(tx) => tx,
            _ => panic!("reservation must succeed"),
        };
        transactions
            .transition_status(tx.id, TxStatus::Pending, TxStatus::Processing, None)
            .await
            .unwrap();

        let handler = WithdrawalReconcileHandler::new(
            transactions.clone(),
            Arc::new(FakeChain::new()),
            Arc::new(AuditService::new(Arc::new(RecordingAuditLogs::new()))),
            Arc::new(NullNotifier),
        );

        // 非最后一次尝试：可重试错误
        let mut job = scoped_job(
            7,
            JobType::WithdrawalReconcile,
            serde_json::json!({ "transaction_id": tx.id }),
        );
        job.attempts = 1;
        assert!(handler.handle(&job).await.unwrap_err().is_retryable());

        // 最后一次尝试：判失败，可用余额恢复
        job.attempts = 3;
        handler.handle(&job).await.unwrap();
        assert_eq!(
            transactions.get(tx.id).await.unwrap().status,
            TxStatus::Failed
        );
        let open = transactions.list_open_withdrawals(7).await.unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn reconcile_is_a_noop_for_terminal_transactions() {
        let transactions = Arc::new(InMemoryTransactions::new());
        transactions.add_wallet(7).await;
        transactions.seed_completed_deposit(7, dec("10")).await;
        let tx = match transactions
            .reserve_withdrawal(7, dec("4"), PAYER)
            .await
            .unwrap()
        {
            crate::repository::WithdrawalReservation::Reserved(tx) => tx,
            _ => panic!("reservation must succeed"),
        };
        transactions
            .transition_status(tx.id, TxStatus::Pending, TxStatus::Completed, Some("done"))
            .await
            .unwrap();

        let handler = WithdrawalReconcileHandler::new(
            transactions.clone(),
            Arc::new(FakeChain::new()),
            Arc::new(AuditService::new(Arc::new(RecordingAuditLogs::new()))),
            Arc::new(NullNotifier),
        );

        let job = scoped_job(
            7,
            JobType::WithdrawalReconcile,
            serde_json::json!({ "transaction_id": tx.id }),
        );
        // 已终结的提现再跑对账不产生第二次扣减
        handler.handle(&job).await.unwrap();
        handler.handle(&job).await.unwrap();

        let (deposited, withdrawn) = transactions.balance_components(7).await.unwrap();
        assert_eq!(deposited - withdrawn, dec("6"));
        assert_eq!(
            transactions.get(tx.id).await.unwrap().tx_hash.as_deref(),
            Some("done")
        );
    }

    #[tokio::test]
    async fn wallet_create_handler_is_idempotent() {
        let wallets = Arc::new(InMemoryWallets::new());
        let jobs: Arc<InMemoryJobs> = Arc::new(InMemoryJobs::new());
        let audit = Arc::new(AuditService::new(Arc::new(RecordingAuditLogs::new())));
        let wallet_service = Arc::new(crate::service::wallet_service::WalletService::new(
            wallets.clone(),
            Arc::new(crate::service::ledger::LedgerService::new(Arc::new(
                InMemoryTransactions::new(),
            ))),
            Arc::new(crate::service::access_guard::AccessGuard::new(audit.clone())),
            audit.clone(),
            Arc::new(FakeChain::new()),
            Arc::new(crate::queue::JobQueue::new(jobs, audit, 3)),
            Arc::new(NullNotifier),
        ));

        let handler = WalletCreateHandler::new(wallet_service);
        let job = scoped_job(7, JobType::WalletCreate, serde_json::json!({}));

        handler.handle(&job).await.unwrap();
        // 重复执行（重试场景）不报错
        handler.handle(&job).await.unwrap();
        assert!(wallets.find_by_user(7).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn balance_refresh_updates_snapshot() {
        let wallets = Arc::new(InMemoryWallets::new());
        let chain = Arc::new(FakeChain::new());
        let wallet = wallets.insert(7, "UQwallet").await.unwrap();
        chain
            .balances
            .lock()
            .await
            .insert(wallet.address.clone(), dec("3.5"));

        let jobs: Arc<InMemoryJobs> = Arc::new(InMemoryJobs::new());
        let audit = Arc::new(AuditService::new(Arc::new(RecordingAuditLogs::new())));
        let wallet_service = Arc::new(crate::service::wallet_service::WalletService::new(
            wallets.clone(),
            Arc::new(crate::service::ledger::LedgerService::new(Arc::new(
                InMemoryTransactions::new(),
            ))),
            Arc::new(crate::service::access_guard::AccessGuard::new(audit.clone())),
            audit.clone(),
            chain,
            Arc::new(crate::queue::JobQueue::new(jobs, audit, 3)),
            Arc::new(NullNotifier),
        ));

        let handler = BalanceRefreshHandler::new(wallet_service);
        let job = scoped_job(7, JobType::BalanceRefresh, serde_json::json!({}));
        handler.handle(&job).await.unwrap();

        let stored = wallets.find_by_user(7).await.unwrap().unwrap();
        assert_eq!(stored.cached_balance, dec("3.5"));
        assert!(stored.balance_synced_at.is_some());
    }
}
