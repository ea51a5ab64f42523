//! 应用状态
//! 进程启动时构建一次的共享资源；服务通过显式注入传递给handler和Worker，
//! 不经过全局单例

use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;

use crate::{
    config::Config,
    domain::JobType,
    infrastructure::{db::PgPool, encryption::MemoSecret, retry::RetryPolicy},
    queue::{
        handlers::{
            BalanceRefreshHandler, DepositConfirmHandler, WalletCreateHandler,
            WithdrawalReconcileHandler,
        },
        JobQueue, WorkerPool,
    },
    repository::{
        AuditLogRepository, ComplianceRepository, JobRepository, PgAuditLogRepository,
        PgComplianceRepository, PgJobRepository, PgTransactionRepository, PgUserRepository,
        PgWalletRepository, TransactionRepository, UserRepository, WalletRepository,
    },
    service::{
        access_guard::AccessGuard,
        assistant::AssistantService,
        audit_service::AuditService,
        chain_client::{ChainClient, ChainSource},
        compliance_engine::{ComplianceEngine, ComplianceLimits},
        deposit_memo::MemoCipher,
        ledger::LedgerService,
        notification_service::{NotificationService, Notifier},
        wallet_service::WalletService,
        withdrawal_service::{WithdrawalLimits, WithdrawalService},
    },
};

pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,

    pub users: Arc<dyn UserRepository>,
    pub wallets: Arc<dyn WalletRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub audit_logs: Arc<dyn AuditLogRepository>,

    pub audit: Arc<AuditService>,
    pub memo_cipher: Arc<MemoCipher>,
    pub chain: Arc<dyn ChainSource>,
    pub notifier: Arc<dyn Notifier>,
    pub queue: Arc<JobQueue>,
    pub wallet_service: Arc<WalletService>,
    pub withdrawal_service: Arc<WithdrawalService>,
    pub assistant: Arc<AssistantService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Arc<Config>) -> anyhow::Result<Self> {
        let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
        let wallets: Arc<dyn WalletRepository> = Arc::new(PgWalletRepository::new(pool.clone()));
        let transactions: Arc<dyn TransactionRepository> =
            Arc::new(PgTransactionRepository::new(pool.clone()));
        let jobs: Arc<dyn JobRepository> = Arc::new(PgJobRepository::new(pool.clone()));
        let audit_logs: Arc<dyn AuditLogRepository> =
            Arc::new(PgAuditLogRepository::new(pool.clone()));
        let compliance_records: Arc<dyn ComplianceRepository> =
            Arc::new(PgComplianceRepository::new(pool.clone()));

        let audit = Arc::new(AuditService::new(audit_logs.clone()));
        let guard = Arc::new(AccessGuard::new(audit.clone()));
        let ledger = Arc::new(LedgerService::new(transactions.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(NotificationService::new(pool.clone()));
        let chain: Arc<dyn ChainSource> = Arc::new(ChainClient::new(&config.chain)?);

        let memo_tolerance: Decimal = config
            .memo
            .amount_tolerance
            .parse()
            .with_context(|| format!("invalid memo tolerance: {}", config.memo.amount_tolerance))?;
        let memo_cipher = Arc::new(MemoCipher::new(
            MemoSecret::new(config.memo.secret.as_bytes().to_vec())?,
            config.memo.ttl_secs,
            memo_tolerance,
        ));

        let queue = Arc::new(JobQueue::new(
            jobs.clone(),
            audit.clone(),
            config.queue.max_attempts,
        ));

        let compliance = Arc::new(ComplianceEngine::new(
            compliance_records,
            transactions.clone(),
            audit.clone(),
            ComplianceLimits::from_config(&config.compliance)?,
        ));

        let wallet_service = Arc::new(WalletService::new(
            wallets.clone(),
            ledger.clone(),
            guard.clone(),
            audit.clone(),
            chain.clone(),
            queue.clone(),
            notifier.clone(),
        ));

        let withdrawal_service = Arc::new(WithdrawalService::new(
            transactions.clone(),
            ledger.clone(),
            guard,
            compliance,
            audit.clone(),
            chain.clone(),
            notifier.clone(),
            queue.clone(),
            WithdrawalLimits::from_config(&config.withdrawal)?,
            RetryPolicy {
                max_attempts: config.withdrawal.submit_max_attempts,
                base_delay_ms: config.withdrawal.submit_base_delay_ms,
                backoff_multiplier: 2.0,
            },
        ));

        let assistant = Arc::new(AssistantService::new(
            wallets.clone(),
            ledger,
            transactions.clone(),
            queue.clone(),
            audit.clone(),
        ));

        Ok(Self {
            pool,
            config,
            users,
            wallets,
            transactions,
            jobs,
            audit_logs,
            audit,
            memo_cipher,
            chain,
            notifier,
            queue,
            wallet_service,
            withdrawal_service,
            assistant,
        })
    }

    /// 组装Worker池：每种任务类型注册对应的处理器
    pub fn build_worker_pool(&self) -> WorkerPool {
        let mut pool = WorkerPool::new(
            self.jobs.clone(),
            self.audit.clone(),
            self.config.queue.clone(),
        );
        pool.register(
            JobType::WalletCreate,
            Arc::new(WalletCreateHandler::new(self.wallet_service.clone())),
        );
        pool.register(
            JobType::DepositConfirm,
            Arc::new(DepositConfirmHandler::new(
                self.memo_cipher.clone(),
                self.chain.clone(),
                self.transactions.clone(),
                self.wallets.clone(),
                self.audit.clone(),
                self.notifier.clone(),
            )),
        );
        pool.register(
            JobType::BalanceRefresh,
            Arc::new(BalanceRefreshHandler::new(self.wallet_service.clone())),
        );
        pool.register(
            JobType::WithdrawalReconcile,
            Arc::new(WithdrawalReconcileHandler::new(
                self.transactions.clone(),
                self.chain.clone(),
                self.audit.clone(),
                self.notifier.clone(),
            )),
        );
        pool
    }
}
