//! 测试替身：内存版Repository与可编程链上数据源
//! 单元测试不依赖数据库，并发语义用单把锁近似（按用户串行化的超集）

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    domain::{AuditLogEntry, ComplianceRecord, Job, JobStatus, JobType, SecurityEvent, Transaction,
        TxKind, TxStatus, Wallet},
    repository::{
        audit_logs::NewAuditLog, jobs::NewJob, AuditLogRepository, ComplianceRepository,
        JobRepository, TransactionRepository, WalletRepository, WithdrawalReservation,
    },
    service::{
        chain_client::{ChainSource, ChainTransfer, TransferReceipt},
        error::ServiceError,
    },
};

// ============ 交易 ============

#[derive(Default)]
pub struct InMemoryTransactions {
    rows: Mutex<Vec<Transaction>>,
    wallets: Mutex<HashSet<i64>>,
}

impl InMemoryTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_wallet(&self, user_id: i64) {
        self.wallets.lock().await.insert(user_id);
    }

    async fn seed(&self, user_id: i64, kind: TxKind, amount: Decimal, status: TxStatus) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.rows.lock().await.push(Transaction {
            id,
            user_id,
            kind,
            amount,
            status,
            tx_hash: None,
            destination_address: None,
            created_at: now,
            updated_at: now,
            completed_at: status.is_terminal().then_some(now),
        });
        id
    }

    pub async fn seed_completed_deposit(&self, user_id: i64, amount: Decimal) -> Uuid {
        self.seed(user_id, TxKind::Deposit, amount, TxStatus::Completed)
            .await
    }

    pub async fn seed_completed_withdrawal(&self, user_id: i64, amount: Decimal) -> Uuid {
        self.seed(user_id, TxKind::Withdrawal, amount, TxStatus::Completed)
            .await
    }

    pub async fn seed_pending_withdrawal(&self, user_id: i64, amount: Decimal) -> Uuid {
        self.seed(user_id, TxKind::Withdrawal, amount, TxStatus::Pending)
            .await
    }

    pub async fn seed_failed_withdrawal(&self, user_id: i64, amount: Decimal) -> Uuid {
        self.seed(user_id, TxKind::Withdrawal, amount, TxStatus::Failed)
            .await
    }

    pub async fn get(&self, tx_id: Uuid) -> Option<Transaction> {
        self.rows.lock().await.iter().find(|t| t.id == tx_id).cloned()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactions {
    async fn balance_components(&self, user_id: i64) -> Result<(Decimal, Decimal), ServiceError> {
        let rows = self.rows.lock().await;
        let sum = |kind: TxKind| {
            rows.iter()
                .filter(|t| t.user_id == user_id && t.kind == kind && t.status == TxStatus::Completed)
                .map(|t| t.amount)
                .sum::<Decimal>()
        };
        Ok((sum(TxKind::Deposit), sum(TxKind::Withdrawal)))
    }

    async fn reserve_withdrawal(
        &self,
        user_id: i64,
        amount: Decimal,
        destination: &str,
    ) -> Result<WithdrawalReservation, ServiceError> {
        if !self.wallets.lock().await.contains(&user_id) {
            return Err(ServiceError::WalletNotFound);
        }

        let mut rows = self.rows.lock().await;
        let deposited: Decimal = rows
            .iter()
            .filter(|t| {
                t.user_id == user_id && t.kind == TxKind::Deposit && t.status == TxStatus::Completed
            })
            .map(|t| t.amount)
            .sum();
        let withdrawn: Decimal = rows
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.kind == TxKind::Withdrawal
                    && t.status == TxStatus::Completed
            })
            .map(|t| t.amount)
            .sum();
        let open: Decimal = rows
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.kind == TxKind::Withdrawal
                    && matches!(t.status, TxStatus::Pending | TxStatus::Processing)
            })
            .map(|t| t.amount)
            .sum();

        let spendable = deposited - withdrawn - open;
        if spendable < amount {
            return Ok(WithdrawalReservation::Insufficient {
                available: spendable.max(Decimal::ZERO),
            });
        }

        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id,
            kind: TxKind::Withdrawal,
            amount,
            status: TxStatus::Pending,
            tx_hash: None,
            destination_address: Some(destination.to_string()),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        rows.push(tx.clone());
        Ok(WithdrawalReservation::Reserved(tx))
    }

    async fn transition_status(
        &self,
        tx_id: Uuid,
        from: TxStatus,
        to: TxStatus,
        tx_hash: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let mut rows = self.rows.lock().await;
        for t in rows.iter_mut() {
            if t.id == tx_id && t.status == from {
                t.status = to;
                if let Some(hash) = tx_hash {
                    t.tx_hash = Some(hash.to_string());
                }
                if to == TxStatus::Completed {
                    t.completed_at = Some(Utc::now());
                }
                t.updated_at = Utc::now();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn credit_deposit_once(
        &self,
        user_id: i64,
        amount: Decimal,
        tx_hash: &str,
    ) -> Result<bool, ServiceError> {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|t| t.tx_hash.as_deref() == Some(tx_hash)) {
            return Ok(false);
        }
        let now = Utc::now();
        rows.push(Transaction {
            id: Uuid::new_v4(),
            user_id,
            kind: TxKind::Deposit,
            amount,
            status: TxStatus::Completed,
            tx_hash: Some(tx_hash.to_string()),
            destination_address: None,
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
        });
        Ok(true)
    }

    async fn find_by_id_for_user(
        &self,
        tx_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Transaction>, ServiceError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|t| t.id == tx_id && t.user_id == user_id)
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, ServiceError> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, ServiceError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|t| t.user_id == user_id && t.created_at > since)
            .count() as i64)
    }

    async fn list_open_withdrawals(&self, user_id: i64) -> Result<Vec<Transaction>, ServiceError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.kind == TxKind::Withdrawal
                    && matches!(t.status, TxStatus::Pending | TxStatus::Processing)
            })
            .cloned()
            .collect())
    }
}

// ============ 审计 ============

#[derive(Default)]
pub struct RecordingAuditLogs {
    pub entries: Mutex<Vec<AuditLogEntry>>,
    pub security_events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingAuditLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn actions(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

#[async_trait]
impl AuditLogRepository for RecordingAuditLogs {
    async fn insert(&self, entry: NewAuditLog) -> Result<Uuid, ServiceError> {
        let id = Uuid::new_v4();
        self.entries.lock().await.push(AuditLogEntry {
            id,
            user_id: entry.user_id,
            action: entry.action,
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            details: entry.details,
            session_id: entry.session_id,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn insert_security_event(
        &self,
        attempting_user_id: i64,
        target_user_id: i64,
        resource: &str,
        blocked: bool,
    ) -> Result<Uuid, ServiceError> {
        let id = Uuid::new_v4();
        self.security_events.lock().await.push(SecurityEvent {
            id,
            attempting_user_id,
            target_user_id,
            resource: resource.to_string(),
            blocked,
            severity: "critical".to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        _offset: i64,
    ) -> Result<Vec<AuditLogEntry>, ServiceError> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_security_events(
        &self,
        blocked: Option<bool>,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        Ok(self
            .security_events
            .lock()
            .await
            .iter()
            .filter(|e| blocked.is_none() || blocked == Some(e.blocked))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

// ============ 任务 ============

#[derive(Default)]
pub struct InMemoryJobs {
    rows: Mutex<Vec<Job>>,
}

impl InMemoryJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, job_id: Uuid) -> Option<Job> {
        self.rows.lock().await.iter().find(|j| j.id == job_id).cloned()
    }

    pub async fn all(&self) -> Vec<Job> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobs {
    async fn insert(&self, job: NewJob) -> Result<Job, ServiceError> {
        let now = Utc::now();
        let row = Job {
            id: Uuid::new_v4(),
            user_id: job.user_id,
            job_type: job.job_type,
            payload: job.payload,
            priority: job.priority,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: job.max_attempts,
            last_error: None,
            scheduled_for: job.scheduled_for,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().await.push(row.clone());
        Ok(row)
    }

    async fn claim_next(&self, job_type: JobType) -> Result<Option<Job>, ServiceError> {
        let mut rows = self.rows.lock().await;
        let now = Utc::now();
        let mut candidates: Vec<&mut Job> = rows
            .iter_mut()
            .filter(|j| {
                j.job_type == job_type
                    && matches!(j.status, JobStatus::Pending | JobStatus::Retrying)
                    && j.scheduled_for.map(|t| t <= now).unwrap_or(true)
            })
            .collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

        match candidates.into_iter().next() {
            Some(job) => {
                job.status = JobStatus::Processing;
                job.attempts += 1;
                job.updated_at = now;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_completed(&self, job_id: Uuid) -> Result<(), ServiceError> {
        let mut rows = self.rows.lock().await;
        if let Some(j) = rows
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Processing)
        {
            j.status = JobStatus::Completed;
            j.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_retrying(
        &self,
        job_id: Uuid,
        error: &str,
        next_run: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut rows = self.rows.lock().await;
        if let Some(j) = rows
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Processing)
        {
            j.status = JobStatus::Retrying;
            j.last_error = Some(error.to_string());
            j.scheduled_for = Some(next_run);
            j.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), ServiceError> {
        let mut rows = self.rows.lock().await;
        if let Some(j) = rows
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Processing)
        {
            j.status = JobStatus::Failed;
            j.last_error = Some(error.to_string());
            j.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn cancel_pending(&self, job_id: Uuid, user_id: i64) -> Result<bool, ServiceError> {
        let mut rows = self.rows.lock().await;
        if let Some(j) = rows
            .iter_mut()
            .find(|j| j.id == job_id && j.user_id == user_id && j.status == JobStatus::Pending)
        {
            j.status = JobStatus::Cancelled;
            j.updated_at = Utc::now();
            return Ok(true);
        }
        Ok(false)
    }

    async fn find_by_id_for_user(
        &self,
        job_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Job>, ServiceError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|j| j.id == job_id && j.user_id == user_id)
            .cloned())
    }
}

// ============ 合规记录 ============

pub struct StaticCompliance {
    record: Option<ComplianceRecord>,
}

impl StaticCompliance {
    pub fn with_record(record: ComplianceRecord) -> Self {
        Self {
            record: Some(record),
        }
    }

    pub fn empty() -> Self {
        Self { record: None }
    }
}

#[async_trait]
impl ComplianceRepository for StaticCompliance {
    async fn find_by_user(&self, user_id: i64) -> Result<Option<ComplianceRecord>, ServiceError> {
        Ok(self
            .record
            .clone()
            .filter(|r| r.user_id == user_id))
    }
}

// ============ 钱包 ============

#[derive(Default)]
pub struct InMemoryWallets {
    rows: Mutex<HashMap<i64, Wallet>>,
}

impl InMemoryWallets {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletRepository for InMemoryWallets {
    async fn find_by_user(&self, user_id: i64) -> Result<Option<Wallet>, ServiceError> {
        Ok(self.rows.lock().await.get(&user_id).cloned())
    }

    async fn insert(&self, user_id: i64, address: &str) -> Result<Wallet, ServiceError> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&user_id) {
            return Err(ServiceError::WalletAlreadyExists);
        }
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id,
            address: address.to_string(),
            cached_balance: Decimal::ZERO,
            balance_synced_at: None,
            created_at: Utc::now(),
        };
        rows.insert(user_id, wallet.clone());
        Ok(wallet)
    }

    async fn update_cached_balance(
        &self,
        user_id: i64,
        balance: Decimal,
    ) -> Result<(), ServiceError> {
        let mut rows = self.rows.lock().await;
        if let Some(w) = rows.get_mut(&user_id) {
            w.cached_balance = balance;
            w.balance_synced_at = Some(Utc::now());
        }
        Ok(())
    }
}

// ============ 通知 ============

/// 丢弃一切通知的替身
pub struct NullNotifier;

impl crate::service::notification_service::Notifier for NullNotifier {
    fn notify_user(&self, _user_id: i64, _kind: &str, _body: String) {}
}

// ============ 链上数据源 ============

/// 可编程链上数据源
/// submit_failures 控制前N次提交失败（模拟不稳定上游）
pub struct FakeChain {
    pub balances: Mutex<HashMap<String, Decimal>>,
    pub incoming: Mutex<HashMap<String, Vec<ChainTransfer>>>,
    pub submitted: Mutex<Vec<(String, Decimal, Uuid)>>,
    pub confirmed_keys: Mutex<HashMap<Uuid, String>>,
    submit_failures: AtomicU32,
    submit_timeout: std::sync::atomic::AtomicBool,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            incoming: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            confirmed_keys: Mutex::new(HashMap::new()),
            submit_failures: AtomicU32::new(0),
            submit_timeout: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn fail_submissions(&self, count: u32) {
        self.submit_failures.store(count, Ordering::SeqCst);
    }

    pub fn timeout_submissions(&self) {
        self.submit_timeout.store(true, Ordering::SeqCst);
    }

    pub async fn push_incoming(&self, address: &str, transfer: ChainTransfer) {
        self.incoming
            .lock()
            .await
            .entry(address.to_string())
            .or_default()
            .push(transfer);
    }
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainSource for FakeChain {
    async fn get_address_balance(&self, address: &str) -> Result<Decimal, ServiceError> {
        Ok(self
            .balances
            .lock()
            .await
            .get(address)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn get_incoming_transfers(
        &self,
        address: &str,
        _limit: u32,
    ) -> Result<Vec<ChainTransfer>, ServiceError> {
        Ok(self
            .incoming
            .lock()
            .await
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_transfer(
        &self,
        destination: &str,
        amount: Decimal,
        dedupe_key: Uuid,
    ) -> Result<TransferReceipt, ServiceError> {
        if self.submit_timeout.load(Ordering::SeqCst) {
            return Err(ServiceError::Timeout("transfer submission".into()));
        }
        let remaining = self.submit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.submit_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::Network("upstream unavailable".into()));
        }

        self.submitted
            .lock()
            .await
            .push((destination.to_string(), amount, dedupe_key));
        let hash = format!("fake-{}", dedupe_key);
        self.confirmed_keys.lock().await.insert(dedupe_key, hash.clone());
        Ok(TransferReceipt { tx_hash: hash })
    }

    async fn find_transfer_by_dedupe_key(
        &self,
        dedupe_key: Uuid,
    ) -> Result<Option<TransferReceipt>, ServiceError> {
        Ok(self
            .confirmed_keys
            .lock()
            .await
            .get(&dedupe_key)
            .map(|hash| TransferReceipt {
                tx_hash: hash.clone(),
            }))
    }
}
