//! 钱包核心数据库集成测试
//!
//! 覆盖单元测试的内存替身覆盖不到的部分：真实SQL里的用户隔离过滤、
//! 行锁串行化的提现预留、tx_hash唯一约束的恰好一次入账、任务原子领取。
//!
//! 运行方式：
//! ```bash
//! TEST_DATABASE_URL=postgres://... cargo test --test wallet_core_integration -- --ignored
//! ```

mod common;

use std::{str::FromStr, sync::Arc};

use rust_decimal::Decimal;
use uuid::Uuid;

use giftmarket::{
    domain::{JobStatus, JobType, TxStatus},
    repository::{
        jobs::NewJob, AuditLogRepository, JobRepository, PgAuditLogRepository, PgJobRepository,
        PgTransactionRepository, PgWalletRepository, TransactionRepository, WalletRepository,
        WithdrawalReservation,
    },
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn seed_wallet(wallets: &PgWalletRepository, user_id: i64) {
    wallets
        .insert(user_id, &format!("UQtest{:041}", user_id))
        .await
        .expect("wallet insert failed");
}

/// 2笔completed充值(5,3) + 1笔走完整状态机的提现(4) => 可用4
#[tokio::test]
#[ignore]
async fn ledger_balance_is_derived_from_completed_rows() {
    let pool = common::create_test_pool().await;
    let user = 910001;
    common::reset_user(&pool, user).await;

    let wallets = PgWalletRepository::new(pool.clone());
    let transactions = PgTransactionRepository::new(pool.clone());
    seed_wallet(&wallets, user).await;

    transactions
        .credit_deposit_once(user, dec("5"), &format!("it-hash-{}-a", user))
        .await
        .unwrap();
    transactions
        .credit_deposit_once(user, dec("3"), &format!("it-hash-{}-b", user))
        .await
        .unwrap();

    let tx = match transactions
        .reserve_withdrawal(user, dec("4"), "UQdest")
        .await
        .unwrap()
    {
        WithdrawalReservation::Reserved(tx) => tx,
        other => panic!("expected reservation, got {:?}", other),
    };
    assert!(transactions
        .transition_status(tx.id, TxStatus::Pending, TxStatus::Processing, None)
        .await
        .unwrap());
    assert!(transactions
        .transition_status(tx.id, TxStatus::Processing, TxStatus::Completed, Some("it-w-hash"))
        .await
        .unwrap());

    let (deposited, withdrawn) = transactions.balance_components(user).await.unwrap();
    assert_eq!(deposited, dec("8"));
    assert_eq!(withdrawn, dec("4"));
}

/// tx_hash唯一约束保证重复确认不会二次入账
#[tokio::test]
#[ignore]
async fn duplicate_deposit_hash_credits_exactly_once() {
    let pool = common::create_test_pool().await;
    let user = 910002;
    common::reset_user(&pool, user).await;

    let transactions = PgTransactionRepository::new(pool.clone());
    let hash = format!("it-hash-{}-dup", user);

    assert!(transactions
        .credit_deposit_once(user, dec("5"), &hash)
        .await
        .unwrap());
    assert!(!transactions
        .credit_deposit_once(user, dec("5"), &hash)
        .await
        .unwrap());

    let (deposited, _) = transactions.balance_components(user).await.unwrap();
    assert_eq!(deposited, dec("5"));
}

/// 可用4时两笔并发的3只能成功一笔；行锁让第二笔看到第一笔的pending扣减
#[tokio::test]
#[ignore]
async fn concurrent_reservations_cannot_overdraw() {
    let pool = common::create_test_pool().await;
    let user = 910003;
    common::reset_user(&pool, user).await;

    let wallets = PgWalletRepository::new(pool.clone());
    let transactions = Arc::new(PgTransactionRepository::new(pool.clone()));
    seed_wallet(&wallets, user).await;
    transactions
        .credit_deposit_once(user, dec("4"), &format!("it-hash-{}-seed", user))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        transactions.reserve_withdrawal(user, dec("3"), "UQdest"),
        transactions.reserve_withdrawal(user, dec("3"), "UQdest"),
    );

    let results = [a.unwrap(), b.unwrap()];
    let reserved = results
        .iter()
        .filter(|r| matches!(r, WithdrawalReservation::Reserved(_)))
        .count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, WithdrawalReservation::Insufficient { .. }))
        .count();
    assert_eq!(reserved, 1, "exactly one reservation must win");
    assert_eq!(insufficient, 1);

    // 剩余可动用余额是1：再预留1成功，再预留2失败
    assert!(matches!(
        transactions
            .reserve_withdrawal(user, dec("1"), "UQdest")
            .await
            .unwrap(),
        WithdrawalReservation::Reserved(_)
    ));
    assert!(matches!(
        transactions
            .reserve_withdrawal(user, dec("2"), "UQdest")
            .await
            .unwrap(),
        WithdrawalReservation::Insufficient { .. }
    ));
}

/// 领取按优先级降序、创建时间升序；领到即processing且attempts递增
#[tokio::test]
#[ignore]
async fn job_claim_is_atomic_and_priority_ordered() {
    let pool = common::create_test_pool().await;
    let user = 910004;
    common::reset_user(&pool, user).await;

    let jobs = PgJobRepository::new(pool.clone());
    let payload = serde_json::json!({"user_scoped": true, "user_id": user});

    let low = jobs
        .insert(NewJob {
            user_id: user,
            job_type: JobType::BalanceRefresh,
            payload: payload.clone(),
            priority: 0,
            max_attempts: 3,
            scheduled_for: None,
        })
        .await
        .unwrap();
    let high = jobs
        .insert(NewJob {
            user_id: user,
            job_type: JobType::BalanceRefresh,
            payload,
            priority: 10,
            max_attempts: 3,
            scheduled_for: None,
        })
        .await
        .unwrap();

    let first = jobs.claim_next(JobType::BalanceRefresh).await.unwrap().unwrap();
    assert_eq!(first.id, high.id);
    assert_eq!(first.status, JobStatus::Processing);
    assert_eq!(first.attempts, 1);

    let second = jobs.claim_next(JobType::BalanceRefresh).await.unwrap().unwrap();
    assert_eq!(second.id, low.id);

    // 队列已空
    assert!(jobs.claim_next(JobType::BalanceRefresh).await.unwrap().is_none());
}

/// 其他用户的任务既查不到也取消不了
#[tokio::test]
#[ignore]
async fn jobs_are_invisible_across_users() {
    let pool = common::create_test_pool().await;
    let owner = 910005;
    let stranger = 910006;
    common::reset_user(&pool, owner).await;
    common::reset_user(&pool, stranger).await;

    let jobs = PgJobRepository::new(pool.clone());
    let job = jobs
        .insert(NewJob {
            user_id: owner,
            job_type: JobType::BalanceRefresh,
            payload: serde_json::json!({"user_scoped": true, "user_id": owner}),
            priority: 0,
            max_attempts: 3,
            scheduled_for: None,
        })
        .await
        .unwrap();

    assert!(jobs
        .find_by_id_for_user(job.id, stranger)
        .await
        .unwrap()
        .is_none());
    assert!(!jobs.cancel_pending(job.id, stranger).await.unwrap());

    // 本人可以取消自己的pending任务
    assert!(jobs.cancel_pending(job.id, owner).await.unwrap());
}

/// 安全事件按blocked列可过滤；blocked=false的真实越权单独可查
#[tokio::test]
#[ignore]
async fn security_events_are_filterable_by_blocked_flag() {
    let pool = common::create_test_pool().await;
    let attacker = 910007;
    let victim = 910008;
    common::reset_user(&pool, attacker).await;
    common::reset_user(&pool, victim).await;

    let audit_logs = PgAuditLogRepository::new(pool.clone());
    let marker = format!("it-resource-{}", Uuid::new_v4());

    audit_logs
        .insert_security_event(attacker, victim, &marker, true)
        .await
        .unwrap();
    audit_logs
        .insert_security_event(attacker, victim, &marker, false)
        .await
        .unwrap();

    let blocked = audit_logs.list_security_events(Some(true), 500).await.unwrap();
    assert!(blocked
        .iter()
        .any(|e| e.resource == marker && e.blocked && e.severity == "critical"));
    assert!(blocked.iter().all(|e| e.blocked));

    let breaches = audit_logs.list_security_events(Some(false), 500).await.unwrap();
    assert!(breaches.iter().any(|e| e.resource == marker && !e.blocked));
    assert!(breaches.iter().all(|e| !e.blocked));
}

/// 交易查询在SQL层按user_id过滤：别人的交易等同不存在
#[tokio::test]
#[ignore]
async fn transactions_are_invisible_across_users() {
    let pool = common::create_test_pool().await;
    let owner = 910009;
    let stranger = 910010;
    common::reset_user(&pool, owner).await;
    common::reset_user(&pool, stranger).await;

    let transactions = PgTransactionRepository::new(pool.clone());
    transactions
        .credit_deposit_once(owner, dec("9"), &format!("it-hash-{}-iso", owner))
        .await
        .unwrap();

    let owner_txs = transactions.list_by_user(owner, 50, 0).await.unwrap();
    assert_eq!(owner_txs.len(), 1);

    assert!(transactions.list_by_user(stranger, 50, 0).await.unwrap().is_empty());
    assert!(transactions
        .find_by_id_for_user(owner_txs[0].id, stranger)
        .await
        .unwrap()
        .is_none());

    let (stranger_deposited, _) = transactions.balance_components(stranger).await.unwrap();
    assert_eq!(stranger_deposited, Decimal::ZERO);
}
