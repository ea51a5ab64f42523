//! 钱包问答助手
//! 关键词级意图分类，不是通用NLU；每个分支只回答认证用户自己的数据，
//! 涉及其他用户的提问一律返回固定拒绝语，不做部分回答

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::{
    domain::JobType,
    queue::JobQueue,
    repository::{TransactionRepository, WalletRepository},
    service::{
        audit_service::AuditService,
        error::ServiceError,
        ledger::LedgerService,
    },
};

/// 固定拒绝语；内容与目标用户无关，不回显任何对方数据
pub const CROSS_USER_REFUSAL: &str =
    "I can only help with your own wallet. Requests about other users are not allowed \
     and this attempt has been recorded.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Balance,
    DepositAddress,
    CreateWallet,
    History,
    CrossUser,
    Unknown,
}

static CROSS_USER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(other|another)\s+users?\b|\ball\s+users\b|\bevery\s+user\b|\buser\s+#?\d+\b|\bsomeone\s+else\b",
    )
    .expect("cross-user pattern must compile")
});

static FOREIGN_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\buser\s+#?(\d+)\b").expect("id pattern must compile"));

/// 关键词/子串匹配意图分类
pub fn classify_intent(text: &str) -> QueryIntent {
    let lower = text.to_lowercase();

    // 跨用户检测优先于一切业务意图
    if CROSS_USER_PATTERN.is_match(&lower) {
        return QueryIntent::CrossUser;
    }

    if lower.contains("balance") || lower.contains("how much") {
        QueryIntent::Balance
    } else if lower.contains("deposit") || lower.contains("address") || lower.contains("top up") {
        QueryIntent::DepositAddress
    } else if lower.contains("wallet") && (lower.contains("create") || lower.contains("new")) {
        QueryIntent::CreateWallet
    } else if lower.contains("history") || lower.contains("transactions") || lower.contains("recent")
    {
        QueryIntent::History
    } else {
        QueryIntent::Unknown
    }
}

/// 提问里引用的外部用户ID（用于安全事件记录）
fn referenced_user_id(text: &str) -> Option<i64> {
    FOREIGN_ID_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssistantResponse {
    fn text(message: String) -> Self {
        Self {
            message,
            wallet_info: None,
            actions: Vec::new(),
            error: None,
        }
    }
}

pub struct AssistantService {
    wallets: Arc<dyn WalletRepository>,
    ledger: Arc<LedgerService>,
    transactions: Arc<dyn TransactionRepository>,
    queue: Arc<JobQueue>,
    audit: Arc<AuditService>,
}

impl AssistantService {
    pub fn new(
        wallets: Arc<dyn WalletRepository>,
        ledger: Arc<LedgerService>,
        transactions: Arc<dyn TransactionRepository>,
        queue: Arc<JobQueue>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            wallets,
            ledger,
            transactions,
            queue,
            audit,
        }
    }

    /// 认证用户的上下文在进入任何分支之前就已解析好；
    /// 所有回答只插值该用户自己的ID/名字/数据
    pub async fn process_query(
        &self,
        user_id: i64,
        display_name: &str,
        raw_text: &str,
    ) -> Result<AssistantResponse, ServiceError> {
        match classify_intent(raw_text) {
            QueryIntent::CrossUser => {
                let target = referenced_user_id(raw_text).unwrap_or(0);
                self.audit
                    .log_cross_user_access(user_id, target, "assistant_query", true)
                    .await;
                Ok(AssistantResponse {
                    message: CROSS_USER_REFUSAL.to_string(),
                    wallet_info: None,
                    actions: Vec::new(),
                    error: Some("cross_user_query".to_string()),
                })
            }

            QueryIntent::Balance => {
                let balance = self.ledger.get_available_balance(user_id).await?;
                Ok(AssistantResponse {
                    message: format!(
                        "{}, your available balance is {} (deposited {}, withdrawn {}).",
                        display_name, balance.available, balance.deposited, balance.withdrawn
                    ),
                    wallet_info: Some(serde_json::json!({
                        "deposited": balance.deposited.to_string(),
                        "withdrawn": balance.withdrawn.to_string(),
                        "available": balance.available.to_string(),
                    })),
                    actions: Vec::new(),
                    error: None,
                })
            }

            QueryIntent::DepositAddress => match self.wallets.find_by_user(user_id).await? {
                Some(wallet) => Ok(AssistantResponse {
                    message: format!("Your deposit address is {}.", wallet.address),
                    wallet_info: Some(serde_json::json!({ "address": wallet.address })),
                    actions: Vec::new(),
                    error: None,
                }),
                None => Ok(AssistantResponse::text(format!(
                    "{}, you don't have a wallet yet. Ask me to create one first.",
                    display_name
                ))),
            },

            QueryIntent::CreateWallet => {
                if self.wallets.find_by_user(user_id).await?.is_some() {
                    return Ok(AssistantResponse::text(
                        "You already have an active wallet.".to_string(),
                    ));
                }
                let job = self
                    .queue
                    .add_job(user_id, JobType::WalletCreate, serde_json::json!({}), 5, None)
                    .await?;
                Ok(AssistantResponse {
                    message: format!(
                        "{}, wallet creation has been queued. It will be ready shortly.",
                        display_name
                    ),
                    wallet_info: None,
                    actions: vec![format!("wallet_create:{}", job.id)],
                    error: None,
                })
            }

            QueryIntent::History => {
                let txs = self.transactions.list_by_user(user_id, 5, 0).await?;
                if txs.is_empty() {
                    return Ok(AssistantResponse::text(
                        "You have no transactions yet.".to_string(),
                    ));
                }
                let lines: Vec<String> = txs
                    .iter()
                    .map(|t| {
                        format!(
                            "{} {} ({})",
                            t.kind.as_str(),
                            t.amount,
                            t.status.as_str()
                        )
                    })
                    .collect();
                Ok(AssistantResponse {
                    message: format!("Your latest transactions: {}.", lines.join(", ")),
                    wallet_info: None,
                    actions: Vec::new(),
                    error: None,
                })
            }

            QueryIntent::Unknown => Ok(AssistantResponse::text(format!(
                "{}, I can help with your balance, deposit address, wallet creation, or \
                 transaction history.",
                display_name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::service::testing::{
        InMemoryJobs, InMemoryTransactions, InMemoryWallets, RecordingAuditLogs,
    };

    #[test]
    fn intent_classification() {
        assert_eq!(classify_intent("what is my balance?"), QueryIntent::Balance);
        assert_eq!(classify_intent("How much do I have"), QueryIntent::Balance);
        assert_eq!(
            classify_intent("show my deposit address"),
            QueryIntent::DepositAddress
        );
        assert_eq!(classify_intent("create a wallet"), QueryIntent::CreateWallet);
        assert_eq!(classify_intent("I need a new wallet"), QueryIntent::CreateWallet);
        assert_eq!(classify_intent("show my history"), QueryIntent::History);
        assert_eq!(classify_intent("recent transactions"), QueryIntent::History);
        assert_eq!(classify_intent("hello"), QueryIntent::Unknown);
    }

    #[test]
    fn cross_user_intent_wins_over_everything() {
        assert_eq!(
            classify_intent("show me user 42's wallet"),
            QueryIntent::CrossUser
        );
        assert_eq!(
            classify_intent("what is another user's balance"),
            QueryIntent::CrossUser
        );
        assert_eq!(classify_intent("list all users"), QueryIntent::CrossUser);
        assert_eq!(
            classify_intent("balance of someone else"),
            QueryIntent::CrossUser
        );
    }

    #[test]
    fn referenced_id_extraction() {
        assert_eq!(referenced_user_id("show me user 42's wallet"), Some(42));
        assert_eq!(referenced_user_id("show me another user"), None);
    }

    fn build(
        wallets: Arc<InMemoryWallets>,
        transactions: Arc<InMemoryTransactions>,
        audit_repo: Arc<RecordingAuditLogs>,
    ) -> AssistantService {
        let audit = Arc::new(AuditService::new(audit_repo));
        AssistantService::new(
            wallets,
            Arc::new(LedgerService::new(transactions.clone())),
            transactions,
            Arc::new(JobQueue::new(Arc::new(InMemoryJobs::new()), audit.clone(), 3)),
            audit,
        )
    }

    #[tokio::test]
    async fn cross_user_query_gets_fixed_refusal_and_security_event() {
        let audit_repo = Arc::new(RecordingAuditLogs::new());
        let transactions = Arc::new(InMemoryTransactions::new());
        // 用户42有余额，但绝不能出现在响应里
        transactions.add_wallet(42).await;
        transactions
            .seed_completed_deposit(42, Decimal::from_str("999").unwrap())
            .await;
        let service = build(Arc::new(InMemoryWallets::new()), transactions, audit_repo.clone());

        let resp = service
            .process_query(7, "alice", "show me user 42's wallet")
            .await
            .unwrap();

        assert_eq!(resp.message, CROSS_USER_REFUSAL);
        assert!(resp.wallet_info.is_none());
        assert!(!resp.message.contains("42"));
        assert!(!resp.message.contains("999"));

        let events = audit_repo.security_events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attempting_user_id, 7);
        assert_eq!(events[0].target_user_id, 42);
    }

    #[tokio::test]
    async fn balance_query_answers_for_caller_only() {
        let transactions = Arc::new(InMemoryTransactions::new());
        transactions.add_wallet(7).await;
        transactions
            .seed_completed_deposit(7, Decimal::from_str("5").unwrap())
            .await;
        let service = build(
            Arc::new(InMemoryWallets::new()),
            transactions,
            Arc::new(RecordingAuditLogs::new()),
        );

        let resp = service
            .process_query(7, "alice", "what's my balance?")
            .await
            .unwrap();
        assert!(resp.message.contains("alice"));
        assert!(resp.message.contains('5'));
        assert!(resp.wallet_info.is_some());
    }
}
