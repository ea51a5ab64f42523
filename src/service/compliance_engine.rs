//! 合规引擎
//! 操作执行前按序评估规则集；block/review 拦截，warn 仅提示。
//! 每次评估无论通过与否都会落审计日志。

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    config::ComplianceConfig,
    domain::{ComplianceRecord, VerificationLevel, VerificationStatus},
    repository::{ComplianceRepository, TransactionRepository},
    service::{audit_service::AuditService, error::ServiceError},
};

/// 规则动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Allow,
    Warn,
    Block,
    Review,
}

/// 触发的规则
#[derive(Debug, Clone, Serialize)]
pub struct RuleHit {
    pub rule: &'static str,
    pub severity: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceOutcome {
    pub allowed: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// 按验证等级的交易上限与AML阈值
#[derive(Debug, Clone)]
pub struct ComplianceLimits {
    pub limit_none: Decimal,
    pub limit_basic: Decimal,
    pub limit_enhanced: Decimal,
    pub limit_full: Decimal,
    pub aml_tx_count_threshold: i64,
    pub aml_large_amount: Decimal,
}

impl ComplianceLimits {
    pub fn from_config(cfg: &ComplianceConfig) -> anyhow::Result<Self> {
        let parse = |name: &str, s: &str| -> anyhow::Result<Decimal> {
            s.parse()
                .map_err(|_| anyhow::anyhow!("invalid compliance limit {}: {}", name, s))
        };
        Ok(Self {
            limit_none: parse("none", &cfg.daily_limit_none)?,
            limit_basic: parse("basic", &cfg.daily_limit_basic)?,
            limit_enhanced: parse("enhanced", &cfg.daily_limit_enhanced)?,
            limit_full: parse("full", &cfg.daily_limit_full)?,
            aml_tx_count_threshold: cfg.aml_tx_count_threshold,
            aml_large_amount: parse("aml_large", &cfg.aml_large_amount)?,
        })
    }

    pub fn ceiling_for(&self, level: VerificationLevel) -> Decimal {
        match level {
            VerificationLevel::None => self.limit_none,
            VerificationLevel::Basic => self.limit_basic,
            VerificationLevel::Enhanced => self.limit_enhanced,
            VerificationLevel::Full => self.limit_full,
        }
    }
}

/// 规则评估所需的上下文，提前收集好，评估本身是纯函数
struct EvaluationContext {
    record: ComplianceRecord,
    recent_tx_count: i64,
    amount: Option<Decimal>,
}

/// 按序评估规则；上限规则比较的是单笔请求金额，
/// 不是过往交易的24小时滚动累计
fn evaluate_rules(limits: &ComplianceLimits, ctx: &EvaluationContext) -> (ComplianceOutcome, Vec<RuleHit>) {
    let mut hits = Vec::new();
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    // 规则1：验证状态
    match ctx.record.verification_status {
        VerificationStatus::Rejected => {
            let msg = "identity verification was rejected".to_string();
            hits.push(RuleHit {
                rule: "VERIFICATION_REJECTED",
                severity: "high",
                message: msg.clone(),
            });
            errors.push(msg);
        }
        VerificationStatus::Expired => {
            let msg = "identity verification expired, re-verification required".to_string();
            hits.push(RuleHit {
                rule: "VERIFICATION_EXPIRED",
                severity: "high",
                message: msg.clone(),
            });
            errors.push(msg);
        }
        VerificationStatus::Pending | VerificationStatus::Approved => {}
    }

    // 规则2：按验证等级的单笔上限
    if let Some(amount) = ctx.amount {
        let ceiling = limits.ceiling_for(ctx.record.verification_level);
        if amount > ceiling {
            let msg = format!(
                "amount {} exceeds the {} verification tier limit of {}",
                amount,
                ctx.record.verification_level.as_str(),
                ceiling
            );
            hits.push(RuleHit {
                rule: "TIER_LIMIT_EXCEEDED",
                severity: "high",
                message: msg.clone(),
            });
            errors.push(msg);
        }
    }

    // 规则3：AML频率启发式（仅提示，不拦截）
    if ctx.recent_tx_count > limits.aml_tx_count_threshold {
        let msg = format!(
            "{} transactions in the last 24h exceeds the activity threshold",
            ctx.recent_tx_count
        );
        hits.push(RuleHit {
            rule: "AML_HIGH_FREQUENCY",
            severity: "medium",
            message: msg.clone(),
        });
        warnings.push(msg);
    }

    // 规则4：AML大额启发式（仅提示）
    if let Some(amount) = ctx.amount {
        if amount >= limits.aml_large_amount {
            let msg = format!("single transaction of {} flagged as large amount", amount);
            hits.push(RuleHit {
                rule: "AML_LARGE_AMOUNT",
                severity: "medium",
                message: msg.clone(),
            });
            warnings.push(msg);
        }
    }

    let allowed = errors.is_empty();
    (
        ComplianceOutcome {
            allowed,
            warnings,
            errors,
        },
        hits,
    )
}

pub struct ComplianceEngine {
    records: Arc<dyn ComplianceRepository>,
    transactions: Arc<dyn TransactionRepository>,
    audit: Arc<AuditService>,
    limits: ComplianceLimits,
}

impl ComplianceEngine {
    pub fn new(
        records: Arc<dyn ComplianceRepository>,
        transactions: Arc<dyn TransactionRepository>,
        audit: Arc<AuditService>,
        limits: ComplianceLimits,
    ) -> Self {
        Self {
            records,
            transactions,
            audit,
            limits,
        }
    }

    pub async fn check_user_compliance(
        &self,
        user_id: i64,
        operation: &str,
        amount: Option<Decimal>,
    ) -> Result<ComplianceOutcome, ServiceError> {
        let record = self
            .records
            .find_by_user(user_id)
            .await?
            .unwrap_or_else(|| ComplianceRecord::default_for(user_id));

        let since = Utc::now() - Duration::hours(24);
        let recent_tx_count = self.transactions.count_since(user_id, since).await?;

        let ctx = EvaluationContext {
            record,
            recent_tx_count,
            amount,
        };
        let (outcome, hits) = evaluate_rules(&self.limits, &ctx);

        self.audit.log(
            user_id,
            "compliance_check",
            "compliance",
            None,
            Some(serde_json::json!({
                "operation": operation,
                "amount": amount.map(|a| a.to_string()),
                "allowed": outcome.allowed,
                "triggered_rules": hits,
            })),
        );

        Ok(outcome)
    }
}
