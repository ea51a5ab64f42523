//! KYC合规记录
//! 验证等级决定合规引擎使用的交易上限

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationLevel {
    None,
    Basic,
    Enhanced,
    Full,
}

impl VerificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationLevel::None => "none",
            VerificationLevel::Basic => "basic",
            VerificationLevel::Enhanced => "enhanced",
            VerificationLevel::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(VerificationLevel::None),
            "basic" => Some(VerificationLevel::Basic),
            "enhanced" => Some(VerificationLevel::Enhanced),
            "full" => Some(VerificationLevel::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VerificationStatus::Pending),
            "approved" => Some(VerificationStatus::Approved),
            "rejected" => Some(VerificationStatus::Rejected),
            "expired" => Some(VerificationStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub user_id: i64,
    pub verification_level: VerificationLevel,
    pub verification_status: VerificationStatus,
    pub updated_at: DateTime<Utc>,
}

impl ComplianceRecord {
    /// 没有记录的用户按未验证处理
    pub fn default_for(user_id: i64) -> Self {
        Self {
            user_id,
            verification_level: VerificationLevel::None,
            verification_status: VerificationStatus::Pending,
            updated_at: Utc::now(),
        }
    }
}
