// KYC合规记录数据访问 Repository
// 记录由外部KYC流程写入，本服务只读

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    domain::{ComplianceRecord, VerificationLevel, VerificationStatus},
    service::error::ServiceError,
};

#[async_trait]
pub trait ComplianceRepository: Send + Sync {
    async fn find_by_user(&self, user_id: i64) -> Result<Option<ComplianceRecord>, ServiceError>;
}

pub struct PgComplianceRepository {
    pool: PgPool,
}

impl PgComplianceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ComplianceRow {
    user_id: i64,
    verification_level: String,
    verification_status: String,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl ComplianceRepository for PgComplianceRepository {
    async fn find_by_user(&self, user_id: i64) -> Result<Option<ComplianceRecord>, ServiceError> {
        let row = sqlx::query_as::<_, ComplianceRow>(
            "SELECT user_id, verification_level, verification_status, updated_at
             FROM compliance_records WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let level = VerificationLevel::parse(&r.verification_level).ok_or_else(|| {
                ServiceError::internal(format!(
                    "unknown verification level: {}",
                    r.verification_level
                ))
            })?;
            let status = VerificationStatus::parse(&r.verification_status).ok_or_else(|| {
                ServiceError::internal(format!(
                    "unknown verification status: {}",
                    r.verification_status
                ))
            })?;
            Ok(ComplianceRecord {
                user_id: r.user_id,
                verification_level: level,
                verification_status: status,
                updated_at: r.updated_at,
            })
        })
        .transpose()
    }
}
