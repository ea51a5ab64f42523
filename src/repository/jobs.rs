// 后台任务数据访问 Repository
// 领取必须原子化：FOR UPDATE SKIP LOCKED 子查询 + 条件更新，
// 并发轮询的Worker不会拿到同一个任务

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::{Job, JobStatus, JobType},
    service::error::ServiceError,
};

#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: i64,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub max_attempts: i32,
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: NewJob) -> Result<Job, ServiceError>;

    /// 原子领取：优先级最高、创建最早、scheduled_for 已到期的待处理任务。
    /// 领取即置为 processing 并递增 attempts。
    async fn claim_next(&self, job_type: JobType) -> Result<Option<Job>, ServiceError>;

    async fn mark_completed(&self, job_id: Uuid) -> Result<(), ServiceError>;

    /// 还有剩余尝试次数：置为 retrying 并安排下次执行
    async fn mark_retrying(
        &self,
        job_id: Uuid,
        error: &str,
        next_run: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    /// 尝试次数耗尽：终态 failed
    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), ServiceError>;

    /// 只能取消自己的 pending 任务；processing 的任务跑完为止
    async fn cancel_pending(&self, job_id: Uuid, user_id: i64) -> Result<bool, ServiceError>;

    async fn find_by_id_for_user(
        &self,
        job_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Job>, ServiceError>;
}

pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    user_id: i64,
    job_type: String,
    payload: serde_json::Value,
    priority: i32,
    status: String,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    scheduled_for: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_domain(self) -> Result<Job, ServiceError> {
        let job_type = JobType::parse(&self.job_type)
            .ok_or_else(|| ServiceError::internal(format!("unknown job type: {}", self.job_type)))?;
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| ServiceError::internal(format!("unknown job status: {}", self.status)))?;
        Ok(Job {
            id: self.id,
            user_id: self.user_id,
            job_type,
            payload: self.payload,
            priority: self.priority,
            status,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            last_error: self.last_error,
            scheduled_for: self.scheduled_for,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, user_id, job_type, payload, priority, status, attempts, \
                           max_attempts, last_error, scheduled_for, created_at, updated_at";

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: NewJob) -> Result<Job, ServiceError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO jobs (id, user_id, job_type, payload, priority, status, max_attempts, scheduled_for)
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(job.user_id)
        .bind(job.job_type.as_str())
        .bind(&job.payload)
        .bind(job.priority)
        .bind(job.max_attempts)
        .bind(job.scheduled_for)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn claim_next(&self, job_type: JobType) -> Result<Option<Job>, ServiceError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs
             SET status = 'processing',
                 attempts = attempts + 1,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE job_type = $1
                   AND status IN ('pending', 'retrying')
                   AND (scheduled_for IS NULL OR scheduled_for <= CURRENT_TIMESTAMP)
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_domain).transpose()
    }

    async fn mark_completed(&self, job_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE jobs
             SET status = 'completed', updated_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_retrying(
        &self,
        job_id: Uuid,
        error: &str,
        next_run: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE jobs
             SET status = 'retrying',
                 last_error = $2,
                 scheduled_for = $3,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(job_id)
        .bind(error)
        .bind(next_run)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE jobs
             SET status = 'failed',
                 last_error = $2,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cancel_pending(&self, job_id: Uuid, user_id: i64) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'cancelled', updated_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND user_id = $2 AND status = 'pending'",
        )
        .bind(job_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id_for_user(
        &self,
        job_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Job>, ServiceError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND user_id = $2"
        ))
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_domain).transpose()
    }
}
