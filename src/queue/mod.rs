//! 持久化任务队列
//! 钱包创建、充值确认、余额刷新这类依赖外部系统的慢工作都走这里

pub mod handlers;
pub mod worker;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    domain::{Job, JobStatus, JobType},
    repository::{jobs::NewJob, JobRepository},
    service::{audit_service::AuditService, error::ServiceError},
};

pub use worker::{JobHandler, WorkerPool};

/// 取消结果
#[derive(Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// 已在执行或已终结，跑完为止
    NotCancellable,
    NotFound,
}

pub struct JobQueue {
    jobs: Arc<dyn JobRepository>,
    audit: Arc<AuditService>,
    default_max_attempts: i32,
}

impl JobQueue {
    pub fn new(jobs: Arc<dyn JobRepository>, audit: Arc<AuditService>, max_attempts: i32) -> Self {
        Self {
            jobs,
            audit,
            default_max_attempts: max_attempts,
        }
    }

    /// 入队一个用户作用域任务
    ///
    /// payload 统一盖上 user_scoped / user_id 戳；
    /// Worker执行前会复核这两个字段与任务归属一致
    pub async fn add_job(
        &self,
        user_id: i64,
        job_type: JobType,
        payload: serde_json::Value,
        priority: i32,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<Job, ServiceError> {
        let mut payload = match payload {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            _ => {
                return Err(ServiceError::validation(
                    "job payload must be a JSON object",
                ))
            }
        };
        payload.insert("user_scoped".into(), serde_json::Value::Bool(true));
        payload.insert("user_id".into(), serde_json::Value::from(user_id));

        let job = self
            .jobs
            .insert(NewJob {
                user_id,
                job_type,
                payload: serde_json::Value::Object(payload),
                priority,
                max_attempts: self.default_max_attempts,
                scheduled_for,
            })
            .await?;

        self.audit.log(
            user_id,
            "job_enqueued",
            "job",
            Some(job.id.to_string()),
            Some(serde_json::json!({ "job_type": job_type.as_str(), "priority": priority })),
        );

        Ok(job)
    }

    /// 取消任务：只允许本人取消自己的 pending 任务
    pub async fn cancel(&self, caller_id: i64, job_id: Uuid) -> Result<CancelOutcome, ServiceError> {
        if self.jobs.cancel_pending(job_id, caller_id).await? {
            self.audit
                .log(caller_id, "job_cancelled", "job", Some(job_id.to_string()), None);
            return Ok(CancelOutcome::Cancelled);
        }

        // 区分"不存在/不是你的"与"已在执行"
        match self.jobs.find_by_id_for_user(job_id, caller_id).await? {
            Some(job) if job.status != JobStatus::Pending => Ok(CancelOutcome::NotCancellable),
            Some(_) => Ok(CancelOutcome::NotCancellable),
            None => Ok(CancelOutcome::NotFound),
        }
    }

    /// 查询自己的任务
    pub async fn get_job(&self, caller_id: i64, job_id: Uuid) -> Result<Option<Job>, ServiceError> {
        self.jobs.find_by_id_for_user(job_id, caller_id).await
    }
}
