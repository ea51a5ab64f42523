//! Worker池
//! 每种任务类型一个轮询循环，单类型在途任务数由信号量限制；
//! 领取靠数据库原子更新，同一个任务不会被两个Worker同时处理

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::{sync::Semaphore, task::JoinHandle, time::sleep};

use crate::{
    config::QueueConfig,
    domain::{Job, JobType},
    repository::JobRepository,
    service::{audit_service::AuditService, error::ServiceError},
};

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), ServiceError>;
}

pub struct WorkerPool {
    jobs: Arc<dyn JobRepository>,
    audit: Arc<AuditService>,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
    config: QueueConfig,
}

impl WorkerPool {
    pub fn new(jobs: Arc<dyn JobRepository>, audit: Arc<AuditService>, config: QueueConfig) -> Self {
        Self {
            jobs,
            audit,
            handlers: HashMap::new(),
            config,
        }
    }

    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type, handler);
    }

    /// 为每种注册过的任务类型启动一个轮询循环
    pub fn spawn_all(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.handlers
            .keys()
            .copied()
            .map(|job_type| {
                let pool = self.clone();
                tokio::spawn(async move { pool.run_loop(job_type).await })
            })
            .collect()
    }

    async fn run_loop(self: Arc<Self>, job_type: JobType) {
        tracing::info!(job_type = job_type.as_str(), "Worker loop started");
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs));
        let poll = std::time::Duration::from_millis(self.config.poll_interval_ms);

        loop {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };

            match self.jobs.claim_next(job_type).await {
                Ok(Some(job)) => {
                    let pool = self.clone();
                    tokio::spawn(async move {
                        pool.process(job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    sleep(poll).await;
                }
                Err(e) => {
                    drop(permit);
                    tracing::warn!(job_type = job_type.as_str(), error = %e, "Job claim failed");
                    sleep(poll).await;
                }
            }
        }
    }

    /// 领取并处理一个任务；没有可领取的返回 false
    pub async fn run_once(&self, job_type: JobType) -> Result<bool, ServiceError> {
        match self.jobs.claim_next(job_type).await? {
            Some(job) => {
                self.process(job).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn process(&self, job: Job) {
        // payload归属双重校验：存储损坏或编程错误导致的错配直接拒绝执行
        if !job.payload_matches_owner() {
            let payload_user = job.payload.get("user_id").and_then(|v| v.as_i64()).unwrap_or(0);
            self.audit
                .log_cross_user_access(job.user_id, payload_user, "job_payload", true)
                .await;
            if let Err(e) = self
                .jobs
                .mark_failed(job.id, "payload ownership mismatch")
                .await
            {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job failed");
            }
            return;
        }

        let Some(handler) = self.handlers.get(&job.job_type) else {
            tracing::error!(job_id = %job.id, job_type = job.job_type.as_str(), "No handler registered");
            let _ = self.jobs.mark_failed(job.id, "no handler registered").await;
            return;
        };

        match handler.handle(&job).await {
            Ok(()) => {
                if let Err(e) = self.jobs.mark_completed(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                }
            }
            Err(err) => self.handle_failure(&job, err).await,
        }
    }

    /// 失败记账：可重试错误且还有剩余次数 -> retrying + 递增延迟；
    /// 否则终态 failed 并审计
    async fn handle_failure(&self, job: &Job, err: ServiceError) {
        let retry_allowed = err.is_retryable() && job.attempts < job.max_attempts;

        if retry_allowed {
            let delay_secs = self.config.retry_base_delay_secs << (job.attempts - 1).max(0) as u32;
            let next_run = Utc::now() + ChronoDuration::seconds(delay_secs);
            tracing::warn!(
                job_id = %job.id,
                attempts = job.attempts,
                max_attempts = job.max_attempts,
                delay_secs,
                error = %err,
                "Job failed, scheduling retry"
            );
            if let Err(e) = self
                .jobs
                .mark_retrying(job.id, &err.to_string(), next_run)
                .await
            {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job retrying");
            }
        } else {
            tracing::error!(
                job_id = %job.id,
                attempts = job.attempts,
                error = %err,
                "Job failed terminally"
            );
            if let Err(e) = self.jobs.mark_failed(job.id, &err.to_string()).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job failed");
            }
            self.audit.log(
                job.user_id,
                "job_failed",
                "job",
                Some(job.id.to_string()),
                Some(serde_json::json!({
                    "job_type": job.job_type.as_str(),
                    "attempts": job.attempts,
                    "error": err.to_string(),
                })),
            );
        }
    }
}
