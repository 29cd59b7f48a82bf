//! Job queue repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use dam_core::{new_v7, Error, Job, JobRepository, JobType, Result};

const JOB_COLUMNS: &str = "id, document_id, job_type::text AS job_type, status::text AS status,
     priority, payload, result, error_message, retry_count, max_retries,
     created_at, started_at, completed_at";

/// Insert a pending job inside an open transaction.
pub(crate) async fn insert_job(
    tx: &mut Transaction<'_, Postgres>,
    document_id: Option<Uuid>,
    job_type: JobType,
    priority: i32,
    payload: Option<JsonValue>,
) -> Result<Uuid> {
    let job_id = new_v7();
    sqlx::query(
        "INSERT INTO job_queue (id, document_id, job_type, status, priority, payload, max_retries, created_at)
         VALUES ($1, $2, $3::job_type, 'pending'::job_status, $4, $5, $6, $7)",
    )
    .bind(job_id)
    .bind(document_id)
    .bind(job_type.as_str())
    .bind(priority)
    .bind(&payload)
    .bind(dam_core::defaults::JOB_MAX_RETRIES)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;
    Ok(job_id)
}

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Wakes idle workers when a job is queued.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Handle notified whenever a job becomes claimable.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn parse_row(row: &PgRow) -> Result<Job> {
        let job_type: String = row.try_get("job_type")?;
        let status: String = row.try_get("status")?;
        Ok(Job {
            id: row.try_get("id")?,
            document_id: row.try_get("document_id")?,
            job_type: job_type.parse().map_err(Error::Job)?,
            status: status.parse().map_err(Error::Job)?,
            priority: row.try_get("priority")?,
            payload: row.try_get("payload")?,
            result: row.try_get("result")?,
            error_message: row.try_get("error_message")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        document_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let job_id = insert_job(&mut tx, document_id, job_type, priority, payload).await?;
        tx.commit().await.map_err(Error::Database)?;

        self.notify.notify_waiters();
        Ok(job_id)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let type_strings: Vec<String> = job_types
            .iter()
            .map(|jt| jt.as_str().to_string())
            .collect();

        // Empty array claims any type.
        let row = sqlx::query(&format!(
            "UPDATE job_queue
             SET status = 'running'::job_status, started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'::job_status
                   AND (cardinality($2::text[]) = 0 OR job_type::text = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(&type_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'completed'::job_status, completed_at = $1, result = $2
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(&result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str, retryable: bool) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) = sqlx::query_as(
            "SELECT retry_count, max_retries FROM job_queue WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let requeue = retryable && retry_count < max_retries;
        if requeue {
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending'::job_status, retry_count = $1, error_message = $2,
                     started_at = NULL
                 WHERE id = $3",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
            debug!(job_id = %job_id, retry_count = retry_count + 1, "Job requeued for retry");
        } else {
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'failed'::job_status, completed_at = $1, error_message = $2
                 WHERE id = $3",
            )
            .bind(Utc::now())
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        if requeue {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_queue WHERE status = 'pending'::job_status",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }
}
