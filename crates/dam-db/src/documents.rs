//! Document repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use dam_core::{
    enrichment_payload, new_v7, ClaimOutcome, Document, DocumentRepository, DocumentStatus,
    EnrichmentResult, Error, JobType, NewDocument, Result, SimilarDocument, Vector,
};

use crate::escape_like;
use crate::jobs::insert_job;

const DOCUMENT_COLUMNS: &str = "id, title, storage_key, owner_id, status::text AS status, tags,
     extracted_text, confidence, embedding, created_at, version";

/// PostgreSQL implementation of DocumentRepository.
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
    /// Shared with the job repository so intake wakes idle workers.
    job_notify: Arc<Notify>,
}

impl PgDocumentRepository {
    pub fn new(pool: Pool<Postgres>, job_notify: Arc<Notify>) -> Self {
        Self { pool, job_notify }
    }

    fn parse_row(row: &PgRow) -> Result<Document> {
        let status: String = row.try_get("status")?;
        let tags: Option<Json<Vec<String>>> = row.try_get("tags")?;
        Ok(Document {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            storage_key: row.try_get("storage_key")?,
            owner_id: row.try_get("owner_id")?,
            status: status.parse().map_err(Error::Internal)?,
            tags: tags.map(|t| t.0),
            extracted_text: row.try_get("extracted_text")?,
            confidence: row.try_get("confidence")?,
            embedding: row.try_get("embedding")?,
            created_at: row.try_get("created_at")?,
            version: row.try_get("version")?,
        })
    }

    async fn current_status(&self, id: Uuid) -> Result<Option<DocumentStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status::text FROM document WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        status
            .map(|s| s.parse().map_err(Error::Internal))
            .transpose()
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn create(&self, req: NewDocument) -> Result<Document> {
        let id = new_v7();
        let now = Utc::now();
        let title = req.resolved_title();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "INSERT INTO document (id, title, storage_key, owner_id, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'pending'::document_status, $5, $5)
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(&title)
        .bind(&req.storage_key)
        .bind(req.owner_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let document = Self::parse_row(&row)?;

        let job_type = JobType::DocumentEnrichment;
        let job_id = insert_job(
            &mut tx,
            Some(id),
            job_type,
            job_type.default_priority(),
            Some(enrichment_payload(id)),
        )
        .await?;

        // Workers only see the job once the document row is committed.
        tx.commit().await.map_err(Error::Database)?;
        self.job_notify.notify_waiters();

        info!(
            subsystem = "db",
            component = "documents",
            op = "create",
            document_id = %id,
            owner_id = %req.owner_id,
            job_id = %job_id,
            "Document created and enrichment queued"
        );
        Ok(document)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn claim_for_processing(&self, id: Uuid) -> Result<ClaimOutcome> {
        let row = sqlx::query(&format!(
            "UPDATE document
             SET status = 'processing'::document_status, version = version + 1, updated_at = $2
             WHERE id = $1 AND status = 'pending'::document_status
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = row {
            return Ok(ClaimOutcome::Claimed(Self::parse_row(&row)?));
        }

        Ok(match self.current_status(id).await? {
            None => ClaimOutcome::NotFound,
            Some(status) => {
                debug!(document_id = %id, status = %status, "Claim refused");
                ClaimOutcome::AlreadyClaimed(status)
            }
        })
    }

    async fn save_result(
        &self,
        id: Uuid,
        expected_version: i64,
        result: &EnrichmentResult,
    ) -> Result<Document> {
        if !result.status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "cannot save non-terminal status {}",
                result.status
            )));
        }

        let row = sqlx::query(&format!(
            "UPDATE document
             SET status = $3::document_status, tags = $4, extracted_text = $5, embedding = $6,
                 version = version + 1, updated_at = $7
             WHERE id = $1 AND version = $2 AND status = 'processing'::document_status
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(expected_version)
        .bind(result.status.as_str())
        .bind(result.tags.clone().map(Json))
        .bind(result.extracted_text.as_deref())
        .bind(result.embedding.clone())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Self::parse_row(&row),
            None => match self.current_status(id).await? {
                None => Err(Error::DocumentNotFound(id)),
                Some(status) => Err(Error::RunConflict { id, status }),
            },
        }
    }

    async fn force_error(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE document
             SET status = 'error'::document_status, version = version + 1, updated_at = $2
             WHERE id = $1 AND status = 'processing'::document_status",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document
             WHERE owner_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn search(&self, query: &str, owner_id: Option<Uuid>) -> Result<Vec<Document>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document
             WHERE ($2::uuid IS NULL OR owner_id = $2)
               AND (extracted_text ILIKE $1 ESCAPE '\\'
                    OR EXISTS (
                        SELECT 1 FROM jsonb_array_elements_text(COALESCE(tags, '[]'::jsonb)) AS t(tag)
                        WHERE t.tag ILIKE $1 ESCAPE '\\'
                    ))
             ORDER BY created_at DESC"
        ))
        .bind(&pattern)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn find_similar(&self, query: &Vector, limit: i64) -> Result<Vec<SimilarDocument>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS}, (1 - (embedding <=> $1))::float8 AS score
             FROM document
             WHERE embedding IS NOT NULL
             ORDER BY embedding <=> $1
             LIMIT $2"
        ))
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(SimilarDocument {
                    document: Self::parse_row(row)?,
                    score: row.try_get("score")?,
                })
            })
            .collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM document WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
