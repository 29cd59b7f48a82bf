//! In-memory repositories for tests and database-less local runs.
//!
//! They honour the same guards as the PostgreSQL implementations (claim only
//! from pending, versioned saves, force-error only while processing) and
//! additionally record every status a document passes through.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use uuid::Uuid;

use dam_core::{
    enrichment_payload, new_v7, ClaimOutcome, Document, DocumentRepository, DocumentStatus,
    EnrichmentResult, Error, Job, JobRepository, JobStatus, JobType, NewDocument, ObjectStorage,
    Result, SimilarDocument, Vector,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// JOBS
// =============================================================================

/// Job queue kept in a vector, claimed in priority then FIFO order.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<Vec<Job>>,
    notify: Arc<Notify>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Snapshot of every job.
    pub fn all(&self) -> Vec<Job> {
        lock(&self.jobs).clone()
    }

    fn push(&self, job: Job) -> Uuid {
        let id = job.id;
        lock(&self.jobs).push(job);
        self.notify.notify_waiters();
        id
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn queue(
        &self,
        document_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let mut job = Job::pending(document_id, job_type, payload);
        job.priority = priority;
        Ok(self.push(job))
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let mut jobs = lock(&self.jobs);
        let next = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .filter(|j| job_types.is_empty() || job_types.contains(&j.job_type))
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
            });
        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.clone()
        }))
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
        job.status = JobStatus::Completed;
        job.result = result;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str, retryable: bool) -> Result<()> {
        let requeued = {
            let mut jobs = lock(&self.jobs);
            let job = jobs
                .iter_mut()
                .find(|j| j.id == job_id)
                .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
            job.error_message = Some(error.to_string());
            if retryable && job.retry_count < job.max_retries {
                job.retry_count += 1;
                job.status = JobStatus::Pending;
                job.started_at = None;
                true
            } else {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                false
            }
        };
        if requeued {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(lock(&self.jobs).iter().find(|j| j.id == job_id).cloned())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(lock(&self.jobs)
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Document store that shares its job queue with an [`InMemoryJobRepository`].
pub struct InMemoryDocumentRepository {
    docs: Mutex<HashMap<Uuid, Document>>,
    history: Mutex<HashMap<Uuid, Vec<DocumentStatus>>>,
    jobs: Arc<InMemoryJobRepository>,
    fail_saves: AtomicBool,
}

impl InMemoryDocumentRepository {
    pub fn new(jobs: Arc<InMemoryJobRepository>) -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            jobs,
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Insert a document as-is, without queueing a job.
    pub fn insert(&self, doc: Document) {
        lock(&self.history).insert(doc.id, vec![doc.status]);
        lock(&self.docs).insert(doc.id, doc);
    }

    /// Make every subsequent `save_result` fail with an internal error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Every status the document has been in, oldest first.
    pub fn status_history(&self, id: Uuid) -> Vec<DocumentStatus> {
        lock(&self.history).get(&id).cloned().unwrap_or_default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        lock(&self.docs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, id: Uuid, status: DocumentStatus) {
        lock(&self.history).entry(id).or_default().push(status);
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn create(&self, req: NewDocument) -> Result<Document> {
        let doc = Document {
            id: new_v7(),
            title: req.resolved_title(),
            storage_key: req.storage_key,
            owner_id: req.owner_id,
            status: DocumentStatus::Pending,
            tags: None,
            extracted_text: None,
            confidence: None,
            embedding: None,
            created_at: Utc::now(),
            version: 0,
        };
        self.insert(doc.clone());
        self.jobs.push(Job::pending(
            Some(doc.id),
            JobType::DocumentEnrichment,
            Some(enrichment_payload(doc.id)),
        ));
        Ok(doc)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(lock(&self.docs).get(&id).cloned())
    }

    async fn claim_for_processing(&self, id: Uuid) -> Result<ClaimOutcome> {
        let claimed = {
            let mut docs = lock(&self.docs);
            match docs.get_mut(&id) {
                None => return Ok(ClaimOutcome::NotFound),
                Some(doc) if doc.status != DocumentStatus::Pending => {
                    return Ok(ClaimOutcome::AlreadyClaimed(doc.status))
                }
                Some(doc) => {
                    doc.status = DocumentStatus::Processing;
                    doc.version += 1;
                    doc.clone()
                }
            }
        };
        self.record(id, DocumentStatus::Processing);
        Ok(ClaimOutcome::Claimed(claimed))
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
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected save failure".into()));
        }
        let saved = {
            let mut docs = lock(&self.docs);
            let doc = docs.get_mut(&id).ok_or(Error::DocumentNotFound(id))?;
            if doc.status != DocumentStatus::Processing || doc.version != expected_version {
                return Err(Error::RunConflict {
                    id,
                    status: doc.status,
                });
            }
            doc.status = result.status;
            doc.tags = result.tags.clone();
            doc.extracted_text = result.extracted_text.clone();
            doc.embedding = result.embedding.clone();
            doc.version += 1;
            doc.clone()
        };
        self.record(id, saved.status);
        Ok(saved)
    }

    async fn force_error(&self, id: Uuid) -> Result<bool> {
        let updated = {
            let mut docs = lock(&self.docs);
            match docs.get_mut(&id) {
                Some(doc) if doc.status == DocumentStatus::Processing => {
                    doc.status = DocumentStatus::Error;
                    doc.version += 1;
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.record(id, DocumentStatus::Error);
        }
        Ok(updated)
    }

    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = lock(&self.docs)
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(docs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn search(&self, query: &str, owner_id: Option<Uuid>) -> Result<Vec<Document>> {
        let needle = query.trim().to_lowercase();
        let mut docs: Vec<Document> = lock(&self.docs)
            .values()
            .filter(|d| owner_id.map_or(true, |o| d.owner_id == o))
            .filter(|d| {
                let in_text = d
                    .extracted_text
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle));
                let in_tags = d
                    .tags
                    .iter()
                    .flatten()
                    .any(|t| t.to_lowercase().contains(&needle));
                in_text || in_tags
            })
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    async fn find_similar(&self, query: &Vector, limit: i64) -> Result<Vec<SimilarDocument>> {
        let q = query.as_slice();
        let mut hits: Vec<SimilarDocument> = lock(&self.docs)
            .values()
            .filter_map(|d| {
                let score = cosine(q, d.embedding.as_ref()?.as_slice());
                Some(SimilarDocument {
                    document: d.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(lock(&self.docs).remove(&id).is_some())
    }
}

// =============================================================================
// OBJECTS
// =============================================================================

/// Object store held in a map. Presigned URLs use the `memory://` scheme and
/// are not verifiable.
#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object, builder style.
    pub fn with_object(self, key: &str, data: impl Into<Vec<u8>>) -> Self {
        lock(&self.objects).insert(key.to_string(), data.into());
        self
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("object not found: {key}")))
    }

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        lock(&self.objects).insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        lock(&self.objects).remove(key);
        Ok(())
    }

    fn presigned_download_url(&self, key: &str, ttl_secs: u64) -> Result<String> {
        let expires = Utc::now().timestamp() + ttl_secs as i64;
        Ok(format!("memory://{key}?expires={expires}"))
    }
}
