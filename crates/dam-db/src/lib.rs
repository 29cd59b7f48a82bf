//! # dam-db
//!
//! Persistence layer for retail-dam.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL + pgvector repositories for documents and the job queue
//! - Local filesystem object storage with signed download URLs
//! - In-memory repositories for tests and database-less runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use dam_db::{Database, DocumentRepository, NewDocument};
//!
//! let db = Database::connect("postgres://localhost/retail_dam").await?;
//! let doc = db.documents.create(NewDocument {
//!     title: None,
//!     filename: "label.png".into(),
//!     storage_key: key,
//!     owner_id,
//! }).await?;
//! ```

pub mod documents;
pub mod jobs;
pub mod memory;
pub mod pool;
pub mod storage;

pub use dam_core::*;

pub use documents::PgDocumentRepository;
pub use jobs::PgJobRepository;
pub use memory::{InMemoryDocumentRepository, InMemoryJobRepository, InMemoryObjectStorage};
pub use pool::{create_pool, log_pool_metrics, PoolConfig};
pub use storage::{LocalObjectStorage, StorageConfig};

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// PostgreSQL repositories sharing one pool.
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub documents: PgDocumentRepository,
    pub jobs: PgJobRepository,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        let jobs = PgJobRepository::new(pool.clone());
        Self {
            documents: PgDocumentRepository::new(pool.clone(), jobs.job_notify()),
            jobs,
            pool,
        }
    }

    /// Connect with [`PoolConfig::from_env`].
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url, PoolConfig::from_env()).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
