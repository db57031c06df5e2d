//! Metadata Store
//!
//! Attachment privacy state, parent posts and sessions, behind the
//! [`MetadataStore`] trait. `PostgreSQL` backs production deployments;
//! [`MemoryStore`] serves tests and database-less setups.

mod memory;
mod models;
mod postgres;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

use crate::config::Config;
use crate::permissions::PermissionSet;

/// Errors raised by a metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Attachment record is missing.
    #[error("Attachment {0} not found")]
    AttachmentNotFound(AttachmentId),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value style access to attachment metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Find the attachment whose relative file path equals `file`.
    async fn find_by_file(&self, file: &str) -> StoreResult<Option<AttachmentId>>;

    /// Load an attachment record.
    async fn get_attachment(&self, id: AttachmentId) -> StoreResult<Option<Attachment>>;

    /// Load a post record.
    async fn get_post(&self, id: PostId) -> StoreResult<Option<Post>>;

    /// Write the private flag and permission set of an attachment in one step.
    ///
    /// `None` removes the stored permission set.
    async fn set_privacy(
        &self,
        id: AttachmentId,
        is_private: bool,
        permissions: Option<&PermissionSet>,
    ) -> StoreResult<()>;

    /// IDs of all attachments whose private flag equals `is_private`.
    async fn ids_by_privacy(&self, is_private: bool) -> StoreResult<Vec<AttachmentId>>;

    /// Resolve a session token to the signed-in viewer.
    async fn find_session(&self, token: &str) -> StoreResult<Option<Viewer>>;
}

/// Create `PostgreSQL` connection pool with health configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(10)
        // Prevent hanging requests on pool exhaustion
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed");
    Ok(())
}

/// Open the configured metadata store: `PostgreSQL` when `DATABASE_URL` is
/// set (migrations applied), in-memory otherwise.
pub async fn open_store(config: &Config) -> Result<Arc<dyn MetadataStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory metadata store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
