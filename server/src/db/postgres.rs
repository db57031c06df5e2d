//! `PostgreSQL` metadata store.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use super::{
    Attachment, AttachmentId, AttachmentRow, MetadataStore, Post, PostId, SessionRow, StoreError,
    StoreResult, Viewer,
};
use crate::permissions::PermissionSet;

/// Metadata store backed by the `attachments`, `posts` and `sessions` tables.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PgStore {
    async fn find_by_file(&self, file: &str) -> StoreResult<Option<AttachmentId>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM attachments WHERE file = $1")
            .bind(file)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn get_attachment(&self, id: AttachmentId) -> StoreResult<Option<Attachment>> {
        let row: Option<AttachmentRow> = sqlx::query_as(
            r"SELECT id, file, sizes, mime_type, parent_id, is_private, permissions
              FROM attachments
              WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Attachment::from))
    }

    async fn get_post(&self, id: PostId) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>("SELECT id, password FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn set_privacy(
        &self,
        id: AttachmentId,
        is_private: bool,
        permissions: Option<&PermissionSet>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE attachments SET is_private = $2, permissions = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(is_private)
        .bind(permissions.map(Json))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AttachmentNotFound(id));
        }
        Ok(())
    }

    async fn ids_by_privacy(&self, is_private: bool) -> StoreResult<Vec<AttachmentId>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM attachments WHERE is_private = $1 ORDER BY id")
                .bind(is_private)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn find_session(&self, token: &str) -> StoreResult<Option<Viewer>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r"SELECT user_id, roles, expires_at
              FROM sessions
              WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Viewer::from))
    }
}
