//! In-memory metadata store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Attachment, AttachmentId, MetadataStore, Post, PostId, StoreError, StoreResult, Viewer};
use crate::permissions::PermissionSet;

/// Metadata store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    attachments: DashMap<AttachmentId, Attachment>,
    posts: DashMap<PostId, Post>,
    sessions: DashMap<String, Viewer>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an attachment record.
    pub fn insert_attachment(&self, attachment: Attachment) {
        self.attachments.insert(attachment.id, attachment);
    }

    /// Insert or replace a post record.
    pub fn insert_post(&self, post: Post) {
        self.posts.insert(post.id, post);
    }

    /// Register a session token for a viewer.
    pub fn insert_session(&self, token: impl Into<String>, viewer: Viewer) {
        self.sessions.insert(token.into(), viewer);
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn find_by_file(&self, file: &str) -> StoreResult<Option<AttachmentId>> {
        Ok(self
            .attachments
            .iter()
            .find(|entry| entry.file == file)
            .map(|entry| *entry.key()))
    }

    async fn get_attachment(&self, id: AttachmentId) -> StoreResult<Option<Attachment>> {
        Ok(self.attachments.get(&id).map(|a| a.clone()))
    }

    async fn get_post(&self, id: PostId) -> StoreResult<Option<Post>> {
        Ok(self.posts.get(&id).map(|p| p.clone()))
    }

    async fn set_privacy(
        &self,
        id: AttachmentId,
        is_private: bool,
        permissions: Option<&PermissionSet>,
    ) -> StoreResult<()> {
        let mut attachment = self
            .attachments
            .get_mut(&id)
            .ok_or(StoreError::AttachmentNotFound(id))?;
        attachment.is_private = is_private;
        attachment.permissions = permissions.cloned();
        Ok(())
    }

    async fn ids_by_privacy(&self, is_private: bool) -> StoreResult<Vec<AttachmentId>> {
        let mut ids: Vec<_> = self
            .attachments
            .iter()
            .filter(|entry| entry.is_private == is_private)
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn find_session(&self, token: &str) -> StoreResult<Option<Viewer>> {
        Ok(self.sessions.get(token).map(|v| v.clone()))
    }
}
