//! Attachment Manager
//!
//! Owns the private/public state of attachments and moves their files
//! between the public uploads root and the private root.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::storage::{LocalStorage, StorageError};
use crate::config::Config;
use crate::db::{Attachment, AttachmentId, MetadataStore, StoreError};
use crate::hooks::HookChain;
use crate::permissions::PermissionSet;

/// File name of the access-denial marker in the private root.
pub const ACCESS_MARKER: &str = ".htaccess";

const ACCESS_MARKER_TEMPLATE: &str = "\
# Private Media: files below this directory are served through [SITE_URL]/[PREFIX]/
<IfModule mod_rewrite.c>
RewriteEngine On
RewriteRule ^(.*)$ [SITE_URL]/[PREFIX]/$1 [QSA,L]
</IfModule>
<IfModule !mod_rewrite.c>
Require all denied
</IfModule>
";

/// Attachment management errors.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Attachment {0} not found")]
    NotFound(AttachmentId),
}

/// Outcome of a bulk policy run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyReport {
    /// Attachments processed without error.
    pub attachments: usize,
    /// Files actually moved.
    pub moved: usize,
    /// Attachments whose files could not be moved (left where they were).
    pub failed: Vec<AttachmentId>,
}

/// Public or private URLs of an attachment and its size variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentUrls {
    pub id: AttachmentId,
    pub is_private: bool,
    pub url: String,
    pub sizes: Vec<String>,
}

/// Manages private and public attachments.
pub struct AttachmentManager {
    store: Arc<dyn MetadataStore>,
    hooks: Arc<HookChain>,
    public: LocalStorage,
    private: LocalStorage,
    site_url: String,
    private_prefix: String,
    public_url: String,
    private_url: String,
    locks: DashMap<AttachmentId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for AttachmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentManager")
            .field("public", &self.public)
            .field("private", &self.private)
            .finish_non_exhaustive()
    }
}

impl AttachmentManager {
    pub fn new(config: &Config, store: Arc<dyn MetadataStore>, hooks: Arc<HookChain>) -> Self {
        let private_url = hooks.private_url(config.private_upload_url());
        Self {
            store,
            public: LocalStorage::new(&config.public_dir),
            private: LocalStorage::new(&config.private_dir),
            site_url: config.site_url.clone(),
            private_prefix: config.private_prefix.clone(),
            public_url: config.public_upload_url(),
            private_url,
            hooks,
            locks: DashMap::new(),
        }
    }

    /// Storage root holding an attachment with the given private flag.
    #[must_use]
    pub const fn storage(&self, is_private: bool) -> &LocalStorage {
        if is_private {
            &self.private
        } else {
            &self.public
        }
    }

    /// Whether the attachment's files live under the private root.
    ///
    /// Unknown attachments are public.
    pub async fn is_private(&self, id: AttachmentId) -> Result<bool, MediaError> {
        Ok(self
            .store
            .get_attachment(id)
            .await?
            .is_some_and(|a| a.is_private))
    }

    /// Raw stored permission set, `None` for public attachments.
    pub async fn get_permissions(
        &self,
        id: AttachmentId,
    ) -> Result<Option<PermissionSet>, MediaError> {
        Ok(self
            .store
            .get_attachment(id)
            .await?
            .and_then(|a| a.permissions))
    }

    /// Store a new permission set, relocating the files when the attachment
    /// flips between public and private.
    ///
    /// Relocation is all-or-nothing: when any file fails to move, files moved
    /// so far go back and the stored state is left untouched. Returns whether
    /// files changed location.
    #[tracing::instrument(skip(self, permissions))]
    pub async fn set_permissions(
        &self,
        id: AttachmentId,
        permissions: PermissionSet,
    ) -> Result<bool, MediaError> {
        self.require(id).await?;

        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.store_permissions(id, permissions).await
        };
        drop(lock);
        self.release(id);
        result
    }

    async fn store_permissions(
        &self,
        id: AttachmentId,
        permissions: PermissionSet,
    ) -> Result<bool, MediaError> {
        let attachment = self.require(id).await?;

        let private = permissions.implies_private();
        let relocate = attachment.is_private != private;
        let moved = if relocate {
            self.relocate(&attachment, private).await?
        } else {
            Vec::new()
        };

        let stored = private.then_some(&permissions);
        if let Err(e) = self.store.set_privacy(id, private, stored).await {
            error!(attachment_id = id, error = %e, "Failed to store privacy state, moving files back");
            self.rollback(&moved, private).await;
            return Err(e.into());
        }

        if relocate {
            info!(
                attachment_id = id,
                private,
                files = moved.len(),
                "Attachment relocated"
            );
        }
        Ok(relocate)
    }

    /// Move every attachment flagged private into the private root
    /// (`make_private`) or back to the public root, keeping the flag.
    ///
    /// Files already in place are skipped, so an interrupted run converges
    /// when repeated. Failures are logged and reported, never fatal.
    #[tracing::instrument(skip(self))]
    pub async fn apply_policy(&self, make_private: bool) -> Result<PolicyReport, MediaError> {
        let ids = self.store.ids_by_privacy(true).await?;
        let mut report = PolicyReport::default();

        for id in ids {
            let lock = self.lock_for(id);
            {
                let _guard = lock.lock().await;
                self.apply_one(id, make_private, &mut report).await;
            }
            drop(lock);
            self.release(id);
        }

        info!(
            make_private,
            attachments = report.attachments,
            moved = report.moved,
            failed = report.failed.len(),
            "Privacy policy applied"
        );
        Ok(report)
    }

    async fn apply_one(&self, id: AttachmentId, make_private: bool, report: &mut PolicyReport) {
        let attachment = match self.store.get_attachment(id).await {
            Ok(Some(a)) => a,
            Ok(None) => return,
            Err(e) => {
                error!(attachment_id = id, error = %e, "Failed to load attachment");
                report.failed.push(id);
                return;
            }
        };

        match self.relocate(&attachment, make_private).await {
            Ok(moved) => {
                report.attachments += 1;
                report.moved += moved.len();
            }
            Err(e) => {
                error!(attachment_id = id, error = %e, "Failed to apply privacy policy");
                report.failed.push(id);
            }
        }
    }

    /// Delete the private copies of an attachment's files.
    ///
    /// Public attachments are left to the host; returns the number of files removed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_attachment_files(&self, id: AttachmentId) -> Result<usize, MediaError> {
        self.require(id).await?;

        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.remove_private_files(id).await
        };
        drop(lock);
        self.release(id);
        result
    }

    async fn remove_private_files(&self, id: AttachmentId) -> Result<usize, MediaError> {
        let attachment = self.require(id).await?;
        if !attachment.is_private {
            return Ok(0);
        }

        let mut removed = 0;
        for file in attachment.relative_files() {
            match self.private.remove(&file).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(attachment_id = id, file = %file, error = %e, "Failed to delete private file"),
            }
        }
        Ok(removed)
    }

    /// Create the private root and its access-denial marker if missing.
    ///
    /// Nothing works without the private root, so callers treat an error as fatal.
    pub async fn maybe_setup_directories(&self) -> Result<(), MediaError> {
        if !self.private.root_exists().await {
            self.private.create_root().await?;
            info!(path = %self.private.root().display(), "Created private uploads directory");
        }

        if !self.private.exists(ACCESS_MARKER).await? {
            let rules = ACCESS_MARKER_TEMPLATE
                .replace("[SITE_URL]", &self.site_url)
                .replace("[PREFIX]", &self.private_prefix);
            let rules = self.hooks.access_marker(rules);
            self.private.write(ACCESS_MARKER, rules.as_bytes()).await?;
            debug!("Wrote access marker");
        }
        Ok(())
    }

    /// URLs of an attachment and its size variants, pointing at the private
    /// endpoint for private attachments.
    pub async fn attachment_url(&self, id: AttachmentId) -> Result<AttachmentUrls, MediaError> {
        let attachment = self.require(id).await?;

        let mut files = attachment.relative_files().into_iter();
        let base = if attachment.is_private {
            &self.private_url
        } else {
            &self.public_url
        };
        let url = files.next().map(|f| format!("{base}{f}")).unwrap_or_default();
        let sizes = files.map(|f| format!("{base}{f}")).collect();

        Ok(AttachmentUrls {
            id,
            is_private: attachment.is_private,
            url,
            sizes,
        })
    }

    /// Point every srcset candidate at the private endpoint when the main
    /// image source already does.
    #[must_use]
    pub fn rewrite_srcset(&self, image_src: &str, sources: Vec<String>) -> Vec<String> {
        if !image_src.contains(&self.private_url) {
            return sources;
        }
        sources
            .into_iter()
            .map(|s| s.replace(&self.public_url, &self.private_url))
            .collect()
    }

    async fn require(&self, id: AttachmentId) -> Result<Attachment, MediaError> {
        self.store
            .get_attachment(id)
            .await?
            .ok_or(MediaError::NotFound(id))
    }

    fn lock_for(&self, id: AttachmentId) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    /// Drop the lock entry of `id` once no task holds or waits on it.
    fn release(&self, id: AttachmentId) {
        self.locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Move all files of `attachment` into the private or public root.
    ///
    /// Missing files are skipped. On the first failure every file moved by
    /// this call goes back and the error is returned.
    async fn relocate(
        &self,
        attachment: &Attachment,
        to_private: bool,
    ) -> Result<Vec<String>, MediaError> {
        let (from, to) = if to_private {
            (&self.public, &self.private)
        } else {
            (&self.private, &self.public)
        };

        let mut moved = Vec::new();
        for file in attachment.relative_files() {
            match from.move_to(&file, to).await {
                Ok(true) => moved.push(file),
                Ok(false) => debug!(attachment_id = attachment.id, file = %file, "Nothing to move"),
                Err(e) => {
                    error!(attachment_id = attachment.id, file = %file, error = %e, "Failed to move file");
                    self.rollback(&moved, to_private).await;
                    return Err(e.into());
                }
            }
        }
        Ok(moved)
    }

    /// Undo a relocation into the private (`to_private`) or public root.
    async fn rollback(&self, moved: &[String], to_private: bool) {
        let (from, to) = if to_private {
            (&self.private, &self.public)
        } else {
            (&self.public, &self.private)
        };
        for file in moved.iter().rev() {
            if let Err(e) = from.move_to(file, to).await {
                error!(file = %file, error = %e, "Failed to move file back, manual cleanup needed");
            }
        }
    }
}
