//! Database Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::permissions::PermissionSet;

/// Attachment identifier, shared with the host CMS.
pub type AttachmentId = i64;

/// Post identifier, shared with the host CMS.
pub type PostId = i64;

/// A media-library item with one physical file and optional size variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    /// Path relative to the uploads root, e.g. `2024/05/photo.jpg`.
    pub file: String,
    /// File names of generated size variants, in the same directory as `file`.
    pub sizes: Vec<String>,
    pub mime_type: String,
    /// Post the attachment was uploaded to.
    pub parent: Option<PostId>,
    /// Whether the files live under the private root.
    pub is_private: bool,
    pub permissions: Option<PermissionSet>,
}

impl Attachment {
    /// Directory part of `file`, without trailing slash (empty at the root).
    #[must_use]
    pub fn directory(&self) -> &str {
        self.file.rsplit_once('/').map_or("", |(dir, _)| dir)
    }

    /// Relative paths of the main file followed by every size variant.
    #[must_use]
    pub fn relative_files(&self) -> Vec<String> {
        let dir = self.directory();
        let mut files = Vec::with_capacity(self.sizes.len() + 1);
        files.push(self.file.clone());
        for size in &self.sizes {
            if dir.is_empty() {
                files.push(size.clone());
            } else {
                files.push(format!("{dir}/{size}"));
            }
        }
        files
    }
}

/// Row shape of the `attachments` table.
#[derive(Debug, Clone, FromRow)]
pub struct AttachmentRow {
    pub id: i64,
    pub file: String,
    pub sizes: Json<Vec<String>>,
    pub mime_type: String,
    pub parent_id: Option<i64>,
    pub is_private: bool,
    pub permissions: Option<Json<PermissionSet>>,
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: row.id,
            file: row.file,
            sizes: row.sizes.0,
            mime_type: row.mime_type,
            parent: row.parent_id,
            is_private: row.is_private,
            permissions: row.permissions.map(|p| p.0),
        }
    }
}

/// A post that attachments can belong to.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    /// Password gating the post content, if any.
    pub password: Option<String>,
}

impl Post {
    /// Whether the post is gated behind a password.
    #[must_use]
    pub fn requires_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// The signed-in requester behind a session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: i64,
    pub roles: Vec<String>,
}

impl Viewer {
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Row shape of the `sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub user_id: i64,
    pub roles: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionRow> for Viewer {
    fn from(row: SessionRow) -> Self {
        Self {
            user_id: row.user_id,
            roles: row.roles,
        }
    }
}
