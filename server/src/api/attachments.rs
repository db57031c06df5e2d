//! Attachment privacy API
//!
//! Admin endpoints exposing "is private", "get permissions" and "set
//! permissions" to other services, plus file cleanup and URL lookup.

use std::collections::{BTreeMap, BTreeSet};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::AppState;
use crate::auth::AdminUser;
use crate::db::AttachmentId;
use crate::media::{AttachmentUrls, MediaError};
use crate::permissions::{FlagValue, PermissionSet};

/// Attachment API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Attachment does not exist.
    #[error("Attachment {0} not found")]
    NotFound(AttachmentId),

    /// Files could not be moved or removed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Metadata store failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotFound(id) => Self::NotFound(id),
            MediaError::Storage(e) => Self::Storage(e.to_string()),
            MediaError::Store(e) => Self::Store(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "ATTACHMENT_NOT_FOUND",
                self.to_string(),
            ),
            Self::Storage(e) => {
                tracing::error!(error = %e, "Attachment storage operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "Storage operation failed".to_string(),
                )
            }
            Self::Store(e) => {
                tracing::error!(error = %e, "Attachment store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database operation failed".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Permission set as submitted by editors.
///
/// Either the typed form (`{"roles": [...], "always_private": true}`) or
/// the flat flag form (`{"editor": 1, "disable_hotlinks": 1}`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PermissionsRequest {
    Typed {
        roles: BTreeSet<String>,
        #[serde(default)]
        always_private: bool,
        #[serde(default)]
        disable_hotlinks: bool,
    },
    Flags(BTreeMap<String, FlagValue>),
}

impl From<PermissionsRequest> for PermissionSet {
    fn from(req: PermissionsRequest) -> Self {
        match req {
            PermissionsRequest::Typed {
                roles,
                always_private,
                disable_hotlinks,
            } => Self {
                roles,
                always_private,
                disable_hotlinks,
            },
            PermissionsRequest::Flags(flags) => Self::from_flags(&flags),
        }
    }
}

/// Privacy state of an attachment.
#[derive(Debug, Serialize, Deserialize)]
pub struct PrivacyResponse {
    pub id: AttachmentId,
    pub is_private: bool,
    pub permissions: Option<PermissionSet>,
}

/// Result of a permission update.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetPermissionsResponse {
    pub id: AttachmentId,
    pub is_private: bool,
    /// Whether the files changed location.
    pub relocated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteFilesResponse {
    pub id: AttachmentId,
    pub removed: usize,
}

/// GET /api/attachments/{id}/privacy
pub async fn get_privacy(
    State(state): State<AppState>,
    Path(id): Path<AttachmentId>,
) -> Result<Json<PrivacyResponse>, ApiError> {
    let is_private = state.media.is_private(id).await?;
    let permissions = state.media.get_permissions(id).await?;
    Ok(Json(PrivacyResponse {
        id,
        is_private,
        permissions,
    }))
}

/// PUT /api/attachments/{id}/permissions
#[tracing::instrument(skip(state, admin, body), fields(admin_id = admin.0.user_id))]
pub async fn set_permissions(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<AttachmentId>,
    Json(body): Json<PermissionsRequest>,
) -> Result<Json<SetPermissionsResponse>, ApiError> {
    let permissions = PermissionSet::from(body);
    let is_private = permissions.implies_private();
    let relocated = state.media.set_permissions(id, permissions).await?;

    info!(attachment_id = id, is_private, relocated, "Attachment permissions updated");

    Ok(Json(SetPermissionsResponse {
        id,
        is_private,
        relocated,
    }))
}

/// DELETE /api/attachments/{id}/files
#[tracing::instrument(skip(state, admin), fields(admin_id = admin.0.user_id))]
pub async fn delete_files(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<AttachmentId>,
) -> Result<Json<DeleteFilesResponse>, ApiError> {
    let removed = state.media.delete_attachment_files(id).await?;
    Ok(Json(DeleteFilesResponse { id, removed }))
}

/// Query of the URL lookup.
#[derive(Debug, Default, Deserialize)]
pub struct UrlQuery {
    /// Comma-separated srcset candidate URLs to rewrite for the attachment.
    pub srcset: Option<String>,
}

/// Attachment URLs, plus the rewritten srcset candidates when requested.
#[derive(Debug, Serialize)]
pub struct UrlResponse {
    #[serde(flatten)]
    pub urls: AttachmentUrls,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srcset: Option<Vec<String>>,
}

/// GET /api/attachments/{id}/url
pub async fn get_url(
    State(state): State<AppState>,
    Path(id): Path<AttachmentId>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<UrlResponse>, ApiError> {
    let urls = state.media.attachment_url(id).await?;
    let srcset = query.srcset.map(|raw| {
        let sources = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        state.media.rewrite_srcset(&urls.url, sources)
    });
    Ok(Json(UrlResponse { urls, srcset }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_permissions_body() {
        let req: PermissionsRequest =
            serde_json::from_str(r#"{"roles":["editor"],"disable_hotlinks":true}"#).unwrap();
        let set = PermissionSet::from(req);
        assert!(set.roles.contains("editor"));
        assert!(set.disable_hotlinks);
        assert!(!set.always_private);
    }

    #[test]
    fn test_flag_permissions_body() {
        let req: PermissionsRequest =
            serde_json::from_str(r#"{"author":1,"editor":0,"always_private":true}"#).unwrap();
        let set = PermissionSet::from(req);
        assert_eq!(set.roles.len(), 1);
        assert!(set.roles.contains("author"));
        assert!(set.always_private);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let resp = ApiError::from(MediaError::NotFound(3)).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
