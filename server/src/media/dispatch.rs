//! Response Dispatcher
//!
//! Runs one private file request through resolve, authorize, existence and
//! freshness checks, ending in a [`Terminal`] that [`respond`] turns into
//! the HTTP response.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::{Duration, Utc};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

use super::conditional::{http_date, is_not_modified, Validators};
use super::context::RequestContext;
use super::resolver;
use super::storage::{LocalStorage, StorageResult};
use crate::api::AppState;
use crate::db::Attachment;
use crate::permissions::{evaluate, AccessContext, Decision};

/// Content type of the forbidden placeholder.
pub const FORBIDDEN_MIMETYPE: &str = "image/svg+xml";

/// Header flagging a private-root file that no attachment claims.
pub static UNKNOWN_ATTACHMENT_HEADER: HeaderName = HeaderName::from_static("pvtmed-error");

/// Built-in forbidden placeholder.
pub const FORBIDDEN_PLACEHOLDER: &[u8] = br##"<svg xmlns="http://www.w3.org/2000/svg" width="128" height="128" viewBox="0 0 128 128"><rect width="128" height="128" fill="#e5e5e5"/><circle cx="64" cy="64" r="36" fill="none" stroke="#b00020" stroke-width="10"/><line x1="39" y1="89" x2="89" y2="39" stroke="#b00020" stroke-width="10"/></svg>
"##;

/// Bytes sniffed when the extension gives no content type.
const SNIFF_LEN: u64 = 8192;

/// Headers describing a file that is served or confirmed fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeaders {
    pub content_type: String,
    /// `None` when `Content-Length` is suppressed.
    pub content_length: Option<u64>,
    pub validators: Validators,
    pub expires: String,
}

impl FileHeaders {
    fn write_to(&self, headers: &mut HeaderMap) {
        insert(headers, header::CONTENT_TYPE, &self.content_type);
        if let Some(len) = self.content_length {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        insert(headers, header::LAST_MODIFIED, &self.validators.last_modified);
        insert(headers, header::ETAG, &self.validators.etag);
        insert(headers, header::EXPIRES, &self.expires);
    }
}

/// Final state of a private file request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// No attachment or no file on disk.
    NotFound,
    /// Access denied; `unknown_attachment` marks an unclaimed private-root file.
    Forbidden { unknown_attachment: bool },
    /// Client copy is current.
    NotModified(FileHeaders),
    /// Stream `file`.
    Ok { headers: FileHeaders, file: PathBuf },
}

impl Terminal {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotModified(_) => StatusCode::NOT_MODIFIED,
            Self::Ok { .. } => StatusCode::OK,
        }
    }
}

/// Run the request state machine.
#[tracing::instrument(skip_all, fields(path = %ctx.path))]
pub async fn dispatch(state: &AppState, ctx: &RequestContext) -> Terminal {
    let store = state.store.as_ref();

    let attachment = match resolver::resolve(store, &ctx.path).await {
        Ok(Some(id)) => match store.get_attachment(id).await {
            Ok(Some(attachment)) => Some(attachment),
            Ok(None) => {
                error!(attachment_id = id, "Attachment indexed by path has no record");
                None
            }
            Err(e) => {
                error!(attachment_id = id, error = %e, "Failed to load attachment");
                return Terminal::Forbidden {
                    unknown_attachment: false,
                };
            }
        },
        Ok(None) => None,
        Err(e) => {
            error!(error = %e, "Failed to resolve private file");
            return Terminal::Forbidden {
                unknown_attachment: false,
            };
        }
    };

    let Some(attachment) = attachment else {
        return unknown_attachment(state, ctx).await;
    };

    if !authorize(state, ctx, &attachment).await.is_allowed() {
        debug!(attachment_id = attachment.id, "Access denied");
        return Terminal::Forbidden {
            unknown_attachment: false,
        };
    }

    serve(state, ctx, state.media.storage(attachment.is_private)).await
}

/// Decide access to a known attachment.
async fn authorize(state: &AppState, ctx: &RequestContext, attachment: &Attachment) -> Decision {
    let hooks = &state.hooks;
    let Some(permissions) = attachment.permissions.as_ref().filter(|p| !p.is_empty()) else {
        return hooks.is_authorized(Decision::Allow, attachment);
    };

    if hooks.has_permissions(attachment, permissions) {
        return Decision::Allow;
    }

    let mut permissions = permissions.clone();
    if !hooks.hotlink_feature(state.config.hotlink_feature) {
        permissions.disable_hotlinks = false;
    }

    let access = AccessContext {
        viewer: ctx.viewer.as_ref(),
        has_nav_cookie: ctx.has_nav_cookie,
        password_locked: password_locked(state, ctx, attachment).await,
    };
    let decision = evaluate(Some(&permissions), &access, &state.config.registered_roles);
    hooks.is_authorized(decision, attachment)
}

/// Whether the parent post is password protected and still locked for this visitor.
async fn password_locked(state: &AppState, ctx: &RequestContext, attachment: &Attachment) -> bool {
    let Some(parent) = attachment.parent else {
        return false;
    };
    match state.store.get_post(parent).await {
        Ok(Some(post)) => match post.password.as_deref() {
            Some(password) if post.requires_password() => !ctx.has_unlocked(password),
            _ => false,
        },
        Ok(None) => false,
        Err(e) => {
            error!(post_id = parent, error = %e, "Failed to load parent post");
            true
        }
    }
}

/// No attachment claims the path: 404 unless the file sits in the private root.
async fn unknown_attachment(state: &AppState, ctx: &RequestContext) -> Terminal {
    let private = state.media.storage(true);
    match private.exists(&ctx.path).await {
        Ok(true) => {
            error!("Private file exists but no attachment claims it");
            if state
                .hooks
                .unknown_attachment(Decision::Deny, &ctx.path)
                .is_allowed()
            {
                serve(state, ctx, private).await
            } else {
                Terminal::Forbidden {
                    unknown_attachment: true,
                }
            }
        }
        Ok(false) => Terminal::NotFound,
        Err(e) => {
            warn!(error = %e, "Failed to check private file");
            Terminal::NotFound
        }
    }
}

/// Serve an authorized file from `storage`, or confirm the client copy.
async fn serve(state: &AppState, ctx: &RequestContext, storage: &LocalStorage) -> Terminal {
    match storage.exists(&ctx.path).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("Attachment file missing on disk");
            return Terminal::NotFound;
        }
        Err(e) => {
            warn!(error = %e, "Failed to check attachment file");
            return Terminal::NotFound;
        }
    }

    let (headers, file) = match file_headers(state, storage, &ctx.path).await {
        Ok(found) => found,
        Err(e) => {
            error!(error = %e, "Failed to read file metadata");
            return Terminal::NotFound;
        }
    };

    if is_not_modified(&ctx.conditional, &headers.validators) {
        Terminal::NotModified(headers)
    } else {
        Terminal::Ok { headers, file }
    }
}

async fn file_headers(
    state: &AppState,
    storage: &LocalStorage,
    relative: &str,
) -> StorageResult<(FileHeaders, PathBuf)> {
    let file = storage.resolve(relative)?;
    let mtime = storage.mtime(relative).await?;
    let content_length = if state.config.omit_content_length {
        None
    } else {
        Some(storage.size(relative).await?)
    };

    let content_type = match mime_guess::from_path(&file).first_raw() {
        Some(mime) => mime.to_string(),
        None => match storage.read_head(relative, SNIFF_LEN).await {
            Ok(head) => infer::get(&head)
                .map_or_else(|| fallback_mimetype(&file), |t| t.mime_type().to_string()),
            Err(_) => fallback_mimetype(&file),
        },
    };
    let content_type = state.hooks.mimetype(content_type, &file);

    let now = Utc::now();
    let expires = Duration::try_seconds(state.config.expires_after_secs)
        .and_then(|offset| now.checked_add_signed(offset))
        .unwrap_or_else(|| {
            warn!(
                expires_after_secs = state.config.expires_after_secs,
                "Expires offset out of range, sending an immediate expiry"
            );
            now
        });
    let expires = http_date(expires);

    Ok((
        FileHeaders {
            content_type,
            content_length,
            validators: Validators::new(mtime),
            expires,
        },
        file,
    ))
}

/// `image/<ext>` for unknown extensions, a generic binary type without one.
fn fallback_mimetype(file: &Path) -> String {
    file.extension()
        .and_then(OsStr::to_str)
        .map_or_else(
            || "application/octet-stream".to_string(),
            |ext| format!("image/{}", ext.to_ascii_lowercase()),
        )
}

/// Turn a terminal state into the response, passing file and status
/// through the hooks.
pub async fn respond(state: &AppState, terminal: Terminal) -> Response {
    let hooks = &state.hooks;
    let mut headers = HeaderMap::new();
    let mut unknown = false;

    let (status, file) = match terminal {
        Terminal::NotFound => (StatusCode::NOT_FOUND, None),
        Terminal::Forbidden { unknown_attachment } => {
            unknown = unknown_attachment;
            (StatusCode::FORBIDDEN, None)
        }
        Terminal::NotModified(file_headers) => {
            file_headers.write_to(&mut headers);
            (StatusCode::NOT_MODIFIED, None)
        }
        Terminal::Ok {
            headers: file_headers,
            file,
        } => {
            file_headers.write_to(&mut headers);
            (StatusCode::OK, Some(file))
        }
    };

    let file = hooks.file(file);
    let status = hooks.status(status, file.as_deref());

    if status == StatusCode::FORBIDDEN {
        return forbidden(state, file.as_deref(), unknown);
    }

    if status != StatusCode::OK {
        return (status, headers).into_response();
    }

    let Some(file) = file else {
        return (status, headers).into_response();
    };

    match tokio::fs::File::open(&file).await {
        Ok(handle) => {
            let body = Body::from_stream(ReaderStream::new(handle));
            (status, headers, body).into_response()
        }
        Err(e) => {
            error!(file = %file.display(), error = %e, "Failed to open file for streaming");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Placeholder asset, or a redirect when a hook supplies one.
fn forbidden(state: &AppState, file: Option<&Path>, unknown_attachment: bool) -> Response {
    let hooks = &state.hooks;
    let mut headers = HeaderMap::new();

    if unknown_attachment {
        headers.insert(
            UNKNOWN_ATTACHMENT_HEADER.clone(),
            HeaderValue::from_static("Unknown Attachment"),
        );
    }

    if let Some(location) = hooks.forbidden_redirect(file) {
        let status = hooks.forbidden_status(StatusCode::FOUND, file);
        match HeaderValue::from_str(&location) {
            Ok(value) => {
                headers.insert(header::LOCATION, value);
                return (status, headers).into_response();
            }
            Err(_) => warn!(location = %location, "Ignoring invalid forbidden redirect"),
        }
    }

    let mimetype = hooks.forbidden_mimetype(FORBIDDEN_MIMETYPE.to_string());
    insert(&mut headers, header::CONTENT_TYPE, &mimetype);
    let content: Bytes = hooks.forbidden_content(state.placeholder.clone(), file);

    (StatusCode::FORBIDDEN, headers, content).into_response()
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => warn!(header = %name, "Dropping invalid header value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_mimetype() {
        assert_eq!(fallback_mimetype(Path::new("a/b.HEIC")), "image/heic");
        assert_eq!(fallback_mimetype(Path::new("a/noext")), "application/octet-stream");
    }

    #[test]
    fn test_terminal_status() {
        assert_eq!(Terminal::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Terminal::Forbidden {
                unknown_attachment: true
            }
            .status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_placeholder_is_svg() {
        let text = std::str::from_utf8(FORBIDDEN_PLACEHOLDER).unwrap();
        assert!(text.starts_with("<svg"));
    }

    #[test]
    fn test_file_headers_written() {
        let fh = FileHeaders {
            content_type: "image/png".into(),
            content_length: None,
            validators: Validators::new(Utc::now()),
            expires: "Thu, 01 Jan 2099 00:00:00 GMT".into(),
        };
        let mut map = HeaderMap::new();
        fh.write_to(&mut map);
        assert_eq!(map[header::CONTENT_TYPE], "image/png");
        assert!(map.get(header::CONTENT_LENGTH).is_none());
        assert!(map.contains_key(header::ETAG));
        assert!(map.contains_key(header::LAST_MODIFIED));
        assert!(map.contains_key(header::EXPIRES));
    }
}
