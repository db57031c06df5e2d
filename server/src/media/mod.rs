//! Private Media
//!
//! Attachment relocation between the public and private roots, and the
//! authorization-checked endpoint serving private files.

mod attachments;
pub mod conditional;
pub mod context;
pub mod dispatch;
mod handlers;
pub mod resolver;
pub mod storage;

use anyhow::Context;
use bytes::Bytes;
use tracing::warn;

pub use attachments::{
    AttachmentManager, AttachmentUrls, MediaError, PolicyReport, ACCESS_MARKER,
};
pub use dispatch::{FORBIDDEN_MIMETYPE, FORBIDDEN_PLACEHOLDER, UNKNOWN_ATTACHMENT_HEADER};
pub use handlers::{navigation_cookie, serve_private_file};
pub use storage::{LocalStorage, StorageError};

use crate::config::Config;

/// Load the forbidden placeholder, falling back to the built-in image.
pub async fn load_placeholder(config: &Config) -> Bytes {
    let Some(path) = &config.forbidden_asset else {
        return Bytes::from_static(FORBIDDEN_PLACEHOLDER);
    };
    match tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
    {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            warn!(error = ?e, "Forbidden asset unavailable, using built-in placeholder");
            Bytes::from_static(FORBIDDEN_PLACEHOLDER)
        }
    }
}
