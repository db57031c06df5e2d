//! Session Resolution
//!
//! Sessions are opaque tokens carried in a cookie and looked up in the
//! metadata store.

use axum_extra::extract::CookieJar;
use tracing::warn;

use super::error::AuthResult;
use crate::db::{MetadataStore, Viewer};

/// Look up the viewer behind the session cookie named `cookie`.
pub async fn find_viewer(
    store: &dyn MetadataStore,
    jar: &CookieJar,
    cookie: &str,
) -> AuthResult<Option<Viewer>> {
    let Some(token) = jar.get(cookie).map(|c| c.value().trim()).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    Ok(store.find_session(token).await?)
}

/// Like [`find_viewer`], treating a failed lookup as anonymous.
pub async fn resolve_viewer(
    store: &dyn MetadataStore,
    jar: &CookieJar,
    cookie: &str,
) -> Option<Viewer> {
    match find_viewer(store, jar, cookie).await {
        Ok(viewer) => viewer,
        Err(e) => {
            warn!(error = %e, "Session lookup failed, continuing as anonymous");
            None
        }
    }
}
