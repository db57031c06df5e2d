//! Per-request facts gathered once before dispatch.

use std::collections::HashSet;

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use sha2::{Digest, Sha256};

use super::conditional::ConditionalHeaders;
use super::resolver::sanitize_path;
use crate::api::AppState;
use crate::auth::resolve_viewer;
use crate::db::Viewer;

/// Everything the dispatcher needs to know about one private file request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Sanitized path relative to the uploads root.
    pub path: String,
    pub viewer: Option<Viewer>,
    /// Same-site navigation cookie was sent.
    pub has_nav_cookie: bool,
    /// Password hashes of posts this visitor has unlocked.
    pub unlocked_posts: HashSet<String>,
    pub conditional: ConditionalHeaders,
}

impl RequestContext {
    /// Build the context for `raw_path` (still percent-encoded, prefix removed).
    pub async fn build(
        state: &AppState,
        raw_path: &str,
        jar: &CookieJar,
        headers: &HeaderMap,
    ) -> Self {
        let config = &state.config;
        let viewer = resolve_viewer(state.store.as_ref(), jar, &config.session_cookie).await;

        let has_nav_cookie = jar
            .get(&config.nav_cookie)
            .is_some_and(|c| !matches!(c.value(), "" | "0"));

        let unlocked_posts = jar
            .get(&config.post_pass_cookie)
            .map(|c| {
                c.value()
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_ascii_lowercase)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            path: sanitize_path(raw_path),
            viewer,
            has_nav_cookie,
            unlocked_posts,
            conditional: ConditionalHeaders::from_headers(headers),
        }
    }

    /// Whether this visitor entered `password` for a post.
    #[must_use]
    pub fn has_unlocked(&self, password: &str) -> bool {
        self.unlocked_posts.contains(&password_hash(password))
    }
}

/// Hex SHA-256 of a post password, as carried by the unlocked-posts cookie.
#[must_use]
pub fn password_hash(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Whether `path` targets the private file endpoint below `prefix`.
#[must_use]
pub fn is_private_request(path: &str, prefix: &str) -> bool {
    path.strip_prefix('/')
        .and_then(|p| p.strip_prefix(prefix))
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Raw file path of a private request, without the prefix.
#[must_use]
pub fn private_file_path<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix('/')
        .and_then(|p| p.strip_prefix(prefix))
        .map_or("", |rest| rest.trim_start_matches('/'))
}
