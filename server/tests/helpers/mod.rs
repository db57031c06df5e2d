//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for building and sending requests through the full axum
//! router, backed by an in-memory metadata store and temporary upload roots.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{self, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use pm_server::api::{create_router, AppState};
use pm_server::config::Config;
use pm_server::db::{Attachment, AttachmentId, MemoryStore, Post, Viewer};
use pm_server::hooks::HookChain;
use pm_server::permissions::PermissionSet;
use tempfile::TempDir;
use tower::ServiceExt;

// ============================================================================
// Test App
// ============================================================================

/// A test application wrapping the full axum router.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub config: Arc<Config>,
    _public: TempDir,
    _private: TempDir,
}

impl TestApp {
    /// Create a new test app with default config and no hooks.
    pub async fn new() -> Self {
        Self::build(|_| {}, HookChain::new()).await
    }

    /// Create a test app with extension hooks registered.
    pub async fn with_hooks(hooks: HookChain) -> Self {
        Self::build(|_| {}, hooks).await
    }

    /// Create a test app with a customised config.
    pub async fn with_config(customise: impl FnOnce(&mut Config)) -> Self {
        Self::build(customise, HookChain::new()).await
    }

    async fn build(customise: impl FnOnce(&mut Config), hooks: HookChain) -> Self {
        let public = tempfile::tempdir().expect("Failed to create public dir");
        let private = tempfile::tempdir().expect("Failed to create private dir");
        let mut config = Config::default_for_test(
            public.path().to_path_buf(),
            private.path().join("pvtmed-uploads"),
        );
        customise(&mut config);

        let store = Arc::new(MemoryStore::new());
        let state = AppState::load(config, store.clone(), hooks).await;
        state
            .media
            .maybe_setup_directories()
            .await
            .expect("Failed to set up private directory");

        let router = create_router(state.clone());
        let config = state.config.clone();

        Self {
            router,
            state,
            store,
            config,
            _public: public,
            _private: private,
        }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// GET a path, optionally with a `Cookie` header.
    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut req = Self::request(Method::GET, uri);
        if let Some(cookie) = cookie {
            req = req.header(http::header::COOKIE, cookie);
        }
        self.oneshot(req.body(Body::empty()).unwrap()).await
    }

    // ------------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------------

    /// Register an attachment and write its main file into the matching root.
    pub async fn add_attachment(
        &self,
        id: AttachmentId,
        file: &str,
        bytes: &[u8],
        permissions: Option<PermissionSet>,
    ) -> Attachment {
        let is_private = permissions.as_ref().is_some_and(PermissionSet::implies_private);
        let attachment = Attachment {
            id,
            file: file.to_string(),
            sizes: Vec::new(),
            mime_type: mime_guess::from_path(file)
                .first_or_octet_stream()
                .to_string(),
            parent: None,
            is_private,
            permissions,
        };
        self.write_file(is_private, file, bytes).await;
        self.store.insert_attachment(attachment.clone());
        attachment
    }

    /// Write a file below the public or private root.
    pub async fn write_file(&self, private: bool, relative: &str, bytes: &[u8]) {
        self.state
            .media
            .storage(private)
            .write(relative, bytes)
            .await
            .expect("Failed to write fixture file");
    }

    /// Whether a file exists below the public or private root.
    pub async fn file_exists(&self, private: bool, relative: &str) -> bool {
        self.state
            .media
            .storage(private)
            .exists(relative)
            .await
            .expect("Failed to stat fixture file")
    }

    /// Register a password-protected post.
    pub fn add_post(&self, id: i64, password: Option<&str>) {
        self.store.insert_post(Post {
            id,
            password: password.map(String::from),
        });
    }

    /// Create a session for a viewer with the given roles; returns the cookie header.
    pub fn login(&self, token: &str, roles: &[&str]) -> String {
        self.store.insert_session(
            token,
            Viewer {
                user_id: 100,
                roles: roles.iter().map(|r| (*r).to_string()).collect(),
            },
        );
        format!("{}={token}", self.config.session_cookie)
    }

    /// Private endpoint URI for a relative file path.
    pub fn private_uri(&self, relative: &str) -> String {
        format!("/{}/{relative}", self.config.private_prefix)
    }
}

/// Collect a response body into bytes.
pub async fn body_bytes(resp: Response<Body>) -> Bytes {
    resp.into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes()
}

/// Collect a JSON response body.
pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(resp).await).expect("Response body is not JSON")
}
