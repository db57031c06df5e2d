//! API Router and Application State
//!
//! Central routing configuration and shared state.

pub mod attachments;

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{delete, get, put},
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    auth,
    config::Config,
    db::MetadataStore,
    hooks::HookChain,
    media::{self, AttachmentManager},
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Attachment, post and session metadata
    pub store: Arc<dyn MetadataStore>,
    /// Attachment privacy state and file relocation
    pub media: Arc<AttachmentManager>,
    /// Deployment-specific overrides
    pub hooks: Arc<HookChain>,
    /// Body of forbidden responses
    pub placeholder: Bytes,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<dyn MetadataStore>,
        hooks: HookChain,
        placeholder: Bytes,
    ) -> Self {
        let hooks = Arc::new(hooks);
        let media = Arc::new(AttachmentManager::new(&config, store.clone(), hooks.clone()));
        Self {
            config: Arc::new(config),
            store,
            media,
            hooks,
            placeholder,
        }
    }

    /// Build state with the forbidden placeholder loaded from configuration.
    pub async fn load(config: Config, store: Arc<dyn MetadataStore>, hooks: HookChain) -> Self {
        let placeholder = media::load_placeholder(&config).await;
        Self::new(config, store, hooks, placeholder)
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let private_route = format!("/{}/{{*file}}", state.config.private_prefix);

    // Admin routes (session with the admin role)
    let admin_routes = Router::new()
        .route(
            "/attachments/{id}/privacy",
            get(attachments::get_privacy),
        )
        .route(
            "/attachments/{id}/permissions",
            put(attachments::set_permissions),
        )
        .route(
            "/attachments/{id}/files",
            delete(attachments::delete_files),
        )
        .route("/attachments/{id}/url", get(attachments::get_url))
        .layer(from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Private files, authorization-checked
        .route(&private_route, get(media::serve_private_file))
        // Public uploads
        .nest_service("/uploads", ServeDir::new(&state.config.public_dir))
        .nest("/api", admin_routes)
        // Middleware
        .layer(from_fn_with_state(state.clone(), media::navigation_cookie))
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Whether a database-backed store is configured
    database: bool,
    /// Whether hotlink protection is active
    hotlink_protection: bool,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        database: state.config.has_database(),
        hotlink_protection: state.hooks.hotlink_feature(state.config.hotlink_feature),
    })
}
