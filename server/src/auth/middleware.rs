//! Authentication Middleware

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::api::AppState;
use crate::db::Viewer;

use super::error::AuthError;
use super::session::find_viewer;

/// Administrator injected into request extensions by [`require_admin`].
#[derive(Debug, Clone)]
pub struct AdminUser(pub Viewer);

/// Middleware to require a session holding the admin role.
///
/// # Usage
///
/// ```ignore
/// Router::new()
///     .route("/admin-only", get(handler))
///     .layer(axum::middleware::from_fn_with_state(state, require_admin))
/// ```
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let jar = CookieJar::from_headers(request.headers());
    let viewer = find_viewer(state.store.as_ref(), &jar, &state.config.session_cookie)
        .await?
        .ok_or(AuthError::NotAuthenticated)?;

    if !viewer.has_role(&state.config.admin_role) {
        return Err(AuthError::MissingRole(state.config.admin_role.clone()));
    }

    request.extensions_mut().insert(AdminUser(viewer));
    Ok(next.run(request).await)
}

/// Extractor for the administrator in handlers behind [`require_admin`].
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::NotAuthenticated)
    }
}
