//! Private file endpoint and navigation cookie middleware.

use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;

use super::context::{is_private_request, private_file_path, RequestContext};
use super::dispatch::{dispatch, respond};
use crate::api::AppState;

/// GET /{prefix}/{*file}
///
/// The raw URI path is used so the file path is percent-decoded exactly once.
#[tracing::instrument(skip_all, fields(uri = %uri))]
pub async fn serve_private_file(
    State(state): State<AppState>,
    uri: Uri,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let raw = private_file_path(uri.path(), &state.config.private_prefix);
    let ctx = RequestContext::build(&state, raw, &jar, &headers).await;
    let terminal = dispatch(&state, &ctx).await;
    respond(&state, terminal).await
}

/// Mark every ordinary response with a short-lived same-site navigation cookie.
///
/// Private file requests never refresh it, so only a page visit on this
/// site can satisfy hotlink protection.
pub async fn navigation_cookie(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let doing_private_request =
        is_private_request(request.uri().path(), &state.config.private_prefix);

    let mut response = next.run(request).await;

    if !doing_private_request && state.hooks.hotlink_feature(state.config.hotlink_feature) {
        let cookie = Cookie::build((state.config.nav_cookie.clone(), "1"))
            .path("/")
            .max_age(time::Duration::seconds(state.config.nav_cookie_ttl))
            .same_site(SameSite::Lax)
            .build();
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }

    response
}
