//! Permission resolution logic.
//!
//! Decides whether a requester may fetch a file given its stored permission set.

use super::models::{Decision, PermissionSet};
use crate::db::Viewer;

/// Per-request facts the evaluator needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessContext<'a> {
    /// The signed-in requester, if any.
    pub viewer: Option<&'a Viewer>,
    /// Whether the same-site navigation cookie came with the request.
    pub has_nav_cookie: bool,
    /// Whether the attachment's parent post is password protected and
    /// not yet unlocked by this visitor.
    pub password_locked: bool,
}

/// Evaluate a permission set against a request.
///
/// Resolution order:
/// 1. No permission set (or nothing switched on) allows access
/// 2. With `disable_hotlinks`, the navigation cookie must be present
/// 3. Without any registered role granted the file is fully protected
/// 4. Otherwise the requester must be signed in and hold a granted role
/// 5. A locked password-protected parent post voids the navigation cookie
pub fn evaluate(
    permissions: Option<&PermissionSet>,
    ctx: &AccessContext<'_>,
    registered_roles: &[String],
) -> Decision {
    let permissions = match permissions {
        Some(p) if !p.is_empty() => p,
        _ => return Decision::Allow,
    };

    let mut hotlink_ok = !permissions.disable_hotlinks || ctx.has_nav_cookie;

    let granted: Vec<&str> = permissions.granted_roles(registered_roles).collect();
    if granted.is_empty() {
        // Always private or hotlink-only: nobody matches by role.
        return Decision::Deny;
    }

    let Some(viewer) = ctx.viewer else {
        return Decision::Deny;
    };

    if ctx.password_locked {
        hotlink_ok = false;
    }

    let role_match = viewer
        .roles
        .iter()
        .any(|role| granted.contains(&role.as_str()));

    Decision::from_bool(role_match && hotlink_ok)
}
