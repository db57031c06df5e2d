//! Extension Hooks
//!
//! Deployment-specific overrides for every decision point of the private
//! file pipeline. Implement [`MediaHooks`] for the points you care about and
//! register the implementation on a [`HookChain`]; every method has a
//! pass-through default.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::StatusCode;
use bytes::Bytes;

use crate::db::Attachment;
use crate::permissions::{Decision, PermissionSet};

/// Typed extension interface, one method per decision point.
pub trait MediaHooks: Send + Sync {
    /// Force access to a private file before any rule runs.
    fn has_permissions(&self, _attachment: &Attachment, _permissions: &PermissionSet) -> bool {
        false
    }

    /// Override the computed decision for a known attachment.
    fn is_authorized(&self, decision: Decision, _attachment: &Attachment) -> Decision {
        decision
    }

    /// Decide access to a private-root file that no attachment claims.
    fn unknown_attachment(&self, decision: Decision, _path: &str) -> Decision {
        decision
    }

    /// Content type of a served file.
    fn mimetype(&self, mimetype: String, _path: &Path) -> String {
        mimetype
    }

    /// Content type of the forbidden placeholder.
    fn forbidden_mimetype(&self, mimetype: String) -> String {
        mimetype
    }

    /// File streamed by a terminal response (`None` when nothing is streamed).
    fn file(&self, file: Option<PathBuf>) -> Option<PathBuf> {
        file
    }

    /// Final status of a terminal response.
    fn status(&self, status: StatusCode, _file: Option<&Path>) -> StatusCode {
        status
    }

    /// Redirect target used instead of the forbidden placeholder.
    fn forbidden_redirect(&self, redirect: Option<String>, _file: Option<&Path>) -> Option<String> {
        redirect
    }

    /// Status of a forbidden redirect.
    fn forbidden_status(&self, status: StatusCode, _file: Option<&Path>) -> StatusCode {
        status
    }

    /// Body of the forbidden placeholder.
    fn forbidden_content(&self, content: Bytes, _file: Option<&Path>) -> Bytes {
        content
    }

    /// Whether the navigation cookie and the hotlink flag are in use.
    fn hotlink_feature(&self, enabled: bool) -> bool {
        enabled
    }

    /// Contents of the access-denial marker written into the private root.
    fn access_marker(&self, rules: String) -> String {
        rules
    }

    /// Base URL of the private endpoint.
    fn private_url(&self, url: String) -> String {
        url
    }
}

/// Ordered list of hooks; each one receives the previous one's output.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn MediaHooks>>,
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl HookChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook; later hooks see earlier hooks' results.
    #[must_use]
    pub fn with(mut self, hook: Arc<dyn MediaHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn has_permissions(&self, attachment: &Attachment, permissions: &PermissionSet) -> bool {
        self.hooks
            .iter()
            .any(|h| h.has_permissions(attachment, permissions))
    }

    pub fn is_authorized(&self, decision: Decision, attachment: &Attachment) -> Decision {
        self.hooks
            .iter()
            .fold(decision, |d, h| h.is_authorized(d, attachment))
    }

    pub fn unknown_attachment(&self, decision: Decision, path: &str) -> Decision {
        self.hooks
            .iter()
            .fold(decision, |d, h| h.unknown_attachment(d, path))
    }

    pub fn mimetype(&self, mimetype: String, path: &Path) -> String {
        self.hooks.iter().fold(mimetype, |m, h| h.mimetype(m, path))
    }

    pub fn forbidden_mimetype(&self, mimetype: String) -> String {
        self.hooks
            .iter()
            .fold(mimetype, |m, h| h.forbidden_mimetype(m))
    }

    pub fn file(&self, file: Option<PathBuf>) -> Option<PathBuf> {
        self.hooks.iter().fold(file, |f, h| h.file(f))
    }

    pub fn status(&self, status: StatusCode, file: Option<&Path>) -> StatusCode {
        self.hooks.iter().fold(status, |s, h| h.status(s, file))
    }

    pub fn forbidden_redirect(&self, file: Option<&Path>) -> Option<String> {
        self.hooks
            .iter()
            .fold(None, |r, h| h.forbidden_redirect(r, file))
    }

    pub fn forbidden_status(&self, status: StatusCode, file: Option<&Path>) -> StatusCode {
        self.hooks
            .iter()
            .fold(status, |s, h| h.forbidden_status(s, file))
    }

    pub fn forbidden_content(&self, content: Bytes, file: Option<&Path>) -> Bytes {
        self.hooks
            .iter()
            .fold(content, |c, h| h.forbidden_content(c, file))
    }

    pub fn hotlink_feature(&self, enabled: bool) -> bool {
        self.hooks
            .iter()
            .fold(enabled, |e, h| h.hotlink_feature(e))
    }

    pub fn access_marker(&self, rules: String) -> String {
        self.hooks.iter().fold(rules, |r, h| h.access_marker(r))
    }

    pub fn private_url(&self, url: String) -> String {
        self.hooks.iter().fold(url, |u, h| h.private_url(u))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Suffix(&'static str);

    impl MediaHooks for Suffix {
        fn mimetype(&self, mimetype: String, _path: &Path) -> String {
            format!("{mimetype}{}", self.0)
        }
    }

    struct AllowAll;

    impl MediaHooks for AllowAll {
        fn is_authorized(&self, _decision: Decision, _attachment: &Attachment) -> Decision {
            Decision::Allow
        }
    }

    fn attachment() -> Attachment {
        Attachment {
            id: 1,
            file: "a.png".into(),
            sizes: Vec::new(),
            mime_type: "image/png".into(),
            parent: None,
            is_private: true,
            permissions: None,
        }
    }

    #[test]
    fn test_empty_chain_passes_values_through() {
        let chain = HookChain::new();
        assert_eq!(chain.mimetype("image/png".into(), Path::new("a.png")), "image/png");
        assert_eq!(chain.status(StatusCode::OK, None), StatusCode::OK);
        assert_eq!(chain.forbidden_redirect(None), None);
        assert!(chain.hotlink_feature(true));
        assert_eq!(
            chain.unknown_attachment(Decision::Deny, "x.png"),
            Decision::Deny
        );
    }

    #[test]
    fn test_hooks_fold_in_registration_order() {
        let chain = HookChain::new()
            .with(Arc::new(Suffix("+a")))
            .with(Arc::new(Suffix("+b")));
        assert_eq!(chain.mimetype("x".into(), Path::new("f")), "x+a+b");
    }

    #[test]
    fn test_authorization_override() {
        let chain = HookChain::new().with(Arc::new(AllowAll));
        assert_eq!(
            chain.is_authorized(Decision::Deny, &attachment()),
            Decision::Allow
        );
        assert!(!chain.has_permissions(&attachment(), &PermissionSet::default()));
    }
}
