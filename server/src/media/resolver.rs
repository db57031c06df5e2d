//! Request Resolver
//!
//! Maps a requested path below the private prefix to the attachment that owns it.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::db::{AttachmentId, MetadataStore, StoreResult};

/// Trailing `-<width>x<height>` right before the extension.
static SIZE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-[0-9]+x[0-9]+(\.[^./]+)$").expect("valid regex")
});

const PDF_PREVIEW_SUFFIX: &str = "-pdf.jpg";

/// Percent-decode a raw request path and strip everything that could walk
/// out of the uploads tree.
///
/// Backslashes count as separators; empty, `.` and `..` segments are dropped.
#[must_use]
pub fn sanitize_path(raw: &str) -> String {
    let decoded = urlencoding::decode(raw).map_or_else(|_| raw.into(), |d| d.into_owned());
    decoded
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .collect::<Vec<_>>()
        .join("/")
}

/// Map a size variant or PDF preview path to the path of the original upload.
#[must_use]
pub fn normalize(path: &str) -> String {
    let stripped = SIZE_SUFFIX.replace(path, "$1");
    match stripped.strip_suffix(PDF_PREVIEW_SUFFIX) {
        Some(base) => format!("{base}.pdf"),
        None => stripped.into_owned(),
    }
}

/// Find the attachment owning `path` (already sanitized).
///
/// `Ok(None)` means no attachment claims the path, which callers answer
/// with 404 rather than 403.
#[tracing::instrument(skip(store))]
pub async fn resolve(store: &dyn MetadataStore, path: &str) -> StoreResult<Option<AttachmentId>> {
    let normalized = normalize(path);
    let id = store.find_by_file(&normalized).await?;
    if id.is_none() {
        warn!(path = %path, normalized = %normalized, "Unknown private media attachment");
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Attachment, MemoryStore};

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_path("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_path("2024/./05/../a.jpg"), "2024/05/a.jpg");
        assert_eq!(sanitize_path("..\\..\\secret.txt"), "secret.txt");
        assert_eq!(sanitize_path("%2e%2e/%2e%2e/x.png"), "x.png");
    }

    #[test]
    fn test_sanitize_decodes_once() {
        assert_eq!(sanitize_path("2024/05/my%20file.jpg"), "2024/05/my file.jpg");
        assert_eq!(sanitize_path("2024/a%c2%adb.jpg"), "2024/a\u{ad}b.jpg");
        assert_eq!(sanitize_path("a%252e.jpg"), "a%2e.jpg");
    }

    #[test]
    fn test_normalize_size_variant() {
        assert_eq!(normalize("2024/05/photo-300x200.jpg"), "2024/05/photo.jpg");
        assert_eq!(normalize("2024/05/photo-1024x768.png"), "2024/05/photo.png");
        assert_eq!(normalize("2024/05/photo.jpg"), "2024/05/photo.jpg");
    }

    #[test]
    fn test_normalize_keeps_dimensions_not_at_end() {
        assert_eq!(normalize("2024/05/a-10x10-b.jpg"), "2024/05/a-10x10-b.jpg");
    }

    #[test]
    fn test_normalize_pdf_preview() {
        assert_eq!(normalize("2024/05/report-pdf.jpg"), "2024/05/report.pdf");
        assert_eq!(normalize("2024/05/report-pdf-150x150.jpg"), "2024/05/report.pdf");
    }

    #[tokio::test]
    async fn test_resize_variant_and_original_resolve_to_same_attachment() {
        let store = MemoryStore::new();
        store.insert_attachment(Attachment {
            id: 12,
            file: "2024/05/photo.jpg".into(),
            sizes: vec!["photo-300x200.jpg".into()],
            mime_type: "image/jpeg".into(),
            parent: None,
            is_private: true,
            permissions: None,
        });

        let original = resolve(&store, "2024/05/photo.jpg").await.unwrap();
        let variant = resolve(&store, "2024/05/photo-300x200.jpg").await.unwrap();
        assert_eq!(original, Some(12));
        assert_eq!(variant, original);
    }

    #[tokio::test]
    async fn test_unknown_path_is_none() {
        let store = MemoryStore::new();
        assert_eq!(resolve(&store, "2024/05/nope.jpg").await.unwrap(), None);
    }
}
