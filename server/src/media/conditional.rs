//! Conditional requests
//!
//! Cache validators of a served file and the not-modified decision.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};

/// Format of `Last-Modified` and `Expires`.
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format a timestamp as an HTTP date.
#[must_use]
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE).to_string()
}

/// Obsolete `HTTP-date` forms: RFC 850 and asctime.
const OBSOLETE_HTTP_DATES: &[&str] = &["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

/// Parse any `HTTP-date` form into a Unix timestamp.
fn parse_http_date(raw: &str) -> Option<i64> {
    if let Ok(date) = DateTime::parse_from_rfc2822(raw) {
        return Some(date.timestamp());
    }
    OBSOLETE_HTTP_DATES
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|date| date.and_utc().timestamp())
}

/// Validators sent by the client. Empty headers count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
    pub if_modified_since: Option<String>,
    pub if_none_match: Option<String>,
}

impl ConditionalHeaders {
    #[must_use]
    pub fn new(if_modified_since: Option<&str>, if_none_match: Option<&str>) -> Self {
        let clean = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(String::from);
        Self {
            if_modified_since: clean(if_modified_since),
            if_none_match: clean(if_none_match),
        }
    }

    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name| headers.get(name).and_then(|v| v.to_str().ok());
        Self::new(get(header::IF_MODIFIED_SINCE), get(header::IF_NONE_MATCH))
    }

    /// Client timestamp in seconds; unparseable dates count as the epoch.
    fn modified_since(&self) -> Option<i64> {
        self.if_modified_since
            .as_deref()
            .map(|raw| parse_http_date(raw).unwrap_or(0))
    }
}

/// Validators of a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validators {
    /// `Last-Modified` header value.
    pub last_modified: String,
    /// Strong `ETag` derived from `last_modified`.
    pub etag: String,
    modified: i64,
}

impl Validators {
    #[must_use]
    pub fn new(mtime: DateTime<Utc>) -> Self {
        let last_modified = http_date(mtime);
        let etag = format!("\"{}\"", hex::encode(Sha256::digest(last_modified.as_bytes())));
        Self {
            last_modified,
            etag,
            modified: mtime.timestamp(),
        }
    }
}

/// Whether the client copy is current.
///
/// With both validators sent, both must match. With only one sent, that one
/// matching is enough. An absent validator never matches.
#[must_use]
pub fn is_not_modified(client: &ConditionalHeaders, file: &Validators) -> bool {
    let date_ok = client
        .modified_since()
        .is_some_and(|since| since >= file.modified);
    let etag_ok = client.if_none_match.as_deref() == Some(file.etag.as_str());

    if client.if_modified_since.is_some() && client.if_none_match.is_some() {
        date_ok && etag_ok
    } else {
        date_ok || etag_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file() -> Validators {
        Validators::new(Utc.with_ymd_and_hms(2024, 5, 10, 12, 30, 0).unwrap())
    }

    #[derive(Clone, Copy)]
    enum Sent {
        Absent,
        Match,
        Mismatch,
    }

    fn headers(since: Sent, etag: Sent) -> ConditionalHeaders {
        let v = file();
        let since = match since {
            Sent::Absent => None,
            Sent::Match => Some("Fri, 10 May 2024 12:30:00 GMT".to_string()),
            Sent::Mismatch => Some("Thu, 09 May 2024 08:00:00 GMT".to_string()),
        };
        let etag = match etag {
            Sent::Absent => None,
            Sent::Match => Some(v.etag),
            Sent::Mismatch => Some("\"stale\"".to_string()),
        };
        ConditionalHeaders::new(since.as_deref(), etag.as_deref())
    }

    #[test]
    fn test_validator_format() {
        let v = file();
        assert_eq!(v.last_modified, "Fri, 10 May 2024 12:30:00 GMT");
        assert!(v.etag.starts_with('"') && v.etag.ends_with('"'));
        assert_eq!(v.etag.len(), 64 + 2);
        assert_eq!(v, file());
    }

    #[test]
    fn test_truth_table() {
        use Sent::{Absent, Match, Mismatch};
        let cases = [
            (Absent, Absent, false),
            (Absent, Match, true),
            (Absent, Mismatch, false),
            (Match, Absent, true),
            (Mismatch, Absent, false),
            (Match, Match, true),
            (Match, Mismatch, false),
            (Mismatch, Match, false),
            (Mismatch, Mismatch, false),
        ];
        for (i, (since, etag, expected)) in cases.into_iter().enumerate() {
            assert_eq!(
                is_not_modified(&headers(since, etag), &file()),
                expected,
                "case {i}"
            );
        }
    }

    #[test]
    fn test_newer_client_date_counts_as_match() {
        let client = ConditionalHeaders::new(Some("Sat, 01 Jun 2024 00:00:00 GMT"), None);
        assert!(is_not_modified(&client, &file()));
    }

    #[test]
    fn test_obsolete_date_forms_match() {
        for raw in [
            "Friday, 10-May-24 12:30:00 GMT",
            "Fri May 10 12:30:00 2024",
        ] {
            let client = ConditionalHeaders::new(Some(raw), None);
            assert!(is_not_modified(&client, &file()), "{raw}");
        }

        let older = ConditionalHeaders::new(Some("Thu May  9 08:00:00 2024"), None);
        assert!(!is_not_modified(&older, &file()));
    }

    #[test]
    fn test_garbage_date_never_matches() {
        let client = ConditionalHeaders::new(Some("yesterday-ish"), None);
        assert!(!is_not_modified(&client, &file()));
    }

    #[test]
    fn test_empty_headers_are_absent() {
        let client = ConditionalHeaders::new(Some("  "), Some(""));
        assert_eq!(client, ConditionalHeaders::default());
    }

    #[test]
    fn test_from_headers() {
        let mut map = HeaderMap::new();
        map.insert(header::IF_NONE_MATCH, "\"abc\"".parse().unwrap());
        let client = ConditionalHeaders::from_headers(&map);
        assert_eq!(client.if_none_match.as_deref(), Some("\"abc\""));
        assert!(client.if_modified_since.is_none());
    }
}
