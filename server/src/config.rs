//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// Largest accepted `Expires` offset (ten years).
pub const MAX_EXPIRES_AFTER_SECS: i64 = 10 * 365 * 86_400;

/// Roles registered by a stock installation.
pub const DEFAULT_ROLES: &[&str] = &[
    "administrator",
    "editor",
    "author",
    "contributor",
    "subscriber",
];

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// `PostgreSQL` connection URL (optional, in-memory store when unset)
    pub database_url: Option<String>,

    /// Root directory of publicly served uploads
    pub public_dir: PathBuf,

    /// Root directory of private uploads (never served directly)
    pub private_dir: PathBuf,

    /// Public site URL, without trailing slash
    pub site_url: String,

    /// URL prefix of the private file endpoint (default: "pvtmed")
    pub private_prefix: String,

    /// Name of the session cookie
    pub session_cookie: String,

    /// Name of the same-site navigation cookie used by hotlink protection
    pub nav_cookie: String,

    /// Lifetime of the navigation cookie in seconds (default: 10)
    pub nav_cookie_ttl: i64,

    /// Name of the cookie carrying unlocked post password hashes
    pub post_pass_cookie: String,

    /// Whether hotlink protection is available at all
    pub hotlink_feature: bool,

    /// Skip `Content-Length` on file responses (legacy IIS front ends)
    pub omit_content_length: bool,

    /// Offset of the `Expires` header in seconds (default: 100000000)
    pub expires_after_secs: i64,

    /// Roles that can be granted access to a private file
    pub registered_roles: Vec<String>,

    /// Role required for the admin API
    pub admin_role: String,

    /// Optional replacement for the built-in forbidden placeholder
    pub forbidden_asset: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::defaults();

        let config = Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            public_dir: env::var("PUBLIC_UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.public_dir),
            private_dir: env::var("PRIVATE_UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.private_dir),
            site_url: env::var("SITE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.site_url),
            private_prefix: env::var("PRIVATE_PREFIX")
                .map(|v| v.trim_matches('/').to_string())
                .unwrap_or(defaults.private_prefix),
            session_cookie: env::var("SESSION_COOKIE").unwrap_or(defaults.session_cookie),
            nav_cookie: env::var("NAV_COOKIE").unwrap_or(defaults.nav_cookie),
            nav_cookie_ttl: parse_var("NAV_COOKIE_TTL")?.unwrap_or(defaults.nav_cookie_ttl),
            post_pass_cookie: env::var("POST_PASS_COOKIE").unwrap_or(defaults.post_pass_cookie),
            hotlink_feature: parse_var("HOTLINK_FEATURE")?.unwrap_or(defaults.hotlink_feature),
            omit_content_length: parse_var("OMIT_CONTENT_LENGTH")?
                .unwrap_or(defaults.omit_content_length),
            expires_after_secs: parse_var("EXPIRES_AFTER_SECS")?
                .unwrap_or(defaults.expires_after_secs),
            registered_roles: env::var("REGISTERED_ROLES")
                .ok()
                .map(|s| parse_list(&s))
                .unwrap_or(defaults.registered_roles),
            admin_role: env::var("ADMIN_ROLE").unwrap_or(defaults.admin_role),
            forbidden_asset: env::var("FORBIDDEN_ASSET").ok().map(PathBuf::from),
        };
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Check value ranges that parsing alone cannot enforce.
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_EXPIRES_AFTER_SECS).contains(&self.expires_after_secs) {
            bail!(
                "EXPIRES_AFTER_SECS must be between 0 and {MAX_EXPIRES_AFTER_SECS}, got {}",
                self.expires_after_secs
            );
        }
        if self.nav_cookie_ttl < 0 {
            bail!("NAV_COOKIE_TTL must not be negative, got {}", self.nav_cookie_ttl);
        }
        Ok(())
    }

    fn defaults() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
            database_url: None,
            public_dir: PathBuf::from("./uploads"),
            private_dir: PathBuf::from("./pvtmed-uploads"),
            site_url: "http://localhost:8080".into(),
            private_prefix: "pvtmed".into(),
            session_cookie: "pm_session".into(),
            nav_cookie: "pvtmed".into(),
            nav_cookie_ttl: 10,
            post_pass_cookie: "pm_postpass".into(),
            hotlink_feature: true,
            omit_content_length: false,
            expires_after_secs: 100_000_000,
            registered_roles: DEFAULT_ROLES.iter().map(|r| (*r).to_string()).collect(),
            admin_role: "administrator".into(),
            forbidden_asset: None,
        }
    }

    /// Check if a Postgres metadata store is configured.
    #[must_use]
    pub const fn has_database(&self) -> bool {
        self.database_url.is_some()
    }

    /// Public URL under which uploads are served.
    #[must_use]
    pub fn public_upload_url(&self) -> String {
        format!("{}/uploads/", self.site_url)
    }

    /// Public URL of the private file endpoint.
    #[must_use]
    pub fn private_upload_url(&self) -> String {
        format!("{}/{}/", self.site_url, self.private_prefix)
    }

    /// Create a default configuration for testing, rooted at the given directories.
    #[must_use]
    pub fn default_for_test(public_dir: PathBuf, private_dir: PathBuf) -> Self {
        Self {
            bind_address: "127.0.0.1:8080".into(),
            site_url: "http://localhost".into(),
            public_dir,
            private_dir,
            ..Self::defaults()
        }
    }
}

/// Parse an optional typed environment variable, failing on malformed values.
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(None),
    }
}

/// Split a comma-separated list, dropping empty entries.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
