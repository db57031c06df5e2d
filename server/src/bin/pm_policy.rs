//! Apply the privacy policy to every private attachment.
//!
//! `pm-policy activate` moves the files of all attachments flagged private
//! into the private root, `pm-policy deactivate` moves them back to the
//! public root. Flags and permission sets are kept, so activating again
//! restores the previous state. Safe to re-run after an interruption.

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing::info;

use pm_server::{api, config, db, hooks::HookChain};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pm_server=info".into()),
        )
        .init();

    let make_private = match std::env::args().nth(1).as_deref() {
        Some("activate") => true,
        Some("deactivate") => false,
        _ => bail!("Usage: pm-policy <activate|deactivate>"),
    };

    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;
    if !config.has_database() {
        bail!("DATABASE_URL must be set; the in-memory store holds no attachments");
    }

    let store = db::open_store(&config).await?;
    let state = api::AppState::load(config.clone(), store, HookChain::new()).await;

    if make_private {
        state
            .media
            .maybe_setup_directories()
            .await
            .with_context(|| {
                format!(
                    "could not set up the private uploads directory {}",
                    config.private_dir.display()
                )
            })?;
    }

    let report = state.media.apply_policy(make_private).await?;
    info!(
        attachments = report.attachments,
        moved = report.moved,
        failed = ?report.failed,
        "Done"
    );

    Ok(if report.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
