//! hls-drop server binary
//!
//! Reads `HLS_DROP_*` settings from the environment (and `.env` if present)
//! and serves until SIGTERM/SIGINT.

use hls_drop::Config;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hls_drop=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if config.server.api.upload_password.is_none() {
        tracing::warn!("HLS_DROP_UPLOAD_PASSWORD is not set; every upload will be rejected");
    }
    tracing::info!(
        upload_dir = ?config.upload_dir(),
        address = %config.server.api.bind_address,
        "starting hls-drop"
    );

    match hls_drop::run_until_signal(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server exited with error");
            ExitCode::FAILURE
        }
    }
}
