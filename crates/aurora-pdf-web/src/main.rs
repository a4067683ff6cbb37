//! AuroraPDF Web - HTTP service for merging, splitting and rotating PDF documents.

mod artifact_store;
mod helpers;
mod routes;
mod state;

use anyhow::{Context, Result};
use aurora_pdf_core::AppConfig;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, header};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use state::AppState;

/// Headroom for multipart framing and text fields on top of the file bytes.
const FORM_OVERHEAD: usize = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "aurora-pdf-web")]
#[command(author, version, about = "AuroraPDF Web Server", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "AURORA_PDF_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(short, long, env = "AURORA_PDF_PORT", default_value = "3000")]
    port: u16,

    /// Config file path
    #[arg(short, long, env = "AURORA_PDF_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Largest request body the limits allow: every file at full size.
fn body_limit(config: &AppConfig) -> usize {
    let per_file = usize::try_from(config.limits.max_file_size).unwrap_or(usize::MAX);
    per_file
        .saturating_mul(config.limits.max_files)
        .saturating_add(FORM_OVERHEAD)
}

/// Periodically drop finished jobs older than `retention`, with their artifacts.
fn spawn_sweeper(state: Arc<AppState>, every: Duration, retention: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            state.expire(retention).await;
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    let limit = body_limit(&config);
    let sweep_secs = config.jobs.sweep_interval_secs;
    let retention = Duration::from_secs(config.jobs.retention_secs);
    let state = Arc::new(AppState::new(config));

    if sweep_secs > 0 {
        info!(
            "Sweeping jobs finished more than {}s ago every {}s",
            retention.as_secs(),
            sweep_secs
        );
        spawn_sweeper(Arc::clone(&state), Duration::from_secs(sweep_secs), retention);
    }

    let app = routes::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max(limit))
            .layer(CompressionLayer::new())
            // API responses are per-request results, never cache them
            .layer(SetResponseHeaderLayer::if_not_present(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, max-age=0"),
            )),
    );

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_covers_full_batch() {
        let mut config = AppConfig::default();
        config.limits.max_file_size = 10;
        config.limits.max_files = 3;
        assert_eq!(body_limit(&config), 30 + FORM_OVERHEAD);

        config.limits.max_file_size = u64::MAX;
        assert_eq!(body_limit(&config), usize::MAX);
    }

    #[test]
    fn test_args_from_command_line() {
        let args = Args::try_parse_from(["aurora-pdf-web", "--port", "8080", "-vv"]).unwrap();
        assert_eq!(args.port, 8080);
        assert_eq!(args.verbose, 2);
        assert!(args.config.is_none());
    }
}
