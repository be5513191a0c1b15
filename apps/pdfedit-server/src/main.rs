//! pdfedit server
//!
//! Accepts a PDF upload with text edits and annotations authored in a browser
//! viewer and returns the edited document.
//!
//! ## Endpoints
//!
//! - `GET /health`
//! - `POST /api/pdf/apply-edits` (multipart: `file`, `textEdits`,
//!   `textAnnotations`, `rectAnnotations`)
//!
//! Editing is CPU bound and synchronous, so each request runs on the blocking
//! pool under a deadline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use pdfedit_core::{EditPipeline, PipelineConfig};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;

use api::{handle_apply_edits, handle_health};

/// Command-line arguments for the pdfedit server
#[derive(Parser, Debug)]
#[command(name = "pdfedit-server")]
#[command(about = "Applies text edits and annotations to uploaded PDFs")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Per-request edit deadline in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Maximum upload size in MiB
    #[arg(long, default_value = "32")]
    max_upload_mb: usize,

    /// Points added around each cover rectangle
    #[arg(long, default_value = "3.0")]
    padding: f64,

    /// Viewer zoom assumed when an edit does not report one
    #[arg(long, default_value = "1.3")]
    default_scale: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_padding(self.padding)
            .with_default_scale(self.default_scale)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<EditPipeline>,
    /// Edit deadline in milliseconds
    pub timeout_ms: u64,
}

impl AppState {
    pub fn new(config: PipelineConfig, timeout_ms: u64) -> Self {
        Self {
            pipeline: Arc::new(EditPipeline::new(config)),
            timeout_ms,
        }
    }
}

/// Build the router with all middleware applied.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/pdf/apply-edits", post(handle_apply_edits))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pdfedit server on {}:{}", args.host, args.port);

    let config = args.pipeline_config();
    info!(
        "Cover padding: {}pt, default scale: {}",
        config.padding, config.default_scale
    );
    let state = AppState::new(config, args.timeout_ms);
    let router = app(state, args.max_upload_mb * 1024 * 1024);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Edit timeout: {}ms", args.timeout_ms);
    info!("Upload limit: {} MiB", args.max_upload_mb);

    axum::serve(listener, router).await?;

    Ok(())
}
