//! Overseer UI server - web console for driving a remote autonomous agent.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use overseer::driver::Synchronizer;
use overseer::io::client::HttpControlSurface;
use overseer::io::config::load_config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "overseer-ui")]
#[command(about = "Web console for a remote autonomous agent")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Agent base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Path to the TOML config file
    #[arg(long, default_value = "overseer.toml")]
    config: PathBuf,

    /// Observe a task that is already running instead of starting fresh
    #[arg(long)]
    attach: bool,

    /// Directory containing UI static files (defaults to ./ui/dist)
    #[arg(long)]
    ui_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("overseer_ui=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
        config.validate().context("validate --base-url")?;
    }
    info!(base_url = %config.base_url, attach = args.attach, "starting overseer-ui");

    let surface = HttpControlSurface::new(config.base_url.clone(), config.request_timeout())
        .context("build http client")?;
    let handle = if args.attach {
        Synchronizer::attach(surface, config)
    } else {
        Synchronizer::spawn(surface, config)
    };
    let state = AppState::new(handle);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state.clone());

    let ui_dir = args.ui_dir.unwrap_or_else(|| PathBuf::from("ui").join("dist"));
    if ui_dir.exists() {
        info!(ui_dir = %ui_dir.display(), "serving static UI files");
        app = app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));
    } else {
        info!(ui_dir = %ui_dir.display(), "UI directory not found, API-only mode");
    }

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

/// Resolves on ctrl-c after stopping the synchronizer, which also ends open SSE streams.
async fn shutdown_signal(state: AppState) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
    }
    info!("shutting down");
    state.sync.shutdown();
}
