mod api;
mod bridge;
mod manager;
mod sink;
mod types;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wayfarer::{AutomationDriver, Engine, EngineConfig, HttpContextMirror, VisualDriver};

use bridge::{RemoteDriver, RemotePlanner};
use manager::TaskManager;
use sink::FsCaptureSink;

#[derive(Parser, Debug)]
#[command(name = "wayfarer-server")]
#[command(about = "HTTP boundary for the wayfarer execution engine")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8088")]
    port: u16,

    /// Enable CORS for all origins
    #[arg(long)]
    cors: bool,

    /// Automation driver endpoint (layer 1)
    #[arg(long, env = "WAYFARER_DRIVER_URL")]
    driver_url: String,

    /// Recovery driver endpoint (layer 2); defaults to the primary driver
    #[arg(long, env = "WAYFARER_RECOVERY_URL")]
    recovery_url: Option<String>,

    /// Visual analysis endpoint (layer 3); defaults to the primary driver
    #[arg(long, env = "WAYFARER_VISUAL_URL")]
    visual_url: Option<String>,

    /// Step planner endpoint
    #[arg(long, env = "WAYFARER_PLANNER_URL")]
    planner_url: String,

    /// Directory captures are written under
    #[arg(long, default_value = "./captures")]
    capture_dir: PathBuf,

    /// Engine configuration file (JSON); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Remote context mirror endpoint
    #[arg(long, env = "WAYFARER_MIRROR_URL")]
    mirror_url: Option<String>,

    /// Bearer token for the context mirror
    #[arg(long, env = "WAYFARER_MIRROR_TOKEN")]
    mirror_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚀 Starting wayfarer-server v{}", env!("CARGO_PKG_VERSION"));
    info!("🔧 Port: {}", args.port);
    info!("🔧 CORS: {}", if args.cors { "enabled" } else { "disabled" });

    // Load engine configuration
    let config: EngineConfig = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    // The cascade applies its own per-strategy deadlines; the client timeout
    // only has to outlast the slowest single driver call.
    let driver_timeout = Duration::from_millis(
        config.executor.strategy_timeout_ms + config.executor.quiescence_timeout_ms,
    );
    let planner_timeout = Duration::from_millis(config.orchestrator.planner_timeout_ms + 1_000);
    let mirror_timeout = Duration::from_millis(config.store.mirror_timeout_ms);

    // Wire the capability endpoints into the engine
    let primary = Arc::new(RemoteDriver::new(&args.driver_url, driver_timeout)?);
    let recovery: Arc<dyn AutomationDriver> = match &args.recovery_url {
        Some(url) => Arc::new(RemoteDriver::new(url, driver_timeout)?),
        None => primary.clone(),
    };
    let visual: Arc<dyn VisualDriver> = match &args.visual_url {
        Some(url) => Arc::new(RemoteDriver::new(url, driver_timeout)?),
        None => primary.clone(),
    };
    let planner = Arc::new(RemotePlanner::new(&args.planner_url, planner_timeout)?);

    info!("🔧 Driver endpoint: {}", args.driver_url);
    info!("🔧 Planner endpoint: {}", args.planner_url);
    info!("🔧 Capture directory: {}", args.capture_dir.display());

    let mut engine = Engine::new(primary, recovery, visual, planner, config)
        .with_sink(Arc::new(FsCaptureSink::new(&args.capture_dir)));

    if let Some(mirror_url) = &args.mirror_url {
        let mirror =
            HttpContextMirror::new(mirror_url.clone(), args.mirror_token.clone(), mirror_timeout)?;
        engine = engine.with_mirror(Arc::new(mirror));
        info!("🔧 Context mirror: {}", mirror_url);
    }

    let manager = Arc::new(TaskManager::new(Arc::new(engine)));
    info!("✅ TaskManager initialized");

    // Build router
    let mut app = Router::new()
        .route("/health", get(api::health))
        .route("/tasks", post(api::submit_task))
        .route("/tasks/{id}", get(api::get_task).delete(api::cancel_task))
        .with_state(manager)
        .layer(TraceLayer::new_for_http());

    // Add CORS if enabled
    if args.cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    // Start server
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("✅ Server listening on http://{}", addr);
    info!("🧭 Ready to run tasks");

    axum::serve(listener, app).await?;

    Ok(())
}
