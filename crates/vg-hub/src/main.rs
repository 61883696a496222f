use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vg_core::{AlertRecord, LogRecord};
use vg_store::{EventStore, MemoryStore};

mod api;
mod config;
mod error;
mod ingest;
mod query;
mod simulate;

use config::Config;
use query::QueryEngine;

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "vg-hub", version, about = "VIGIL Telemetry Query Hub")]
struct Args {
    /// Server bind address (overrides the config file)
    #[arg(long)]
    bind: Option<String>,

    /// Path to config file
    #[arg(long, default_value = "vg-hub.toml")]
    config: PathBuf,
}

// =============================================================================
// Application State
// =============================================================================

pub struct AppState {
    pub alerts: Arc<dyn EventStore<AlertRecord>>,
    pub logs: Arc<dyn EventStore<LogRecord>>,
    pub engine: QueryEngine,
    pub start_time: Instant,
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(api::status))
        .route("/api/simulate", post(api::simulate))
        .route("/api/v1/alerts/recent", get(api::query_alerts))
        .route("/api/v1/alerts/query", get(api::query_alerts))
        .route("/api/v1/alerts/push", post(api::push_alerts))
        .route("/api/v1/logs/query", get(api::query_logs))
        .route("/api/v1/logs/push", post(api::push_logs))
        .route("/api/v1/fields/:entity", get(api::list_fields))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "vg_hub=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config);
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    let alerts = Arc::new(MemoryStore::<AlertRecord>::new());
    let logs = Arc::new(MemoryStore::<LogRecord>::new());
    let state = Arc::new(AppState {
        alerts: alerts.clone(),
        logs: logs.clone(),
        engine: QueryEngine::new(config.query.clone()),
        start_time: Instant::now(),
    });

    let app = router(state);

    let addr: SocketAddr = match bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {}", bind, e);
            std::process::exit(1);
        }
    };
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("  VIGIL v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Status:     http://{}/api/status", addr);
    tracing::info!("  Alerts:     http://{}/api/v1/alerts/query", addr);
    tracing::info!("  Logs:       http://{}/api/v1/logs/query", addr);
    tracing::info!("  Config:     {:?}", args.config);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    alerts.close();
    logs.close();
    tracing::info!("VIGIL stopped");
}
