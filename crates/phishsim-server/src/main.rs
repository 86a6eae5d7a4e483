//! PhishSim - Server entry point

use anyhow::{Context, Result};
use phishsim_api::AppState;
use phishsim_common::config::{Config, LoggingConfig};
use phishsim_core::{
    CampaignDispatcher, DispatchSupervisor, Metrics, SmtpTransport, TemplateRenderer,
};
use phishsim_storage::{DatabasePool, MemoryStore, Repositories};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How long in-flight dispatch passes may run after the listener stops
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PHISHSIM_CONFIG").ok())
        .map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting PhishSim server...");

    let repos = match config.database.backend.as_str() {
        "memory" => {
            warn!("Using the in-memory backend; campaigns are lost on restart");
            Repositories::memory(Arc::new(MemoryStore::new()))
        }
        _ => {
            let db_pool = DatabasePool::new(&config.database).await?;
            info!("Database connection established");

            db_pool.migrate().await?;
            info!("Database migrations completed");

            Repositories::postgres(db_pool)
        }
    };

    let metrics = Metrics::new().context("Failed to register metrics")?;
    let transport = SmtpTransport::new(&config.smtp).context("Failed to configure SMTP relay")?;
    info!(host = %config.smtp.host, port = config.smtp.port, "SMTP relay configured");

    let dispatcher = CampaignDispatcher::new(
        &repos,
        TemplateRenderer::new(config.tracking.base_url()),
        Arc::new(transport),
        metrics.clone(),
    );
    let supervisor = DispatchSupervisor::new(
        dispatcher,
        config.tracking.send_interval(),
        config.tracking.dispatch_queue_depth,
    );

    if config.api.keys.is_empty() {
        warn!("No API keys configured; the operator API will reject every request");
    }

    let state = AppState::new(repos, supervisor.clone(), metrics, config.api.keys.clone())
        .context("Failed to load landing page template")?;
    let app = phishsim_api::create_router(state, &config.api);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        %addr,
        public_base_url = %config.tracking.base_url(),
        "PhishSim server started successfully"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Waiting for active dispatches to finish");
    if tokio::time::timeout(SHUTDOWN_GRACE, supervisor.wait_idle())
        .await
        .is_err()
    {
        warn!(
            active = supervisor.active_workers().await,
            "Dispatches still running at shutdown; unsent targets remain unsent"
        );
    }

    info!("PhishSim server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
