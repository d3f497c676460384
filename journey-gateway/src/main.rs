use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use journey_gateway::cache::{CacheConfig, CachedPlanner};
use journey_gateway::config::GatewayConfig;
use journey_gateway::providers::ConnectorRegistry;
use journey_gateway::scenario::Orchestrator;
use journey_gateway::web::{AppState, create_router};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "journey gateway stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::from_env()?;

    // Place lookups are shared between requests through the cache.
    let registry = ConnectorRegistry::with_builtins();
    let coverage = registry.build_coverage(&config.coverage)?;
    let cache_config = CacheConfig {
        ttl: config.cache_ttl(),
        max_capacity: config.cache.max_capacity,
    };
    let planner = CachedPlanner::new(coverage.planner(), &cache_config);
    let coverage = coverage.with_planner(Arc::new(planner));

    let state = AppState::new(Orchestrator::new(coverage, &config));
    let app = create_router(state);

    let addr: SocketAddr = config.bind.parse()?;
    info!(%addr, pool_size = config.future_pool_size, "journey gateway listening");
    info!("  GET  /health");
    info!("  POST /journeys");
    info!("  POST /isochrones");
    info!("  POST /graphical_isochrones");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
