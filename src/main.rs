// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::EnvFilter;

use crate::application::comparison_service::ComparisonService;
use crate::application::site_service::SiteService;
use crate::infrastructure::config::{load_app_config, load_sites_config};
use crate::infrastructure::http_repository::HttpSensorRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let app_config = load_app_config().context("Failed to load config/app")?;
    let sites = load_sites_config().context("Failed to load config/sites")?;
    let settings = app_config.comparison_settings()?;

    // Create repository (infrastructure layer)
    let repository = Arc::new(HttpSensorRepository::new(&app_config.upstream)?);

    // Create services (application layer)
    let site_service = SiteService::new(sites);
    let comparison_service = ComparisonService::new(repository, settings);

    let state = Arc::new(AppState {
        site_service,
        comparison_service,
    });

    let router = build_router(state);

    let addr: SocketAddr = app_config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", app_config.server.bind))?;
    tracing::info!(
        "Starting mh-level-compare on {} against {}",
        addr,
        app_config.upstream.base_url
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
