//! Analytics Server - Main entry point
//!
//! Consumes warehouse events from Kafka into Postgres and serves aggregate
//! metrics over HTTP.

use std::sync::Arc;

use wms_analytics_core::{
    bus::KafkaBus,
    config::Config,
    service::AnalyticsService,
    store::PgEventStore,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    // Initialize telemetry
    telemetry::init_logging(&config.logging)?;
    telemetry::init_metrics()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        app_name = %config.server.app_name,
        "Starting Analytics Server"
    );

    // Connect to the event store
    let store = PgEventStore::connect(&config.database).await?;
    store.migrate().await?;

    // Subscribe to the event topic
    let bus = KafkaBus::new(&config.bus)?;

    let mut service = AnalyticsService::new(config.clone(), Arc::new(store));
    service.start(Box::new(bus))?;

    // Start server
    let addr = config.server.bind_addr();
    tracing::info!(address = %addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let served = service.serve(listener, shutdown_signal()).await;

    // Cleanup
    service.shutdown().await;
    served?;
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
