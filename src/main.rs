//! # Route Balancer - Main Entry Point
//!
//! Loads the YAML configuration named by `BALANCER_CONFIG_PATH`, builds the router, starts
//! the health checker in the background and serves until SIGINT or SIGTERM.

use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use route_balancer::observability::{init_logging, init_metrics};
use route_balancer::{BalancerConfig, BalancerResult, BalancerServer, HealthChecker, Router};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Failed to start balancer: {}", e);
        eprintln!("route-balancer: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> BalancerResult<()> {
    let config_path = std::env::var("BALANCER_CONFIG_PATH")
        .unwrap_or_else(|_| "config/balancer.yaml".to_string());

    let config = BalancerConfig::load_from_file(&config_path).await?;

    init_logging(&config.logging)?;
    init_metrics(&config.metrics, &config.server.bind_address)?;

    info!(version = env!("CARGO_PKG_VERSION"), config = %config_path, "Starting route balancer");

    let router = Arc::new(Router::from_config(&config)?);
    let shutdown = CancellationToken::new();

    let checker = HealthChecker::new(router.servers(), &config.health_check)?;
    let checker_handle = checker.spawn(shutdown.clone());

    let server = BalancerServer::new(router, &config.server)?;
    let server_shutdown = shutdown.clone();
    let mut server_handle = tokio::spawn(server.serve(server_shutdown));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining in-flight requests");
            shutdown.cancel();
            match (&mut server_handle).await {
                Ok(result) => result?,
                Err(e) => error!("Server task failed: {}", e),
            }
        }
        result = &mut server_handle => {
            shutdown.cancel();
            match result {
                Ok(result) => result?,
                Err(e) => error!("Server task failed: {}", e),
            }
        }
    }

    if let Err(e) = checker_handle.await {
        error!("Health checker task failed: {}", e);
    }

    info!("Route balancer shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
