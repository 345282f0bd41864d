//! Minimal upstream for trying the balancer locally.
//!
//! ```text
//! DEMO_PORT=8081 cargo run --bin demo-backend
//! ```

use anyhow::Context;
use axum::{extract::State, Router};
use tokio::net::TcpListener;
use tracing::info;

async fn greet(State(port): State<u16>) -> String {
    format!("All Good! from server {}.", port)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let port: u16 = match std::env::var("DEMO_PORT") {
        Ok(raw) => raw.parse().with_context(|| format!("Invalid DEMO_PORT '{}'", raw))?,
        Err(_) => 8081,
    };

    let app = Router::new().fallback(greet).with_state(port);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind demo backend on port {}", port))?;

    info!(port, "Demo backend listening");
    axum::serve(listener, app).await.context("Demo backend failed")?;
    Ok(())
}
