//! # HTTP Server Module
//!
//! Thin serving layer over the routing engine, built on Axum. Every request goes through a
//! single fallback handler: resolve the route, ask its strategy for a live server, forward.
//! Typed failures become responses through `BalancerError`'s `IntoResponse`:
//! unmatched paths answer 404, fully-down services 503, upstream transport errors 502.

use axum::{
    extract::{Request, State},
    response::Response,
    Router as AxumRouter,
};
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::core::config::ServerSettings;
use crate::core::error::{BalancerError, BalancerResult};
use crate::routing::Router;

/// Shared state handed to the request handler
#[derive(Clone)]
struct ServerState {
    router: Arc<Router>,
}

/// The balancer's HTTP front end
pub struct BalancerServer {
    router: Arc<Router>,
    bind_addr: SocketAddr,
}

impl BalancerServer {
    pub fn new(router: Arc<Router>, settings: &ServerSettings) -> BalancerResult<Self> {
        let bind_addr = format!("{}:{}", settings.bind_address, settings.port)
            .parse()
            .map_err(|e| BalancerError::config(format!("Invalid bind address: {}", e)))?;

        Ok(Self { router, bind_addr })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Build the Axum application
    pub fn app(&self) -> AxumRouter {
        AxumRouter::new()
            .fallback(handle_request)
            .with_state(ServerState {
                router: self.router.clone(),
            })
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Bind the configured address and serve until `shutdown` is cancelled
    pub async fn serve(self, shutdown: CancellationToken) -> BalancerResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            BalancerError::config(format!("Failed to bind balancer to {}: {}", self.bind_addr, e))
        })?;

        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(self, listener: TcpListener, shutdown: CancellationToken) -> BalancerResult<()> {
        let local_addr = listener.local_addr()?;
        info!(%local_addr, routes = self.router.routes().len(), "Balancer listening");

        axum::serve(listener, self.app())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Balancer stopped accepting requests");
        Ok(())
    }
}

/// Resolve → select → forward
#[instrument(skip(state, request), fields(method = %request.method(), path = %request.uri().path()))]
async fn handle_request(State(state): State<ServerState>, request: Request) -> BalancerResult<Response> {
    let result = proxy(&state.router, request).await;

    let outcome = match &result {
        Ok(_) => "forwarded",
        Err(e) => {
            warn!(error = %e, "Request failed");
            e.error_type()
        }
    };
    counter!("balancer_requests_total", "outcome" => outcome).increment(1);

    result
}

async fn proxy(router: &Router, request: Request) -> BalancerResult<Response> {
    let route = router.resolve(request.uri().path())?;
    let server = route.next_server()?;

    info!(service = %route.name(), server = %server.address(), "Forwarding request");
    server.forward(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_bind_address() {
        let router = Arc::new(Router::new(vec![]));
        let settings = ServerSettings {
            bind_address: "not-an-ip".to_string(),
            ..ServerSettings::default()
        };
        assert!(BalancerServer::new(router, &settings).is_err());
    }

    #[test]
    fn test_bind_addr_from_settings() {
        let router = Arc::new(Router::new(vec![]));
        let settings = ServerSettings {
            bind_address: "127.0.0.1".to_string(),
            port: 9999,
            ..ServerSettings::default()
        };
        let server = BalancerServer::new(router, &settings).unwrap();
        assert_eq!(server.bind_addr().to_string(), "127.0.0.1:9999");
    }
}
