//! # Route Balancer Library
//!
//! A reverse-proxy load balancer. Inbound requests are routed to a service by longest
//! path-prefix match, a balancing strategy picks a live replica of that service, and the
//! request is forwarded to it. A background health checker keeps replica liveness current.
//!
//! Control flow for one request:
//!
//! ```text
//! Router::resolve(path) -> Route -> Route::next_server() -> Server -> Server::forward(request)
//! ```

/// Error types, configuration and the backend server model
pub mod core;

/// Axum front end wiring requests into the routing engine
pub mod gateway;

/// Balancing strategies: round-robin and weighted round-robin
pub mod load_balancing;

/// Path-prefix routing of requests to services
pub mod routing;

/// Health checking, logging and metrics
pub mod observability;

pub use core::config::BalancerConfig;
pub use core::error::{BalancerError, BalancerResult};
pub use core::server::{Forwarder, HttpForwarder, Server};
pub use gateway::server::BalancerServer;
pub use load_balancing::{BalancingStrategy, StrategyKind};
pub use observability::health::HealthChecker;
pub use routing::router::{Route, Router};
