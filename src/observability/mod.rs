// Active health checks driving server liveness
pub mod health;

// Structured logging
pub mod logging;

// Prometheus exporter
pub mod metrics;

// Re-export commonly used types for convenience
pub use health::{HealthChecker, HealthProbe, TcpProbe};
pub use logging::init_logging;
pub use metrics::init_metrics;
