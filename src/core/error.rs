//! # Error Handling Module
//!
//! Every failure the balancer can produce is a variant of [`BalancerError`], built with
//! `thiserror`. Routing and selection failures travel synchronously back to the serving
//! layer, where `IntoResponse` turns them into HTTP responses with a matching status code.
//! Probe failures never leave the health checker.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the balancer
pub type BalancerResult<T> = Result<T, BalancerError>;

/// Error taxonomy for the routing and balancing engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalancerError {
    /// Malformed or empty configuration; fatal at startup
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No route matcher is a prefix of the request path
    #[error("Could not find a matcher for path '{path}'")]
    NoRoute { path: String },

    /// Every replica of the matched route failed liveness at selection time
    #[error("Service '{service}' unavailable: checked all {checked} servers, none of them is available")]
    AllServersDown { service: String, checked: usize },

    /// The selected replica's transport failed after selection
    #[error("Forwarding to '{server}' failed: {message}")]
    Forward { server: String, message: String },

    /// A reachability probe failed. Recovered inside the health checker.
    #[error("Probe of '{address}' failed: {reason}")]
    Probe { address: String, reason: String },

    /// I/O errors (config file reads, listener binds)
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl BalancerError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn no_route<S: Into<String>>(path: S) -> Self {
        Self::NoRoute { path: path.into() }
    }

    pub fn all_servers_down<S: Into<String>>(service: S, checked: usize) -> Self {
        Self::AllServersDown {
            service: service.into(),
            checked,
        }
    }

    pub fn forward<S: Into<String>, M: Into<String>>(server: S, message: M) -> Self {
        Self::Forward {
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn probe<S: Into<String>, R: Into<String>>(address: S, reason: R) -> Self {
        Self::Probe {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Get the HTTP status code the serving layer should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoRoute { .. } => StatusCode::NOT_FOUND,
            Self::AllServersDown { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Forward { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration { .. }
            | Self::Probe { .. }
            | Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::NoRoute { .. } => "no_route",
            Self::AllServersDown { .. } => "all_servers_down",
            Self::Forward { .. } => "forward_error",
            Self::Probe { .. } => "probe_error",
            Self::Io { .. } => "io_error",
        }
    }
}

impl From<std::io::Error> for BalancerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Lets axum handlers return `BalancerResult<Response>` directly.
impl IntoResponse for BalancerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
