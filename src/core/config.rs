//! # Configuration Module
//!
//! YAML configuration for the balancer, parsed with serde. A config lists services, each with
//! a path-prefix matcher, an optional strategy name and its replicas:
//!
//! ```yaml
//! strategy: RoundRobin
//! services:
//!   - name: "users"
//!     matcher: "/api/v1"
//!     strategy: WeightedRoundRobin
//!     replicas:
//!       - url: localhost:8081
//!         metadata:
//!           weight: 10
//!       - url: localhost:8082
//! ```
//!
//! Environment variables override a handful of operational settings after parsing, then the
//! whole config is validated in one pass so every problem is reported at once.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::core::error::{BalancerError, BalancerResult};

/// Complete balancer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Active health check settings
    #[serde(default)]
    pub health_check: HealthCheckSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Default strategy for services that do not name one
    #[serde(default)]
    pub strategy: Option<String>,

    /// Service definitions, in declaration order
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl BalancerConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> BalancerResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            BalancerError::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_yaml_str(content: &str) -> BalancerResult<Self> {
        let mut config: BalancerConfig = serde_yaml::from_str(content)
            .map_err(|e| BalancerError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Variables follow the pattern `BALANCER_<FIELD>`, e.g. `BALANCER_PORT=9000`.
    pub fn apply_env_overrides(&mut self) -> BalancerResult<()> {
        use std::env;

        if let Ok(port) = env::var("BALANCER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| BalancerError::config(format!("Invalid BALANCER_PORT: {}", e)))?;
        }

        if let Ok(addr) = env::var("BALANCER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Ok(level) = env::var("BALANCER_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("BALANCER_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(interval) = env::var("BALANCER_HEALTH_INTERVAL") {
            self.health_check.interval = humantime::parse_duration(&interval).map_err(|e| {
                BalancerError::config(format!("Invalid BALANCER_HEALTH_INTERVAL: {}", e))
            })?;
        }

        if let Ok(timeout) = env::var("BALANCER_HEALTH_TIMEOUT") {
            self.health_check.timeout = humantime::parse_duration(&timeout).map_err(|e| {
                BalancerError::config(format!("Invalid BALANCER_HEALTH_TIMEOUT: {}", e))
            })?;
        }

        Ok(())
    }

    /// Validate the configuration, collecting every problem into one error
    pub fn validate(&self) -> BalancerResult<()> {
        let mut errors = Vec::new();

        if self.services.is_empty() {
            errors.push("At least one service must be configured".to_string());
        }

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        let mut matchers = HashSet::new();
        for (index, service) in self.services.iter().enumerate() {
            if service.name.trim().is_empty() {
                errors.push(format!("Service {} has an empty name", index));
            }

            if !service.matcher.starts_with('/') {
                errors.push(format!(
                    "Service '{}' matcher '{}' must start with '/'",
                    service.name, service.matcher
                ));
            } else if !matchers.insert(service.matcher.as_str()) {
                warn!(
                    service = %service.name,
                    matcher = %service.matcher,
                    "Duplicate matcher, the service declared first wins"
                );
            }

            if service.replicas.is_empty() {
                errors.push(format!("Service '{}' has no replicas", service.name));
            }

            for replica in &service.replicas {
                if replica.url.trim().is_empty() {
                    errors.push(format!("Service '{}' has a replica with an empty url", service.name));
                }
            }
        }

        if self.health_check.interval.is_zero() {
            errors.push("health_check.interval must be greater than 0".to_string());
        }

        if self.health_check.timeout.is_zero() {
            errors.push("health_check.timeout must be greater than 0".to_string());
        }

        // A probe must finish before the next round for the same server starts
        if !self.health_check.interval.is_zero()
            && self.health_check.timeout >= self.health_check.interval
        {
            errors.push(format!(
                "health_check.timeout ({:?}) must be shorter than health_check.interval ({:?})",
                self.health_check.timeout, self.health_check.interval
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.logging.level)),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "text" => {}
            _ => errors.push(format!("Invalid log format: {}", self.logging.format)),
        }

        if !errors.is_empty() {
            return Err(BalancerError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }

    /// Strategy name for a service: its own, then the top-level default
    pub fn strategy_for<'a>(&'a self, service: &'a ServiceConfig) -> Option<&'a str> {
        service.strategy.as_deref().or(self.strategy.as_deref())
    }
}

/// One routed service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Human-readable identifier for logging
    pub name: String,

    /// Path prefix selecting this service
    pub matcher: String,

    /// Balancing strategy name (case-sensitive)
    #[serde(default)]
    pub strategy: Option<String>,

    pub replicas: Vec<ReplicaConfig>,
}

/// One replica of a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    pub url: String,

    /// Integer metadata such as `weight`
    #[serde(default)]
    pub metadata: HashMap<String, i64>,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Connect timeout used when relaying to replicas
    #[serde(default = "default_upstream_connect_timeout", with = "humantime_serde")]
    pub upstream_connect_timeout: Duration,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_upstream_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            upstream_connect_timeout: default_upstream_connect_timeout(),
        }
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSettings {
    /// Time between probe rounds
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Connect timeout for one probe
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_health_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            timeout: default_health_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}
