//! # Health Checking System
//!
//! Keeps every server's liveness flag in line with its reachability. A single background
//! task ticks at a fixed interval and fans out one probe task per server, so a hanging probe
//! never delays the others or request traffic. A server whose previous probe is still running
//! is skipped for that tick, so results for one server are applied in the order the probes
//! started. A probe is a plain TCP connect bounded by a timeout. Failures flip one flag and
//! produce a log line; nothing is escalated.
//!
//! ## Rust Concepts Used
//! - `async_trait` for the pluggable [`HealthProbe`]
//! - `tokio::time::interval` for the probe schedule
//! - `CancellationToken` from `tokio-util` to stop the loop on shutdown

use async_trait::async_trait;
use futures::future::join_all;
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::HealthCheckSettings;
use crate::core::error::{BalancerError, BalancerResult};
use crate::core::server::Server;

/// Reachability check against one address
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Succeed when `address` is reachable within `timeout`
    async fn probe(&self, address: &str, timeout: Duration) -> BalancerResult<()>;

    /// Get the probe type name
    fn probe_type(&self) -> &'static str;
}

/// Considers a server healthy if a TCP connection to its `host:port` opens in time
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self, address: &str, limit: Duration) -> BalancerResult<()> {
        match timeout(limit, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(BalancerError::probe(address, e.to_string())),
            Err(_) => Err(BalancerError::probe(
                address,
                format!("connect timed out after {:?}", limit),
            )),
        }
    }

    fn probe_type(&self) -> &'static str {
        "tcp"
    }
}

/// A checked server and whether a probe of it is currently running
struct ProbeTarget {
    server: Arc<Server>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a probe task finishes, panics included
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn record_alive(targets: &[ProbeTarget]) -> usize {
    let alive = targets.iter().filter(|t| t.server.is_alive()).count();
    gauge!("balancer_servers_alive").set(alive as f64);
    alive
}

/// Periodically probes servers and updates their liveness
pub struct HealthChecker {
    targets: Arc<[ProbeTarget]>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    timeout: Duration,
}

impl HealthChecker {
    /// Create a checker over `servers`. Fails when there is nothing to check.
    pub fn new(servers: Vec<Arc<Server>>, settings: &HealthCheckSettings) -> BalancerResult<Self> {
        if servers.is_empty() {
            return Err(BalancerError::config(
                "A server list expected for health checking, got an empty list",
            ));
        }

        let targets = servers
            .into_iter()
            .map(|server| ProbeTarget {
                server,
                in_flight: AtomicBool::new(false),
            })
            .collect();

        Ok(Self {
            targets,
            probe: Arc::new(TcpProbe),
            interval: settings.interval,
            timeout: settings.timeout,
        })
    }

    /// Replace the probe implementation
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Probe one server and record the outcome, returning its new liveness
    pub async fn check_server(server: &Server, probe: &dyn HealthProbe, limit: Duration) -> bool {
        match probe.probe(server.address(), limit).await {
            Ok(()) => {
                let was_alive = server.set_liveness(true);
                if !was_alive {
                    counter!("balancer_liveness_transitions_total", "to" => "live").increment(1);
                    info!(
                        server = %server.address(),
                        "Transitioning server from Unavailable to Live state"
                    );
                }
                debug!(server = %server.address(), probe = probe.probe_type(), "Server is reachable");
                true
            }
            Err(e) => {
                error!(server = %server.address(), error = %e, "Could not connect to the server");
                let was_alive = server.set_liveness(false);
                if was_alive {
                    counter!("balancer_liveness_transitions_total", "to" => "unavailable").increment(1);
                    warn!(
                        server = %server.address(),
                        "Transitioning server from Live to Unavailable state"
                    );
                }
                false
            }
        }
    }

    /// Probe every server concurrently and wait for the whole round
    pub async fn check_all(&self) -> usize {
        let checks = self
            .targets
            .iter()
            .map(|target| Self::check_server(&target.server, self.probe.as_ref(), self.timeout));

        join_all(checks).await;
        record_alive(&self.targets)
    }

    /// Spawn one detached probe task per server that has no probe running
    fn spawn_round(&self) {
        for (index, target) in self.targets.iter().enumerate() {
            if target.in_flight.swap(true, Ordering::AcqRel) {
                debug!(
                    server = %target.server.address(),
                    "Previous probe still running, skipping this round"
                );
                continue;
            }

            let targets = self.targets.clone();
            let probe = self.probe.clone();
            let limit = self.timeout;

            tokio::spawn(async move {
                let target = &targets[index];
                let _guard = InFlightGuard(&target.in_flight);
                Self::check_server(&target.server, probe.as_ref(), limit).await;
                record_alive(&targets);
            });
        }
    }

    /// Run the probe loop until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            servers = self.targets.len(),
            interval = ?self.interval,
            timeout = ?self.timeout,
            "Starting the health checker"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Health checker stopped");
                    return;
                }
                _ = ticker.tick() => self.spawn_round(),
            }
        }
    }

    /// Start the probe loop as a background task
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
