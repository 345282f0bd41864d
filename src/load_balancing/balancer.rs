//! # Load Balancer Module
//!
//! The set of balancing algorithms is closed and known at compile time, so strategies are a
//! plain enum rather than trait objects. Resolving a strategy from its configured name is a
//! pure function ([`StrategyKind::from_name`]); unknown names fall back to round-robin with a
//! warning instead of failing construction.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! let strategy = BalancingStrategy::from_name(Some("WeightedRoundRobin"));
//! let server = strategy.next("users", &servers)?;
//! ```

use metrics::counter;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::error::BalancerResult;
use crate::core::server::Server;
use crate::load_balancing::strategies::{RoundRobin, WeightedRoundRobin};

pub const ROUND_ROBIN: &str = "RoundRobin";
pub const WEIGHTED_ROUND_ROBIN: &str = "WeightedRoundRobin";

/// Known strategy names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    RoundRobin,
    WeightedRoundRobin,
}

impl StrategyKind {
    /// Case-sensitive lookup of a strategy name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            ROUND_ROBIN => Some(Self::RoundRobin),
            WEIGHTED_ROUND_ROBIN => Some(Self::WeightedRoundRobin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => ROUND_ROBIN,
            Self::WeightedRoundRobin => WEIGHTED_ROUND_ROBIN,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A balancing strategy instance with its own selection state.
///
/// An instance must serve exactly one server list; routes each build their own.
#[derive(Debug)]
pub enum BalancingStrategy {
    RoundRobin(RoundRobin),
    WeightedRoundRobin(WeightedRoundRobin),
}

impl BalancingStrategy {
    pub fn new(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::RoundRobin => Self::RoundRobin(RoundRobin::new()),
            StrategyKind::WeightedRoundRobin => Self::WeightedRoundRobin(WeightedRoundRobin::new()),
        }
    }

    /// Resolve a configured strategy name, defaulting to round-robin when absent or unknown
    pub fn from_name(name: Option<&str>) -> Self {
        let kind = match name {
            None => StrategyKind::RoundRobin,
            Some(name) => StrategyKind::from_name(name).unwrap_or_else(|| {
                warn!(
                    strategy = %name,
                    "Strategy not found, falling back to a RoundRobin strategy"
                );
                StrategyKind::RoundRobin
            }),
        };

        info!(strategy = %kind, "Picked balancing strategy");
        Self::new(kind)
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::RoundRobin(_) => StrategyKind::RoundRobin,
            Self::WeightedRoundRobin(_) => StrategyKind::WeightedRoundRobin,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Pick the next live server for `service`
    pub fn next(&self, service: &str, servers: &[Arc<Server>]) -> BalancerResult<Arc<Server>> {
        let result = match self {
            Self::RoundRobin(rr) => rr.next(service, servers),
            Self::WeightedRoundRobin(wrr) => wrr.next(service, servers),
        };

        match &result {
            Ok(server) => {
                counter!("balancer_selections_total", "strategy" => self.name()).increment(1);
                debug!(
                    service = %service,
                    server = %server.address(),
                    strategy = self.name(),
                    "Strategy picked server"
                );
            }
            Err(e) => {
                counter!("balancer_selection_failures_total", "strategy" => self.name()).increment(1);
                error!(service = %service, error = %e, "All servers are down");
            }
        }

        result
    }
}
