//! # Router Module
//!
//! Path-prefix routing. Routes are held in an explicitly ordered list sorted by descending
//! matcher length, so the most specific prefix always wins and resolution never depends on
//! hash-map iteration order. Routes with equal-length matchers keep their declaration order.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::config::BalancerConfig;
use crate::core::error::{BalancerError, BalancerResult};
use crate::core::server::{parse_replica_url, upstream_client, Server};
use crate::load_balancing::BalancingStrategy;

/// Binding between a path prefix, a server pool and the strategy balancing it.
///
/// The strategy is bound to this route's server list for its whole lifetime. Changing the
/// membership of a pool means building a new route.
#[derive(Debug)]
pub struct Route {
    name: String,
    matcher: String,
    servers: Arc<[Arc<Server>]>,
    strategy: BalancingStrategy,
}

impl Route {
    /// Create a route. Fails when `servers` is empty.
    pub fn new(
        name: impl Into<String>,
        matcher: impl Into<String>,
        servers: Vec<Arc<Server>>,
        strategy: BalancingStrategy,
    ) -> BalancerResult<Self> {
        let name = name.into();
        if servers.is_empty() {
            return Err(BalancerError::config(format!(
                "Service '{}' needs at least one replica",
                name
            )));
        }

        Ok(Self {
            name,
            matcher: matcher.into(),
            servers: servers.into(),
            strategy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &str {
        &self.matcher
    }

    pub fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }

    pub fn strategy(&self) -> &BalancingStrategy {
        &self.strategy
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.matcher)
    }

    /// Select a live server with this route's strategy
    pub fn next_server(&self) -> BalancerResult<Arc<Server>> {
        self.strategy.next(&self.name, &self.servers)
    }
}

/// Resolves request paths to routes
#[derive(Debug)]
pub struct Router {
    /// Sorted by descending matcher length
    routes: Vec<Arc<Route>>,
}

impl Router {
    pub fn new(routes: Vec<Route>) -> Self {
        let mut routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        // Stable sort keeps declaration order among equal lengths
        routes.sort_by(|a, b| b.matcher.len().cmp(&a.matcher.len()));
        Self { routes }
    }

    /// Build every route, server and strategy described by `config`
    pub fn from_config(config: &BalancerConfig) -> BalancerResult<Self> {
        if config.services.is_empty() {
            return Err(BalancerError::config("At least one service must be configured"));
        }

        let client = upstream_client(config.server.upstream_connect_timeout);
        let mut routes = Vec::with_capacity(config.services.len());

        for service in &config.services {
            let servers = service
                .replicas
                .iter()
                .map(|replica| {
                    let url = parse_replica_url(&replica.url)?;
                    Ok(Arc::new(Server::http(url, replica.metadata.clone(), client.clone())))
                })
                .collect::<BalancerResult<Vec<_>>>()?;

            let strategy = BalancingStrategy::from_name(config.strategy_for(service));
            info!(
                service = %service.name,
                matcher = %service.matcher,
                strategy = strategy.name(),
                replicas = servers.len(),
                "Registered service"
            );

            routes.push(Route::new(&service.name, &service.matcher, servers, strategy)?);
        }

        Ok(Self::new(routes))
    }

    /// Find the route with the longest matcher that prefixes `path`
    pub fn resolve(&self, path: &str) -> BalancerResult<Arc<Route>> {
        match self.routes.iter().find(|route| route.matches(path)) {
            Some(route) => {
                debug!(path = %path, service = %route.name, "Found service matching the request");
                Ok(route.clone())
            }
            None => Err(BalancerError::no_route(path)),
        }
    }

    /// Routes in resolution order
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Every distinct server across all routes
    pub fn servers(&self) -> Vec<Arc<Server>> {
        let mut seen = HashMap::new();
        for server in self.routes.iter().flat_map(|route| route.servers.iter()) {
            seen.entry(Arc::as_ptr(server) as usize)
                .or_insert_with(|| server.clone());
        }

        let mut servers: Vec<Arc<Server>> = seen.into_values().collect();
        servers.sort_by(|a, b| a.address().cmp(b.address()));
        servers
    }
}
