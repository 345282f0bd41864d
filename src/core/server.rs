//! # Backend Server Module
//!
//! A [`Server`] is one backend replica. Its address and metadata are fixed at construction;
//! the liveness flag is the only field that changes afterwards. The health checker writes it
//! and the balancing strategies read it, so it lives in an `AtomicBool`.
//!
//! Forwarding goes through the [`Forwarder`] trait. Production servers use [`HttpForwarder`],
//! a thin wrapper over `hyper-util`'s pooled client; tests plug in their own implementations.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, CONNECTION, HOST};
use axum::http::{Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client as HyperClient};
use hyper_util::rt::TokioExecutor;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::core::error::{BalancerError, BalancerResult};

/// Metadata key read by the weighted round-robin strategy
pub const WEIGHT_KEY: &str = "weight";

/// Pooled HTTP client shared by every [`HttpForwarder`]
pub type UpstreamClient = HyperClient<HttpConnector, Body>;

/// Hop-by-hop headers that must not be relayed to the upstream
const HOP_BY_HOP_HEADERS: [&str; 7] = [
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

/// Build the client used to relay requests to replicas
pub fn upstream_client(connect_timeout: Duration) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);

    HyperClient::builder(TokioExecutor::new()).build(connector)
}

/// Parse a replica URL from configuration.
///
/// A URL without a scheme (`localhost:8081`) is treated as `http://localhost:8081`.
/// Only plain `http` replicas are accepted; the upstream client has no TLS connector.
pub fn parse_replica_url(raw: &str) -> BalancerResult<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BalancerError::config("Replica url cannot be empty"));
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| BalancerError::config(format!("Invalid replica url '{}': {}", raw, e)))?;

    if url.host_str().is_none() {
        return Err(BalancerError::config(format!(
            "Replica url '{}' has no host",
            raw
        )));
    }
    if url.scheme() != "http" {
        return Err(BalancerError::config(format!(
            "Replica url '{}' uses unsupported scheme '{}', only http is supported",
            raw,
            url.scheme()
        )));
    }

    Ok(url)
}

/// Capability to relay a request to one upstream address
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Relay `request` and return the upstream response. Not retried.
    async fn forward(&self, request: Request<Body>) -> BalancerResult<Response<Body>>;
}

/// Reverse-proxies requests to a single upstream host
pub struct HttpForwarder {
    client: UpstreamClient,
    scheme: String,
    authority: String,
    base_path: String,
}

impl HttpForwarder {
    pub fn new(target: &Url, client: UpstreamClient) -> Self {
        let host = target.host_str().unwrap_or_default();
        let authority = match target.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Self {
            client,
            scheme: target.scheme().to_string(),
            authority,
            base_path: target.path().trim_end_matches('/').to_string(),
        }
    }

    /// Rewrite the inbound URI onto the upstream, joining the replica's base path
    fn upstream_uri(&self, uri: &Uri) -> BalancerResult<Uri> {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        format!(
            "{}://{}{}{}",
            self.scheme, self.authority, self.base_path, path_and_query
        )
        .parse()
        .map_err(|e| BalancerError::forward(&self.authority, format!("invalid upstream uri: {}", e)))
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, mut request: Request<Body>) -> BalancerResult<Response<Body>> {
        let uri = self.upstream_uri(request.uri())?;
        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;

        let headers = request.headers_mut();
        headers.remove(CONNECTION);
        for name in HOP_BY_HOP_HEADERS {
            headers.remove(HeaderName::from_static(name));
        }
        if let Ok(host) = HeaderValue::from_str(&self.authority) {
            headers.insert(HOST, host);
        }

        debug!(upstream = %request.uri(), method = %request.method(), "Relaying request upstream");

        let response: Response<Incoming> = self
            .client
            .request(request)
            .await
            .map_err(|e| BalancerError::forward(&self.authority, e.to_string()))?;

        Ok(response.map(Body::new))
    }
}

/// A single backend replica
pub struct Server {
    url: Url,
    address: String,
    alive: AtomicBool,
    metadata: HashMap<String, i64>,
    forwarder: Arc<dyn Forwarder>,
}

impl Server {
    /// Create a server. Liveness starts as `true` so traffic can flow before the first probe.
    pub fn new(url: Url, metadata: HashMap<String, i64>, forwarder: Arc<dyn Forwarder>) -> Self {
        let host = url.host_str().unwrap_or_default();
        let address = match url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Self {
            url,
            address,
            alive: AtomicBool::new(true),
            metadata,
            forwarder,
        }
    }

    /// Create a server that reverse-proxies over HTTP through `client`
    pub fn http(url: Url, metadata: HashMap<String, i64>, client: UpstreamClient) -> Self {
        let forwarder = Arc::new(HttpForwarder::new(&url, client));
        Self::new(url, metadata, forwarder)
    }

    /// `host:port` of the replica
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Store the new liveness and return the previous value
    pub fn set_liveness(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::AcqRel)
    }

    pub fn meta_or_default(&self, key: &str, default: i64) -> i64 {
        self.metadata.get(key).copied().unwrap_or(default)
    }

    /// Configured weight, defaulting to 1
    pub fn weight(&self) -> i64 {
        self.meta_or_default(WEIGHT_KEY, 1)
    }

    pub async fn forward(&self, request: Request<Body>) -> BalancerResult<Response<Body>> {
        self.forwarder.forward(request).await
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.address)
            .field("alive", &self.is_alive())
            .field("metadata", &self.metadata)
            .finish()
    }
}
