//! # Routing Integration Tests
//!
//! Builds routers from YAML configuration and checks prefix resolution,
//! strategy selection and server registration.

use route_balancer::{BalancerConfig, BalancerError, Router, StrategyKind};
use std::io::Write;
use tokio_test::{assert_err, assert_ok};

const CONFIG: &str = r#"
strategy: RoundRobin
services:
  - name: catch-all
    matcher: "/"
    replicas:
      - url: http://localhost:8081
  - name: api
    matcher: "/api"
    strategy: WeightedRoundRobin
    replicas:
      - url: http://localhost:8082
        metadata:
          weight: 3
      - url: http://localhost:8083
  - name: api-v2
    matcher: "/api/v2"
    strategy: Nonexistent
    replicas:
      - url: localhost:8084
"#;

fn router() -> Router {
    let config = BalancerConfig::from_yaml_str(CONFIG).unwrap();
    Router::from_config(&config).unwrap()
}

#[test]
fn test_longest_prefix_wins() {
    let router = router();

    assert_eq!(router.resolve("/api/v2/users").unwrap().name(), "api-v2");
    assert_eq!(router.resolve("/api/users").unwrap().name(), "api");
    assert_eq!(router.resolve("/api").unwrap().name(), "api");
    assert_eq!(router.resolve("/static/app.js").unwrap().name(), "catch-all");
}

#[test]
fn test_prefix_matching_is_literal() {
    let router = router();

    // "/apiary" still starts with "/api"
    assert_eq!(router.resolve("/apiary").unwrap().name(), "api");
}

#[test]
fn test_strategy_resolution_from_config() {
    let router = router();

    assert_eq!(
        router.resolve("/api").unwrap().strategy().kind(),
        StrategyKind::WeightedRoundRobin
    );
    assert_eq!(
        router.resolve("/api/v2").unwrap().strategy().kind(),
        StrategyKind::RoundRobin
    );
    assert_eq!(
        router.resolve("/").unwrap().strategy().kind(),
        StrategyKind::RoundRobin
    );
}

#[test]
fn test_replica_urls_and_weights() {
    let router = router();

    let api = router.resolve("/api").unwrap();
    let addresses: Vec<&str> = api.servers().iter().map(|s| s.address()).collect();
    assert_eq!(addresses, vec!["localhost:8082", "localhost:8083"]);
    assert_eq!(api.servers()[0].weight(), 3);
    assert_eq!(api.servers()[1].weight(), 1);

    let v2 = router.resolve("/api/v2").unwrap();
    assert_eq!(v2.servers()[0].url().scheme(), "http");
    assert_eq!(v2.servers()[0].address(), "localhost:8084");
}

#[test]
fn test_router_lists_every_server_once() {
    let router = router();
    assert_eq!(router.servers().len(), 4);
    assert_eq!(router.routes().len(), 3);
}

#[test]
fn test_unmatched_path_without_catch_all() {
    let config = BalancerConfig::from_yaml_str(
        r#"
services:
  - name: api
    matcher: "/api"
    replicas:
      - url: http://localhost:8081
"#,
    )
    .unwrap();
    let router = Router::from_config(&config).unwrap();

    let err = assert_err!(router.resolve("/health"));
    assert_eq!(
        err,
        BalancerError::NoRoute {
            path: "/health".to_string()
        }
    );
}

#[test]
fn test_route_next_server_uses_route_strategy() {
    let router = router();
    let api = router.resolve("/api/items").unwrap();

    let picks: Vec<String> = (0..4)
        .map(|_| assert_ok!(api.next_server()).address().to_string())
        .collect();

    assert_eq!(
        picks,
        vec!["localhost:8082", "localhost:8082", "localhost:8082", "localhost:8083"]
    );
}

#[tokio::test]
async fn test_load_router_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let config = assert_ok!(BalancerConfig::load_from_file(file.path()).await);
    let router = assert_ok!(Router::from_config(&config));
    assert_eq!(router.routes().len(), 3);
}

#[test]
fn test_https_replica_is_rejected_at_build_time() {
    let config = BalancerConfig::from_yaml_str(
        r#"
services:
  - name: secure
    matcher: "/"
    replicas:
      - url: https://localhost:8443
"#,
    )
    .unwrap();

    let err = assert_err!(Router::from_config(&config));
    assert_eq!(err.error_type(), "configuration_error");
}

#[test]
fn test_config_without_services_is_rejected() {
    assert_err!(BalancerConfig::from_yaml_str("strategy: RoundRobin\n"));
}

#[test]
fn test_missing_config_file() {
    let result = tokio_test::block_on(BalancerConfig::load_from_file(
        "/definitely/not/here/balancer.yaml",
    ));
    assert_err!(result);
}
