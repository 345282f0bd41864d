//! # Health Checker Integration Tests
//!
//! Probes real loopback sockets: a bound listener counts as alive, a port with nothing
//! behind it counts as down. Scripted probes cover the background loop's scheduling.

use async_trait::async_trait;
use route_balancer::core::config::HealthCheckSettings;
use route_balancer::core::server::{parse_replica_url, upstream_client};
use route_balancer::observability::{HealthProbe, TcpProbe};
use route_balancer::{BalancerError, BalancerResult, HealthChecker, Server};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn server(address: &str) -> Arc<Server> {
    let url = parse_replica_url(address).unwrap();
    Arc::new(Server::http(
        url,
        HashMap::new(),
        upstream_client(Duration::from_secs(1)),
    ))
}

/// Reserve a loopback port, then release it so nothing listens there
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn settings(interval: Duration) -> HealthCheckSettings {
    HealthCheckSettings {
        interval,
        timeout: (interval / 2).min(Duration::from_millis(500)),
    }
}

#[tokio::test]
async fn test_tcp_probe_against_listener_and_closed_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().to_string();
    let closed = format!("127.0.0.1:{}", closed_port().await);

    let probe = TcpProbe;
    assert_eq!(probe.probe_type(), "tcp");
    assert_ok!(probe.probe(&open, Duration::from_millis(500)).await);
    assert_err!(probe.probe(&closed, Duration::from_millis(500)).await);
}

#[tokio::test]
async fn test_check_all_marks_unreachable_servers_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let up = server(&listener.local_addr().unwrap().to_string());
    let down = server(&format!("127.0.0.1:{}", closed_port().await));

    let checker = HealthChecker::new(vec![up.clone(), down.clone()], &settings(Duration::from_secs(60)))
        .unwrap();

    assert_eq!(checker.check_all().await, 1);
    assert!(up.is_alive());
    assert!(!down.is_alive());
}

#[tokio::test]
async fn test_server_revives_once_reachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let target = server(&address.to_string());
    let checker = HealthChecker::new(vec![target.clone()], &settings(Duration::from_secs(60))).unwrap();

    assert_eq!(checker.check_all().await, 0);
    assert!(!target.is_alive());

    let _listener = TcpListener::bind(address).await.unwrap();
    assert_eq!(checker.check_all().await, 1);
    assert!(target.is_alive());
}

#[tokio::test]
async fn test_background_loop_updates_liveness_and_stops() {
    let down = server(&format!("127.0.0.1:{}", closed_port().await));
    let checker = HealthChecker::new(vec![down.clone()], &settings(Duration::from_millis(50))).unwrap();

    let shutdown = CancellationToken::new();
    let handle = checker.spawn(shutdown.clone());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while down.is_alive() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!down.is_alive());

    shutdown.cancel();
    let stopped = tokio::time::timeout(Duration::from_secs(2), handle).await;
    assert!(matches!(stopped, Ok(Ok(()))));
}

/// Never answers for `stuck`; fails every other address immediately
struct StuckProbe {
    stuck: String,
}

#[async_trait]
impl HealthProbe for StuckProbe {
    async fn probe(&self, address: &str, _timeout: Duration) -> BalancerResult<()> {
        if address == self.stuck {
            std::future::pending::<()>().await;
        }
        Err(BalancerError::probe(address, "refused"))
    }

    fn probe_type(&self) -> &'static str {
        "stuck"
    }
}

#[tokio::test]
async fn test_hanging_probe_does_not_delay_other_servers() {
    let stuck = server("10.0.0.1:80");
    let failing = server("10.0.0.2:80");
    let interval = Duration::from_millis(50);

    let checker = HealthChecker::new(vec![stuck.clone(), failing.clone()], &settings(interval))
        .unwrap()
        .with_probe(Arc::new(StuckProbe {
            stuck: stuck.address().to_string(),
        }));

    let shutdown = CancellationToken::new();
    let handle = checker.spawn(shutdown.clone());

    tokio::time::sleep(interval * 2).await;
    assert!(!failing.is_alive());
    // The hung probe never reported, so its server keeps its last known state
    assert!(stuck.is_alive());

    shutdown.cancel();
    let stopped = tokio::time::timeout(Duration::from_secs(2), handle).await;
    assert!(matches!(stopped, Ok(Ok(()))));
}

#[test]
fn test_empty_server_list_is_rejected() {
    let result = HealthChecker::new(vec![], &HealthCheckSettings::default());
    assert!(matches!(result, Err(BalancerError::Configuration { .. })));
}
