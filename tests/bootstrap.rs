//! Config file to registry, end to end.

use std::sync::Arc;
use std::time::Duration;

use infra_connect::config::parse_config;
use infra_connect::health::HealthMonitor;
use infra_connect::lifecycle::{self, Shutdown};
use infra_connect::registry::{LiveStatus, Registry};

mod common;

#[tokio::test]
async fn test_config_to_registry_report() {
    let peer = common::start_mock_backend(200).await;
    let broker = common::start_tcp_sink().await;
    let dead = common::unreachable_addr();

    let config = parse_config(&format!(
        r#"
        [health_check]
        interval_secs = 1
        timeout_secs = 2

        [[http]]
        url = "http://{peer}"
        health_host = "/health"

        [[kafka]]
        hosts = ["{broker}"]
        topic = "events"
        dial_timeout_ms = 1000

        [[redis]]
        host = "{dead}"
        dial_timeout_ms = 500
        read_timeout_ms = 500
        write_timeout_ms = 500

        [[etcd]]
        hosts = []
        "#
    ))
    .unwrap();

    let registry = Arc::new(Registry::new());
    let connectors = lifecycle::bootstrap(&config, &registry);
    assert_eq!(connectors.len(), 4);
    assert_eq!(registry.len(), 4);

    let ready = lifecycle::await_ready(&registry).await;
    let ready_keys: Vec<_> = ready
        .iter()
        .filter(|r| r.readiness.is_ready())
        .map(|r| r.key)
        .collect();
    // The broker address accepts TCP but never answers the Kafka handshake.
    assert_eq!(ready_keys, vec!["http"]);

    let reports = registry.check_all(Duration::from_secs(2)).await;
    let down: Vec<_> = reports
        .iter()
        .filter(|r| matches!(r.live, LiveStatus::Down { .. }))
        .map(|r| r.key)
        .collect();
    assert_eq!(down, vec!["etcd", "kafka-producer", "redis"]);

    let json = serde_json::to_value(&reports).unwrap();
    assert_eq!(json[0]["key"], "etcd");
    assert_eq!(json[0]["readiness"], "failed");

    assert!(lifecycle::shutdown_all(&registry).await.is_empty());
}

#[tokio::test]
async fn test_monitor_stops_on_shutdown() {
    let peer = common::start_mock_backend(200).await;
    let config = parse_config(&format!(
        r#"
        [health_check]
        interval_secs = 1
        timeout_secs = 1

        [[http]]
        url = "http://{peer}"
        "#
    ))
    .unwrap();

    let registry = Arc::new(Registry::new());
    lifecycle::bootstrap(&config, &registry);
    lifecycle::await_ready(&registry).await;

    let shutdown = Shutdown::new();
    let monitor = HealthMonitor::new(Arc::clone(&registry), config.health_check.clone());
    let task = tokio::spawn(monitor.run(shutdown.subscribe()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();
    assert!(tokio::time::timeout(Duration::from_secs(3), task).await.is_ok());

    lifecycle::shutdown_all(&registry).await;
}
