//! End-to-end dispatch tests against a real HTTP server (spec §8 scenarios
//! A and B): the shipper's flush loop actually POSTs batches to an external
//! target, and an oversize record never reaches the wire.

use serde_json::{json, Value};
use std::time::Duration;
use telemetry_shipper::{EventBus, Logger, SessionContext, ShipperConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session() -> SessionContext {
    SessionContext::new(
        Some("s1".into()),
        None,
        "env-1",
        "ns-1",
        "production",
        "default",
    )
}

#[tokio::test]
async fn basic_flush_posts_one_batch_with_all_events_in_order() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let bus = EventBus::new();
    let logger = Logger::new();
    let shipper = ShipperConfig::new(bus, logger, session())
        .max_batch_bytes(1024 * 1024)
        .external_target(mock_server.uri(), Some("token".into()))
        .tick_interval(Duration::from_secs(3600))
        .build()
        .unwrap();

    shipper.emit("e1", json!({}));
    shipper.emit("e2", json!({}));
    shipper.emit("e3", json!({}));
    tokio::task::yield_now().await;

    assert!(shipper.flush_once().await);
    assert_eq!(shipper.stats().event_buffer_len, 0);

    shipper.close().await;
}

#[tokio::test]
async fn oversize_log_record_never_reaches_the_wire() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/log-entries"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let bus = EventBus::new();
    let logger = Logger::new();
    let shipper = ShipperConfig::new(bus, logger.clone(), session())
        .max_batch_bytes(100)
        .external_target(mock_server.uri(), None)
        .tick_interval(Duration::from_secs(3600))
        .build()
        .unwrap();

    logger.emit(telemetry_shipper::LogRecord {
        key: "k1".into(),
        timestamp: chrono::Utc::now(),
        level: 3,
        context: Value::Object(Default::default()),
        message: telemetry_shipper::LogMessage {
            msg: "x".repeat(250),
            ..Default::default()
        },
        metadata: None,
    });
    tokio::task::yield_now().await;

    let flushed = shipper.flush_once().await;
    assert!(!flushed);
    assert_eq!(shipper.stats().log_buffer_len, 0);

    shipper.close().await;
    mock_server.verify().await;
}

#[tokio::test]
async fn circuit_breaker_trips_after_max_consecutive_failures() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let bus = EventBus::new();
    let logger = Logger::new();
    let shipper = ShipperConfig::new(bus, logger, session())
        .max_batch_bytes(1024 * 1024)
        .external_target(mock_server.uri(), None)
        .tick_interval(Duration::from_secs(3600))
        .build()
        .unwrap();

    for i in 0..10 {
        shipper.emit(format!("e{i}"), json!({}));
        assert!(shipper.flush_once().await);
    }

    assert_eq!(shipper.stats().consecutive_failures, 10);
    assert!(!shipper.stats().flush_enabled);

    shipper.emit("e-after-trip", json!({}));
    assert!(!shipper.flush_once().await);
    assert_eq!(shipper.stats().event_buffer_len, 1);

    shipper.close().await;
}
