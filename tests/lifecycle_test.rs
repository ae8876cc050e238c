#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Telemetry bootstrap lifecycle against a dead collector endpoint. The
//! pipeline must come up, refuse double initialization, and shut down
//! within its flush bound even though nothing is listening.

use durable_greeter::telemetry::{Telemetry, TelemetryError};
use durable_greeter::Config;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread")]
async fn init_once_then_bounded_shutdown() {
    let config = Config::builder()
        .service_name("lifecycle-test")
        .otlp_endpoint("http://127.0.0.1:49151")
        .flush_timeout(Duration::from_millis(500))
        .build()
        .unwrap();

    let telemetry = Telemetry::init(&config).unwrap();
    assert!(!telemetry.is_stopped());

    // The subscriber slot is taken; a second init must fail loudly instead
    // of stacking a duplicate pipeline.
    let err = Telemetry::init(&config).unwrap_err();
    assert!(matches!(err, TelemetryError::SubscriberInit(_)));

    // Counters are usable while running.
    let metrics = telemetry.metrics();
    metrics.record_workflow_started("default", "simple-greeting");

    let started = Instant::now();
    telemetry.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(telemetry.is_stopped());

    // Idempotent.
    telemetry.shutdown().await;
}
