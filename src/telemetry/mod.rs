//! Telemetry bootstrap and lifecycle.
//!
//! [`Telemetry::init`] is the single entry point: it builds the resource
//! descriptor, constructs OTLP exporters for the configured transport,
//! installs the composite context propagator (trace-context + baggage),
//! starts the tracer/meter/logger providers, and installs the `tracing`
//! subscriber stack. The returned [`Telemetry`] handle is threaded
//! explicitly to whichever components need tracer/meter access; there are
//! no module-level singletons here beyond the propagator and subscriber the
//! SDKs themselves require.
//!
//! Initialization is deliberately not idempotent: a second call fails with
//! [`TelemetryError::SubscriberInit`] instead of silently duplicating
//! export pipelines.

mod exporter;
mod metrics;
mod propagation;
mod resource;

pub use metrics::{
    GreeterMetrics, ACTIVITIES_EXECUTED_TOTAL, WORKFLOWS_COMPLETED_TOTAL, WORKFLOWS_FAILED_TOTAL,
    WORKFLOWS_STARTED_TOTAL,
};
pub use propagation::{extract_trace_context, inject_trace_context};
pub use resource::{build_resource, parse_attributes};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::{LogError, LoggerProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, TracerProvider};
use opentelemetry_sdk::runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Error type for telemetry initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to initialize OTLP span exporter: {0}")]
    TracerInit(#[from] TraceError),
    #[error("failed to initialize OTLP metric exporter: {0}")]
    MeterInit(#[from] MetricError),
    #[error("failed to initialize OTLP log exporter: {0}")]
    LoggerInit(#[from] LogError),
    #[error("failed to set global subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Handle to the running telemetry pipeline.
///
/// Owns the providers and the shutdown guard. Constructed once at process
/// start and passed by reference to the components that need it.
#[derive(Debug)]
pub struct Telemetry {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: LoggerProvider,
    meter: OnceLock<opentelemetry::metrics::Meter>,
    metrics: OnceLock<Arc<GreeterMetrics>>,
    flush_timeout: Duration,
    stopped: AtomicBool,
}

impl Telemetry {
    /// Assemble and start the telemetry pipeline.
    pub fn init(config: &Config) -> Result<Self, TelemetryError> {
        let telemetry = Self::build(config)?;

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer();
        let tracer = telemetry
            .tracer_provider
            .tracer(config.service_name.clone());
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        let log_layer = OpenTelemetryTracingBridge::new(&telemetry.logger_provider);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .with(log_layer)
            .try_init()?;

        tracing::info!(
            endpoint = %config.otlp_endpoint,
            protocol = ?config.otlp_protocol,
            "telemetry pipeline started"
        );
        Ok(telemetry)
    }

    /// Build providers and install the global propagator without touching
    /// the global subscriber. Split out so lifecycle tests can run without
    /// fighting over the process-wide subscriber slot.
    fn build(config: &Config) -> Result<Self, TelemetryError> {
        let propagator = TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]);
        opentelemetry::global::set_text_map_propagator(propagator);

        let resource = resource::build_resource(&config.service_name, &config.resource_attributes);

        let span_exporter = exporter::build_span_exporter(config)?;
        let tracer_provider = TracerProvider::builder()
            .with_batch_exporter(span_exporter, runtime::Tokio)
            .with_sampler(Sampler::AlwaysOn)
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource.clone())
            .build();

        let metric_reader = exporter::build_metric_reader(config)?;
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(metric_reader)
            .with_resource(resource.clone())
            .build();

        let log_exporter = exporter::build_log_exporter(config)?;
        let logger_provider = LoggerProvider::builder()
            .with_batch_exporter(log_exporter, runtime::Tokio)
            .with_resource(resource)
            .build();

        Ok(Self {
            tracer_provider,
            meter_provider,
            logger_provider,
            meter: OnceLock::new(),
            metrics: OnceLock::new(),
            flush_timeout: config.flush_timeout,
            stopped: AtomicBool::new(false),
        })
    }

    /// The process-wide meter, created on first access and reused.
    pub fn meter(&self) -> &opentelemetry::metrics::Meter {
        self.meter
            .get_or_init(|| self.meter_provider.meter("durable-greeter"))
    }

    /// Workflow/activity counters bound to [`meter`](Self::meter).
    pub fn metrics(&self) -> Arc<GreeterMetrics> {
        self.metrics
            .get_or_init(|| Arc::new(GreeterMetrics::new(self.meter())))
            .clone()
    }

    /// Flush pending telemetry and stop the providers.
    ///
    /// The flush races the configured timeout; if export has not completed
    /// in time it is abandoned and shutdown proceeds (data loss accepted
    /// over hang). Safe to call more than once; only the first call acts.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let tracer_provider = self.tracer_provider.clone();
        let meter_provider = self.meter_provider.clone();
        let logger_provider = self.logger_provider.clone();

        let flush = tokio::task::spawn_blocking(move || {
            if let Err(e) = tracer_provider.shutdown() {
                tracing::warn!("tracer provider shutdown reported: {e}");
            }
            if let Err(e) = meter_provider.shutdown() {
                tracing::warn!("meter provider shutdown reported: {e}");
            }
            if let Err(e) = logger_provider.shutdown() {
                tracing::warn!("logger provider shutdown reported: {e}");
            }
        });

        match tokio::time::timeout(self.flush_timeout, flush).await {
            Ok(_) => tracing::debug!("telemetry flushed"),
            Err(_) => tracing::warn!(
                timeout_ms = self.flush_timeout.as_millis() as u64,
                "telemetry flush did not complete in time; abandoning"
            ),
        }
    }

    /// Whether shutdown has already run.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::{Config, Protocol};
    use std::time::Instant;

    fn test_config(flush_timeout: Duration) -> Config {
        Config {
            service_name: "telemetry-test".to_string(),
            otlp_protocol: Protocol::Grpc,
            // Nothing listens here; export will fail, flush must still bound.
            otlp_endpoint: "http://127.0.0.1:49151".to_string(),
            otlp_headers: String::new(),
            resource_attributes: "env=test".to_string(),
            database_url: "postgresql://localhost/greeter".to_string(),
            queue: "default".to_string(),
            tls_cert: None,
            tls_key: None,
            ingest_token: None,
            flush_timeout,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_is_bounded_by_flush_timeout() {
        let telemetry = Telemetry::build(&test_config(Duration::from_millis(500))).unwrap();
        let started = Instant::now();
        telemetry.shutdown().await;
        // Generous slack over the 500ms bound; must not hang on the dead
        // collector endpoint.
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(telemetry.is_stopped());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_twice_is_a_noop() {
        let telemetry = Telemetry::build(&test_config(Duration::from_millis(500))).unwrap();
        telemetry.shutdown().await;
        telemetry.shutdown().await;
        assert!(telemetry.is_stopped());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn meter_handle_is_reused() {
        let telemetry = Telemetry::build(&test_config(Duration::from_millis(200))).unwrap();
        let first = telemetry.metrics();
        let second = telemetry.metrics();
        assert!(Arc::ptr_eq(&first, &second));
        telemetry.shutdown().await;
    }
}
