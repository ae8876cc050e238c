//! OTLP exporter construction.
//!
//! Builds span/metric/log exporters for the configured transport. Building
//! an exporter does not touch the network; an unreachable collector shows up
//! later as export errors, which the SDK logs and the process survives.

use std::time::Duration;

use opentelemetry_otlp::{
    LogExporter, MetricExporter, SpanExporter, WithExportConfig, WithHttpConfig, WithTonicConfig,
};
use opentelemetry_sdk::metrics::PeriodicReader;
use opentelemetry_sdk::runtime;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};

use crate::config::{Config, Protocol};
use crate::telemetry::resource::parse_attributes;
use crate::telemetry::TelemetryError;

/// Interval between periodic metric exports.
const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Export headers resolved from the raw header string plus the ingestion
/// token, when configured.
fn export_headers(config: &Config) -> Vec<(String, String)> {
    let mut headers = parse_attributes(&config.otlp_headers);
    if let Some(token) = &config.ingest_token {
        headers.push(("authorization".to_string(), format!("Bearer {token}")));
    }
    headers
}

/// Convert headers to tonic metadata, skipping entries tonic rejects.
fn grpc_metadata(headers: &[(String, String)]) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (key, value) in headers {
        let parsed_key: Result<MetadataKey<Ascii>, _> = key.to_ascii_lowercase().parse();
        let parsed_value: Result<MetadataValue<Ascii>, _> = value.parse();
        match (parsed_key, parsed_value) {
            (Ok(k), Ok(v)) => {
                metadata.insert(k, v);
            }
            _ => tracing::warn!(header = %key, "skipping export header tonic cannot carry"),
        }
    }
    metadata
}

/// Per-signal endpoint for the HTTP transport. The gRPC transport uses the
/// base endpoint for every signal.
fn http_signal_endpoint(base: &str, signal_path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), signal_path)
}

pub fn build_span_exporter(config: &Config) -> Result<SpanExporter, TelemetryError> {
    let headers = export_headers(config);
    let exporter = match config.otlp_protocol {
        Protocol::Grpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.otlp_endpoint)
            .with_metadata(grpc_metadata(&headers))
            .build()?,
        Protocol::Http => SpanExporter::builder()
            .with_http()
            .with_endpoint(http_signal_endpoint(&config.otlp_endpoint, "/v1/traces"))
            .with_headers(headers.into_iter().collect())
            .build()?,
    };
    Ok(exporter)
}

/// Build the periodic reader that drives metric export on its own timer,
/// independent of application flow.
pub fn build_metric_reader(config: &Config) -> Result<PeriodicReader, TelemetryError> {
    let headers = export_headers(config);
    let exporter = match config.otlp_protocol {
        Protocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(&config.otlp_endpoint)
            .with_metadata(grpc_metadata(&headers))
            .build()?,
        Protocol::Http => MetricExporter::builder()
            .with_http()
            .with_endpoint(http_signal_endpoint(&config.otlp_endpoint, "/v1/metrics"))
            .with_headers(headers.into_iter().collect())
            .build()?,
    };
    Ok(PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build())
}

pub fn build_log_exporter(config: &Config) -> Result<LogExporter, TelemetryError> {
    let headers = export_headers(config);
    let exporter = match config.otlp_protocol {
        Protocol::Grpc => LogExporter::builder()
            .with_tonic()
            .with_endpoint(&config.otlp_endpoint)
            .with_metadata(grpc_metadata(&headers))
            .build()?,
        Protocol::Http => LogExporter::builder()
            .with_http()
            .with_endpoint(http_signal_endpoint(&config.otlp_endpoint, "/v1/logs"))
            .with_headers(headers.into_iter().collect())
            .build()?,
    };
    Ok(exporter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config(protocol: Protocol) -> Config {
        Config {
            service_name: "test".to_string(),
            otlp_protocol: protocol,
            otlp_endpoint: protocol.default_endpoint().to_string(),
            otlp_headers: String::new(),
            resource_attributes: String::new(),
            database_url: "postgresql://localhost/greeter".to_string(),
            queue: "default".to_string(),
            tls_cert: None,
            tls_key: None,
            ingest_token: None,
            flush_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn http_endpoints_get_signal_paths() {
        assert_eq!(
            http_signal_endpoint("http://localhost:4318", "/v1/traces"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            http_signal_endpoint("http://collector:4318/", "/v1/logs"),
            "http://collector:4318/v1/logs"
        );
    }

    #[test]
    fn ingest_token_becomes_bearer_header() {
        let mut config = test_config(Protocol::Http);
        config.otlp_headers = "x-tenant=acme".to_string();
        config.ingest_token = Some("s3cret".to_string());
        let headers = export_headers(&config);
        assert!(headers.contains(&("x-tenant".to_string(), "acme".to_string())));
        assert!(headers.contains(&("authorization".to_string(), "Bearer s3cret".to_string())));
    }

    #[test]
    fn grpc_metadata_skips_invalid_keys() {
        let headers = vec![
            ("x-ok".to_string(), "1".to_string()),
            ("bad header name".to_string(), "1".to_string()),
        ];
        let metadata = grpc_metadata(&headers);
        assert!(metadata.get("x-ok").is_some());
        assert_eq!(metadata.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exporters_build_without_connectivity() {
        for protocol in [Protocol::Grpc, Protocol::Http] {
            let config = test_config(protocol);
            build_span_exporter(&config).expect("span exporter");
            build_metric_reader(&config).expect("metric reader");
            build_log_exporter(&config).expect("log exporter");
        }
    }
}
