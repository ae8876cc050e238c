use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GreeterError, GreeterResult};

/// Fallback service name used when neither the builder nor the environment
/// provides one.
pub const DEFAULT_SERVICE_NAME: &str = "durable-greeter";

/// Default collector endpoint per transport.
pub const DEFAULT_GRPC_ENDPOINT: &str = "http://localhost:4317";
pub const DEFAULT_HTTP_ENDPOINT: &str = "http://localhost:4318";

const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/greeter";
const DEFAULT_QUEUE: &str = "default";
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(5000);

/// OTLP transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Grpc,
    Http,
}

impl Protocol {
    /// The documented local default endpoint for this transport.
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Protocol::Grpc => DEFAULT_GRPC_ENDPOINT,
            Protocol::Http => DEFAULT_HTTP_ENDPOINT,
        }
    }
}

impl FromStr for Protocol {
    type Err = GreeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grpc" => Ok(Protocol::Grpc),
            "http" => Ok(Protocol::Http),
            other => Err(GreeterError::InvalidConfiguration {
                reason: format!("unknown OTLP protocol `{other}` (expected `grpc` or `http`)"),
            }),
        }
    }
}

/// Process configuration, populated once at startup and never mutated.
///
/// Precedence for every field: explicit builder argument > environment
/// variable > hardcoded default.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub otlp_protocol: Protocol,
    pub otlp_endpoint: String,
    /// Raw `key=value,...` export headers. Malformed pairs are skipped.
    pub otlp_headers: String,
    /// Raw `key=value,...` resource attributes. Malformed pairs are skipped.
    pub resource_attributes: String,
    pub database_url: String,
    pub queue: String,
    /// Client certificate/key for the durable store connection.
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    /// Collector ingestion token, sent as an `authorization: Bearer` header.
    pub ingest_token: Option<String>,
    /// Upper bound on the telemetry flush race during shutdown.
    pub flush_timeout: Duration,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for [`Config`]. Unset fields fall back to the environment, then
/// to hardcoded defaults, at [`build`](Self::build) time.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    service_name: Option<String>,
    otlp_protocol: Option<Protocol>,
    otlp_endpoint: Option<String>,
    otlp_headers: Option<String>,
    resource_attributes: Option<String>,
    database_url: Option<String>,
    queue: Option<String>,
    tls_cert: Option<PathBuf>,
    tls_key: Option<PathBuf>,
    ingest_token: Option<String>,
    flush_timeout: Option<Duration>,
}

impl ConfigBuilder {
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn otlp_protocol(mut self, protocol: Protocol) -> Self {
        self.otlp_protocol = Some(protocol);
        self
    }

    pub fn otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    pub fn otlp_headers(mut self, headers: impl Into<String>) -> Self {
        self.otlp_headers = Some(headers.into());
        self
    }

    pub fn resource_attributes(mut self, attributes: impl Into<String>) -> Self {
        self.resource_attributes = Some(attributes.into());
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn tls_material(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.tls_cert = Some(cert.into());
        self.tls_key = Some(key.into());
        self
    }

    pub fn ingest_token(mut self, token: impl Into<String>) -> Self {
        self.ingest_token = Some(token.into());
        self
    }

    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = Some(timeout);
        self
    }

    /// Resolve the configuration, consulting the environment for unset
    /// fields and validating the result.
    pub fn build(self) -> GreeterResult<Config> {
        let otlp_protocol = match self.otlp_protocol {
            Some(p) => p,
            None => match std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL") {
                Ok(raw) => raw.parse()?,
                Err(_) => Protocol::default(),
            },
        };

        let config = Config {
            service_name: resolve(
                self.service_name,
                std::env::var("OTEL_SERVICE_NAME").ok(),
                DEFAULT_SERVICE_NAME,
            ),
            otlp_protocol,
            otlp_endpoint: resolve(
                self.otlp_endpoint,
                std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
                otlp_protocol.default_endpoint(),
            ),
            otlp_headers: resolve(
                self.otlp_headers,
                std::env::var("OTEL_EXPORTER_OTLP_HEADERS").ok(),
                "",
            ),
            resource_attributes: resolve(
                self.resource_attributes,
                std::env::var("OTEL_RESOURCE_ATTRIBUTES").ok(),
                "",
            ),
            database_url: resolve(
                self.database_url,
                std::env::var("GREETER_DATABASE_URL").ok(),
                DEFAULT_DATABASE_URL,
            ),
            queue: resolve(self.queue, std::env::var("GREETER_QUEUE").ok(), DEFAULT_QUEUE),
            tls_cert: self
                .tls_cert
                .or_else(|| std::env::var("GREETER_TLS_CERT").ok().map(PathBuf::from)),
            tls_key: self
                .tls_key
                .or_else(|| std::env::var("GREETER_TLS_KEY").ok().map(PathBuf::from)),
            ingest_token: self
                .ingest_token
                .or_else(|| std::env::var("GREETER_INGEST_TOKEN").ok()),
            flush_timeout: self.flush_timeout.unwrap_or(DEFAULT_FLUSH_TIMEOUT),
        };

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Fatal configuration checks, run before any work is attempted.
    fn validate(&self) -> GreeterResult<()> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(_), None) => Err(GreeterError::InvalidConfiguration {
                reason: "GREETER_TLS_CERT is set but GREETER_TLS_KEY is missing".to_string(),
            }),
            (None, Some(_)) => Err(GreeterError::InvalidConfiguration {
                reason: "GREETER_TLS_KEY is set but GREETER_TLS_CERT is missing".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Precedence helper: explicit argument > environment value > default.
fn resolve(explicit: Option<String>, env: Option<String>, default: &str) -> String {
    explicit
        .or(env)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
