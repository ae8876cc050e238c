use serde_json::Value as JsonValue;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{GreeterError, GreeterResult};
use crate::telemetry::{inject_trace_context, GreeterMetrics, Telemetry};
use crate::types::{
    RunStatusRow, StartOptions, StartedWorkflow, WaitOptions, WorkerOptions, WorkflowStatus,
};
use crate::worker::GreeterWorker;
use crate::workflow::{Workflow, WorkflowRegistry};

const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// The main client for starting and observing greeting workflows.
///
/// Use this client to:
/// - Register workflow types with [`register`](Self::register)
/// - Start executions with [`start`](Self::start)
/// - Await results with [`wait_for_result`](Self::wait_for_result)
/// - Run a worker with [`start_worker`](Self::start_worker)
///
/// # Example
///
/// ```ignore
/// let client = GreeterClient::builder()
///     .database_url("postgres://localhost/greeter")
///     .queue("hello")
///     .build()
///     .await?;
///
/// client.register::<SimpleGreetingWorkflow>().await?;
/// let started = client.start::<SimpleGreetingWorkflow>(input).await?;
/// ```
pub struct GreeterClient {
    pool: PgPool,
    owns_pool: bool,
    queue: String,
    registry: Arc<RwLock<WorkflowRegistry>>,
    metrics: Option<Arc<GreeterMetrics>>,
}

impl std::fmt::Debug for GreeterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreeterClient")
            .field("pool", &self.pool)
            .field("owns_pool", &self.owns_pool)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`GreeterClient`].
pub struct GreeterClientBuilder {
    database_url: Option<String>,
    pool: Option<PgPool>,
    queue: String,
    tls_cert: Option<std::path::PathBuf>,
    tls_key: Option<std::path::PathBuf>,
    metrics: Option<Arc<GreeterMetrics>>,
}

impl GreeterClientBuilder {
    pub fn new() -> Self {
        Self {
            database_url: None,
            pool: None,
            queue: "default".to_string(),
            tls_cert: None,
            tls_key: None,
            metrics: None,
        }
    }

    /// Take store address, queue, and TLS material from the process config,
    /// and counters from the telemetry handle.
    pub fn from_config(config: &Config, telemetry: &Telemetry) -> Self {
        let mut builder = Self::new()
            .database_url(config.database_url.clone())
            .queue(config.queue.clone())
            .metrics(telemetry.metrics());
        if let (Some(cert), Some(key)) = (&config.tls_cert, &config.tls_key) {
            builder = builder.tls_material(cert.clone(), key.clone());
        }
        builder
    }

    /// Set the store URL (a new connection pool will be created).
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Use an existing connection pool (the client will NOT close it).
    pub fn pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the queue name (default: "default").
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Client certificate/key presented to the durable store.
    pub fn tls_material(
        mut self,
        cert: impl Into<std::path::PathBuf>,
        key: impl Into<std::path::PathBuf>,
    ) -> Self {
        self.tls_cert = Some(cert.into());
        self.tls_key = Some(key.into());
        self
    }

    /// Counters recorded at start/complete/fail points.
    pub fn metrics(mut self, metrics: Arc<GreeterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn build(self) -> GreeterResult<GreeterClient> {
        let (pool, owns_pool) = if let Some(pool) = self.pool {
            (pool, false)
        } else {
            let url = self
                .database_url
                .or_else(|| std::env::var("GREETER_DATABASE_URL").ok())
                .unwrap_or_else(|| "postgresql://localhost/greeter".to_string());
            let mut options = PgConnectOptions::from_str(&url)?;
            if let (Some(cert), Some(key)) = (&self.tls_cert, &self.tls_key) {
                options = options
                    .ssl_mode(PgSslMode::Require)
                    .ssl_client_cert(cert)
                    .ssl_client_key(key);
            }
            let pool = PgPoolOptions::new().connect_with(options).await?;
            (pool, true)
        };

        Ok(GreeterClient {
            pool,
            owns_pool,
            queue: self.queue,
            registry: Arc::new(RwLock::new(HashMap::new())),
            metrics: self.metrics,
        })
    }
}

impl Default for GreeterClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GreeterClient {
    pub fn builder() -> GreeterClientBuilder {
        GreeterClientBuilder::new()
    }

    /// Builder preconfigured from the process config and telemetry handle.
    pub fn from_config(config: &Config, telemetry: &Telemetry) -> GreeterClientBuilder {
        GreeterClientBuilder::from_config(config, telemetry)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Queue this client is configured for.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Register a workflow type. Required before starting or processing.
    ///
    /// Returns an error if a workflow with the same name is already
    /// registered.
    pub async fn register<W: Workflow>(&self) -> GreeterResult<&Self> {
        let mut registry = self.registry.write().await;
        if registry.contains_key(W::NAME) {
            return Err(GreeterError::WorkflowAlreadyRegistered {
                name: W::NAME.to_string(),
            });
        }
        registry.insert(
            W::NAME.to_string(),
            Arc::new(std::marker::PhantomData::<W>),
        );
        Ok(self)
    }

    /// Start a workflow (type-safe version).
    pub async fn start<W: Workflow>(&self, input: W::Input) -> GreeterResult<StartedWorkflow> {
        self.start_with_options::<W>(input, StartOptions::default())
            .await
    }

    /// Start a workflow with options (type-safe version).
    pub async fn start_with_options<W: Workflow>(
        &self,
        input: W::Input,
        options: StartOptions,
    ) -> GreeterResult<StartedWorkflow> {
        self.start_by_name(W::NAME, serde_json::to_value(&input)?, options)
            .await
    }

    /// Start a workflow by name (dynamic version).
    ///
    /// The workflow must be registered first. The call runs inside a
    /// `StartWorkflow:<name>` span, and the span's context is stored on the
    /// run row so the executing worker can parent its own span to it.
    pub async fn start_by_name(
        &self,
        workflow_name: &str,
        input: JsonValue,
        options: StartOptions,
    ) -> GreeterResult<StartedWorkflow> {
        {
            let registry = self.registry.read().await;
            if !registry.contains_key(workflow_name) {
                return Err(GreeterError::WorkflowNotRegistered {
                    name: workflow_name.to_string(),
                });
            }
        }

        let span = tracing::info_span!(
            "start_workflow",
            otel.name = %format!("StartWorkflow:{workflow_name}"),
            queue = %self.queue,
            workflow_name = %workflow_name,
        );

        let queue = self.queue.clone();
        let max_attempts = options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        async move {
            let mut headers = HashMap::new();
            inject_trace_context(&mut headers);

            let (workflow_id,): (Uuid,) = sqlx::query_as(
                "INSERT INTO greeter.workflow_runs
                     (queue, workflow_name, input, max_attempts, trace_headers)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING workflow_id",
            )
            .bind(&queue)
            .bind(workflow_name)
            .bind(&input)
            .bind(max_attempts)
            .bind(serde_json::to_value(&headers)?)
            .fetch_one(&self.pool)
            .await?;

            if let Some(metrics) = &self.metrics {
                metrics.record_workflow_started(&queue, workflow_name);
            }
            tracing::info!(workflow_id = %workflow_id, "workflow started");

            Ok(StartedWorkflow {
                workflow_id,
                workflow_name: workflow_name.to_string(),
            })
        }
        .instrument(span)
        .await
    }

    /// Fetch the current status of a run.
    pub async fn status(&self, workflow_id: Uuid) -> GreeterResult<WorkflowStatus> {
        let row: Option<RunStatusRow> = sqlx::query_as(
            "SELECT state, attempt, enqueued_at, started_at, completed_at, output, failure
             FROM greeter.workflow_runs
             WHERE queue = $1 AND workflow_id = $2",
        )
        .bind(&self.queue)
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RunStatusRow::into_status)
            .ok_or(GreeterError::WorkflowNotFound { workflow_id })
    }

    /// Poll until the run reaches a terminal state and return its output.
    ///
    /// Fails with [`GreeterError::WorkflowFailed`] if the run failed, or
    /// [`GreeterError::WaitTimeout`] when `options.timeout` elapses first.
    pub async fn wait_for_result<W: Workflow>(
        &self,
        workflow_id: Uuid,
        options: WaitOptions,
    ) -> GreeterResult<W::Output> {
        let poll_interval = options.poll_interval.unwrap_or(Duration::from_millis(250));
        let deadline = options.timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let status = self.status(workflow_id).await?;
            match status {
                WorkflowStatus::Completed { output, .. } => {
                    return Ok(serde_json::from_value(output)?);
                }
                WorkflowStatus::Failed { error, .. } => {
                    return Err(GreeterError::WorkflowFailed {
                        workflow_id,
                        message: error.message,
                    });
                }
                _ => {}
            }

            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Err(GreeterError::WaitTimeout {
                        workflow_id,
                        timeout_secs: options.timeout.unwrap_or_default().as_secs(),
                    });
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Start a worker that processes runs from this client's queue.
    ///
    /// # Errors
    ///
    /// Returns [`GreeterError::InvalidConfiguration`] if `lease_timeout` is
    /// less than 1 second.
    pub async fn start_worker(&self, options: WorkerOptions) -> GreeterResult<GreeterWorker> {
        if options.lease_timeout < Duration::from_secs(1) {
            return Err(GreeterError::InvalidConfiguration {
                reason: "lease_timeout must be at least 1 second".to_string(),
            });
        }

        Ok(GreeterWorker::start(
            self.pool.clone(),
            self.queue.clone(),
            self.registry.clone(),
            options,
            self.metrics.clone(),
        )
        .await)
    }

    /// Close the client. Closes the pool if owned.
    pub async fn close(self) {
        if self.owns_pool {
            self.pool.close().await;
        }
    }
}
