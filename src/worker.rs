use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock, Semaphore};
use tokio::time::sleep;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::context::WorkflowContext;
use crate::error::serialize_failure;
use crate::telemetry::{extract_trace_context, GreeterMetrics};
use crate::types::{ClaimedRun, ClaimedRunRow, WorkerOptions};
use crate::workflow::WorkflowRegistry;

/// Delay before a failed run becomes claimable again.
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// A background worker that processes workflow runs from a queue.
///
/// Workers are created via
/// [`GreeterClient::start_worker`](crate::GreeterClient::start_worker) and
/// poll in the background. The returned handle must be kept; dropping it
/// does not stop the worker, calling [`shutdown`](Self::shutdown) does.
///
/// # Example
///
/// ```ignore
/// let worker = client.start_worker(WorkerOptions {
///     concurrency: 4,
///     ..Default::default()
/// }).await?;
///
/// tokio::signal::ctrl_c().await?;
///
/// // Graceful shutdown waits for in-flight runs
/// worker.shutdown().await;
/// ```
pub struct GreeterWorker {
    shutdown_tx: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl GreeterWorker {
    pub(crate) async fn start(
        pool: PgPool,
        queue: String,
        registry: Arc<RwLock<WorkflowRegistry>>,
        options: WorkerOptions,
        metrics: Option<Arc<GreeterMetrics>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let shutdown_rx = shutdown_tx.subscribe();

        let worker_id = options.worker_id.clone().unwrap_or_else(|| {
            format!(
                "{}:{}",
                hostname::get()
                    .map(|h| h.to_string_lossy().to_string())
                    .unwrap_or_else(|_| "unknown".to_string()),
                std::process::id()
            )
        });

        let handle = tokio::spawn(Self::run_loop(
            pool,
            queue,
            registry,
            options,
            worker_id,
            metrics,
            shutdown_rx,
        ));

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Gracefully shut down the worker.
    ///
    /// Signals the poll loop to stop claiming new runs and waits for all
    /// in-flight runs to complete before returning.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        pool: PgPool,
        queue: String,
        registry: Arc<RwLock<WorkflowRegistry>>,
        options: WorkerOptions,
        worker_id: String,
        metrics: Option<Arc<GreeterMetrics>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let concurrency = options.concurrency;
        let lease_timeout = options.lease_timeout;
        let poll_interval = options.poll_interval;

        tracing::info!(worker_id = %worker_id, queue = %queue, concurrency, "worker started");

        // Semaphore limits concurrent executions
        let semaphore = Arc::new(Semaphore::new(concurrency));

        // Channel for tracking completion (for graceful shutdown)
        let (done_tx, mut done_rx) = mpsc::channel::<()>(concurrency);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("worker shutting down, waiting for in-flight runs...");
                    drop(done_tx);
                    while done_rx.recv().await.is_some() {}
                    tracing::info!("worker shutdown complete");
                    break;
                }

                _ = sleep(poll_interval) => {
                    let available = semaphore.available_permits();
                    if available == 0 {
                        continue;
                    }

                    let runs = match Self::claim_runs(
                        &pool,
                        &queue,
                        &worker_id,
                        lease_timeout,
                        available,
                    ).await {
                        Ok(runs) => runs,
                        Err(e) => {
                            tracing::error!("failed to claim runs: {e}");
                            continue;
                        }
                    };

                    for run in runs {
                        // Semaphore is never closed, so this cannot fail
                        let Ok(permit) = semaphore.clone().acquire_owned().await else {
                            break;
                        };
                        let pool = pool.clone();
                        let queue = queue.clone();
                        let registry = registry.clone();
                        let metrics = metrics.clone();
                        let worker_id = worker_id.clone();
                        let done_tx = done_tx.clone();

                        tokio::spawn(async move {
                            Self::execute_run(pool, queue, registry, metrics, worker_id, run)
                                .await;
                            drop(permit);
                            let _ = done_tx.send(()).await;
                        });
                    }
                }
            }
        }
    }

    /// Claim up to `count` pending runs, reclaiming expired leases.
    async fn claim_runs(
        pool: &PgPool,
        queue: &str,
        worker_id: &str,
        lease_timeout: Duration,
        count: usize,
    ) -> sqlx::Result<Vec<ClaimedRun>> {
        let rows: Vec<ClaimedRunRow> = sqlx::query_as(
            "UPDATE greeter.workflow_runs r
             SET state = 'running',
                 attempt = r.attempt + 1,
                 worker_id = $2,
                 started_at = COALESCE(r.started_at, now()),
                 lease_expires_at = now() + make_interval(secs => $3)
             FROM (
                 SELECT workflow_id
                 FROM greeter.workflow_runs
                 WHERE queue = $1
                   AND available_at <= now()
                   AND (state = 'pending'
                        OR (state = 'running' AND lease_expires_at < now()))
                 ORDER BY enqueued_at
                 LIMIT $4
                 FOR UPDATE SKIP LOCKED
             ) claimable
             WHERE r.workflow_id = claimable.workflow_id
             RETURNING r.workflow_id, r.workflow_name, r.input, r.attempt,
                       r.max_attempts, r.trace_headers",
        )
        .bind(queue)
        .bind(worker_id)
        .bind(lease_timeout.as_secs_f64())
        .bind(count as i64)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|row| row.try_into().map_err(|e: serde_json::Error| sqlx::Error::Decode(e.into())))
            .collect()
    }

    /// Execute one claimed run inside a `RunWorkflow:<name>` span parented
    /// on the context the starting client propagated.
    async fn execute_run(
        pool: PgPool,
        queue: String,
        registry: Arc<RwLock<WorkflowRegistry>>,
        metrics: Option<Arc<GreeterMetrics>>,
        worker_id: String,
        run: ClaimedRun,
    ) {
        let span = tracing::info_span!(
            "run_workflow",
            otel.name = %format!("RunWorkflow:{}", run.workflow_name),
            otel.status_code = tracing::field::Empty,
            workflow_id = %run.workflow_id,
            workflow_name = %run.workflow_name,
            attempt = run.attempt,
        );
        span.set_parent(extract_trace_context(&run.trace_headers));

        let workflow_name = run.workflow_name.clone();
        async {
            let handler = {
                let registry = registry.read().await;
                registry.get(&workflow_name).cloned()
            };
            let Some(handler) = handler else {
                tracing::error!("unknown workflow: {workflow_name}");
                let err = anyhow::anyhow!("unknown workflow: {workflow_name}");
                Self::fail_run(&pool, &queue, &worker_id, &run, &err, metrics.as_ref()).await;
                return;
            };

            let ctx = WorkflowContext::new(
                run.workflow_id,
                run.attempt,
                queue.clone(),
                workflow_name.clone(),
                metrics.clone(),
            );

            match handler.execute(run.input.clone(), ctx).await {
                Ok(output) => {
                    let applied =
                        Self::complete_run(&pool, &queue, &worker_id, &run, output).await;
                    if applied {
                        if let Some(metrics) = &metrics {
                            metrics.record_workflow_completed(&queue, &workflow_name);
                        }
                    }
                }
                Err(e) => {
                    // Error event + status on the active span, then persist.
                    tracing::error!(error = %e, "workflow execution failed");
                    tracing::Span::current().record("otel.status_code", "ERROR");
                    Self::fail_run(&pool, &queue, &worker_id, &run, &e, metrics.as_ref()).await;
                }
            }
        }
        .instrument(span)
        .await;
    }

    /// Mark the run completed. Guarded on state, lease holder, and attempt
    /// (the attempt counter acts as a fencing token across reclaims) so a
    /// stale worker whose run was reclaimed cannot rewrite the row; returns
    /// whether the transition applied.
    async fn complete_run(
        pool: &PgPool,
        queue: &str,
        worker_id: &str,
        run: &ClaimedRun,
        output: JsonValue,
    ) -> bool {
        let result = sqlx::query(
            "UPDATE greeter.workflow_runs
             SET state = 'completed', output = $3, completed_at = now()
             WHERE queue = $1 AND workflow_id = $2
               AND state = 'running' AND worker_id = $4 AND attempt = $5",
        )
        .bind(queue)
        .bind(run.workflow_id)
        .bind(&output)
        .bind(worker_id)
        .bind(run.attempt)
        .execute(pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                tracing::warn!(
                    workflow_id = %run.workflow_id,
                    attempt = run.attempt,
                    "run was reclaimed since this attempt started; discarding result"
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                tracing::error!("failed to complete run: {e}");
                false
            }
        }
    }

    /// Mark the run failed, or schedule a retry while attempts remain. Only
    /// the current lease holder may transition the row; a stale worker's
    /// failure is discarded. Retried rows shed their lease bookkeeping so
    /// `worker_id` always names the holder of the attempt that last touched
    /// the row. The worker itself keeps polling; failure policy for the
    /// process lives in the entry points.
    async fn fail_run(
        pool: &PgPool,
        queue: &str,
        worker_id: &str,
        run: &ClaimedRun,
        error: &anyhow::Error,
        metrics: Option<&Arc<GreeterMetrics>>,
    ) {
        let exhausted = run.attempt >= run.max_attempts;
        let failure = serialize_failure(error);

        let result = sqlx::query(
            "UPDATE greeter.workflow_runs
             SET state = CASE WHEN $3 THEN 'failed' ELSE 'pending' END,
                 failure = $4,
                 worker_id = CASE WHEN $3 THEN worker_id ELSE NULL END,
                 available_at = CASE WHEN $3 THEN available_at
                                ELSE now() + make_interval(secs => $5) END,
                 completed_at = CASE WHEN $3 THEN now() ELSE NULL END
             WHERE queue = $1 AND workflow_id = $2
               AND state = 'running' AND worker_id = $6 AND attempt = $7",
        )
        .bind(queue)
        .bind(run.workflow_id)
        .bind(exhausted)
        .bind(&failure)
        .bind(RETRY_BACKOFF.as_secs_f64())
        .bind(worker_id)
        .bind(run.attempt)
        .execute(pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                tracing::warn!(
                    workflow_id = %run.workflow_id,
                    attempt = run.attempt,
                    "run was reclaimed since this attempt started; discarding failure"
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("failed to record run failure: {e}");
                return;
            }
        }

        if exhausted {
            tracing::error!(
                workflow_id = %run.workflow_id,
                attempts = run.attempt,
                "workflow failed permanently"
            );
            if let Some(metrics) = metrics {
                metrics.record_workflow_failed(queue, &run.workflow_name, "Error");
            }
        } else {
            tracing::warn!(
                workflow_id = %run.workflow_id,
                attempt = run.attempt,
                "workflow attempt failed, will retry"
            );
        }
    }
}
