use std::sync::Arc;
use uuid::Uuid;

use crate::telemetry::GreeterMetrics;

/// Context handed to every workflow execution.
///
/// Carries the run identity and the activity helper. Activities here are
/// plain computations; the span scaffolding around them mirrors the
/// durable-execution engine's own operation naming so externally observed
/// traces line up with equivalent implementations elsewhere.
pub struct WorkflowContext {
    /// Unique identifier for this workflow execution.
    pub workflow_id: Uuid,
    /// Current attempt number (starts at 1).
    pub attempt: i32,
    /// Queue the run was claimed from.
    pub queue: String,

    workflow_name: String,
    metrics: Option<Arc<GreeterMetrics>>,
}

impl WorkflowContext {
    pub(crate) fn new(
        workflow_id: Uuid,
        attempt: i32,
        queue: String,
        workflow_name: String,
        metrics: Option<Arc<GreeterMetrics>>,
    ) -> Self {
        Self {
            workflow_id,
            attempt,
            queue,
            workflow_name,
            metrics,
        }
    }

    /// Run an activity inside a `RunActivity:<name>` span and count it.
    ///
    /// The span is entered for the duration of the closure and closed on
    /// every exit path, panics included.
    pub fn activity<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let span = tracing::info_span!(
            "run_activity",
            otel.name = %format!("RunActivity:{name}"),
            workflow_id = %self.workflow_id,
            attempt = self.attempt,
        );
        let result = span.in_scope(f);
        if let Some(metrics) = &self.metrics {
            metrics.record_activity_executed(&self.workflow_name, name);
        }
        result
    }

    /// Name of the workflow being executed.
    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }
}
