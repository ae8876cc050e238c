//! Metric definitions and recording helpers.
//!
//! All metrics are prefixed with `greeter_` and exported through the
//! periodic OTLP reader. Counters only; nothing here decrements or resets.

use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;

pub const WORKFLOWS_STARTED_TOTAL: &str = "greeter_workflows_started_total";
pub const WORKFLOWS_COMPLETED_TOTAL: &str = "greeter_workflows_completed_total";
pub const WORKFLOWS_FAILED_TOTAL: &str = "greeter_workflows_failed_total";
pub const ACTIVITIES_EXECUTED_TOTAL: &str = "greeter_activities_executed_total";

/// Counters recorded at the defined operation points: workflow start
/// (client), completion/failure (worker), activity execution (context).
#[derive(Debug, Clone)]
pub struct GreeterMetrics {
    workflows_started: Counter<u64>,
    workflows_completed: Counter<u64>,
    workflows_failed: Counter<u64>,
    activities_executed: Counter<u64>,
}

impl GreeterMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            workflows_started: meter
                .u64_counter(WORKFLOWS_STARTED_TOTAL)
                .with_description("Total number of workflow executions started")
                .build(),
            workflows_completed: meter
                .u64_counter(WORKFLOWS_COMPLETED_TOTAL)
                .with_description("Total number of workflow executions that completed")
                .build(),
            workflows_failed: meter
                .u64_counter(WORKFLOWS_FAILED_TOTAL)
                .with_description("Total number of workflow executions that failed permanently")
                .build(),
            activities_executed: meter
                .u64_counter(ACTIVITIES_EXECUTED_TOTAL)
                .with_description("Total number of activity invocations")
                .build(),
        }
    }

    pub fn record_workflow_started(&self, queue: &str, workflow: &str) {
        self.workflows_started.add(
            1,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new("workflow", workflow.to_string()),
            ],
        );
    }

    pub fn record_workflow_completed(&self, queue: &str, workflow: &str) {
        self.workflows_completed.add(
            1,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new("workflow", workflow.to_string()),
            ],
        );
    }

    pub fn record_workflow_failed(&self, queue: &str, workflow: &str, error_type: &str) {
        self.workflows_failed.add(
            1,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new("workflow", workflow.to_string()),
                KeyValue::new("error_type", error_type.to_string()),
            ],
        );
    }

    pub fn record_activity_executed(&self, workflow: &str, activity: &str) {
        self.activities_executed.add(
            1,
            &[
                KeyValue::new("workflow", workflow.to_string()),
                KeyValue::new("activity", activity.to_string()),
            ],
        );
    }
}
