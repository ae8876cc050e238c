use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Options for starting a workflow.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Maximum number of attempts before permanent failure (default: 3)
    pub max_attempts: Option<i32>,
}

/// Options for configuring a worker.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use durable_greeter::WorkerOptions;
///
/// let options = WorkerOptions {
///     concurrency: 4,
///     poll_interval: Duration::from_millis(250),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Unique worker identifier (default: hostname:pid)
    pub worker_id: Option<String>,

    /// Maximum parallel workflow executions (default: 1)
    pub concurrency: usize,

    /// Delay between polls when the queue is empty (default: 250ms)
    pub poll_interval: Duration,

    /// Run lease duration. Runs whose lease expires are reclaimed by the
    /// next poll (default: 60s).
    pub lease_timeout: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            worker_id: None,
            concurrency: 1,
            poll_interval: Duration::from_millis(250),
            lease_timeout: Duration::from_secs(60),
        }
    }
}

/// Options for waiting on workflow completion.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Maximum time to wait. If None, waits indefinitely.
    pub timeout: Option<Duration>,
    /// Interval between polls. Defaults to 250ms.
    pub poll_interval: Option<Duration>,
}

impl WaitOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            poll_interval: None,
        }
    }
}

/// Identity returned when a workflow is started.
#[derive(Debug, Clone)]
pub struct StartedWorkflow {
    pub workflow_id: Uuid,
    pub workflow_name: String,
}

/// Information about a permanently failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    pub name: String,
    pub message: String,
}

/// Terminal or in-flight status of a workflow run.
#[derive(Debug, Clone)]
pub enum WorkflowStatus<T = JsonValue> {
    Pending {
        enqueued_at: DateTime<Utc>,
        attempt: i32,
    },
    Running {
        started_at: DateTime<Utc>,
        attempt: i32,
    },
    Completed {
        output: T,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: FailureInfo,
        failed_at: DateTime<Utc>,
        attempts: i32,
    },
}

impl<T> WorkflowStatus<T> {
    /// True once the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed { .. } | WorkflowStatus::Failed { .. }
        )
    }
}

impl WorkflowStatus<JsonValue> {
    /// Deserialize the `Completed` output into a concrete type.
    pub fn try_into_typed<T: DeserializeOwned>(
        self,
    ) -> Result<WorkflowStatus<T>, serde_json::Error> {
        Ok(match self {
            WorkflowStatus::Pending {
                enqueued_at,
                attempt,
            } => WorkflowStatus::Pending {
                enqueued_at,
                attempt,
            },
            WorkflowStatus::Running {
                started_at,
                attempt,
            } => WorkflowStatus::Running {
                started_at,
                attempt,
            },
            WorkflowStatus::Completed {
                output,
                completed_at,
            } => WorkflowStatus::Completed {
                output: serde_json::from_value(output)?,
                completed_at,
            },
            WorkflowStatus::Failed {
                error,
                failed_at,
                attempts,
            } => WorkflowStatus::Failed {
                error,
                failed_at,
                attempts,
            },
        })
    }
}

/// A run claimed by a worker.
#[derive(Debug, Clone)]
pub struct ClaimedRun {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub input: JsonValue,
    pub attempt: i32,
    pub max_attempts: i32,
    pub trace_headers: HashMap<String, String>,
}

/// Internal: row returned by the claim query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ClaimedRunRow {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub input: JsonValue,
    pub attempt: i32,
    pub max_attempts: i32,
    pub trace_headers: Option<JsonValue>,
}

impl TryFrom<ClaimedRunRow> for ClaimedRun {
    type Error = serde_json::Error;

    fn try_from(row: ClaimedRunRow) -> Result<Self, Self::Error> {
        Ok(Self {
            workflow_id: row.workflow_id,
            workflow_name: row.workflow_name,
            input: row.input,
            attempt: row.attempt,
            max_attempts: row.max_attempts,
            trace_headers: row
                .trace_headers
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

/// Internal: row returned by the status query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct RunStatusRow {
    pub state: String,
    pub attempt: i32,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<JsonValue>,
    pub failure: Option<JsonValue>,
}

impl RunStatusRow {
    pub(crate) fn into_status(self) -> WorkflowStatus {
        match self.state.as_str() {
            "running" => WorkflowStatus::Running {
                started_at: self.started_at.unwrap_or(self.enqueued_at),
                attempt: self.attempt,
            },
            "completed" => WorkflowStatus::Completed {
                output: self.output.unwrap_or(JsonValue::Null),
                completed_at: self.completed_at.unwrap_or(self.enqueued_at),
            },
            "failed" => {
                let error = self
                    .failure
                    .and_then(|f| serde_json::from_value(f).ok())
                    .unwrap_or(FailureInfo {
                        name: "Error".to_string(),
                        message: "unknown failure".to_string(),
                    });
                WorkflowStatus::Failed {
                    error,
                    failed_at: self.completed_at.unwrap_or(self.enqueued_at),
                    attempts: self.attempt,
                }
            }
            _ => WorkflowStatus::Pending {
                enqueued_at: self.enqueued_at,
                attempt: self.attempt,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_status_is_terminal() {
        let status: WorkflowStatus = WorkflowStatus::Completed {
            output: serde_json::json!({"message": "Hello, temporal!"}),
            completed_at: Utc::now(),
        };
        assert!(status.is_terminal());

        let status: WorkflowStatus = WorkflowStatus::Pending {
            enqueued_at: Utc::now(),
            attempt: 0,
        };
        assert!(!status.is_terminal());
    }

    #[test]
    fn typed_conversion_deserializes_output() {
        #[derive(Debug, Deserialize)]
        struct Out {
            message: String,
        }

        let status: WorkflowStatus = WorkflowStatus::Completed {
            output: serde_json::json!({"message": "Hello, temporal!"}),
            completed_at: Utc::now(),
        };
        let typed: WorkflowStatus<Out> = status.try_into_typed().unwrap();
        match typed {
            WorkflowStatus::Completed { output, .. } => {
                assert_eq!(output.message, "Hello, temporal!")
            }
            other => panic!("expected completed, got {other:?}"),
        }
    }

    #[test]
    fn failure_json_parses_into_failure_info() {
        let row = RunStatusRow {
            state: "failed".to_string(),
            attempt: 3,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: Some(Utc::now()),
            output: None,
            failure: Some(serde_json::json!({"name": "Error", "message": "boom"})),
        };
        match row.into_status() {
            WorkflowStatus::Failed { error, attempts, .. } => {
                assert_eq!(error.message, "boom");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected failed, got {other:?}"),
        }
    }
}
