//! Workflow types used across integration tests.

use durable_greeter::{async_trait, Workflow, WorkflowContext, WorkflowResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Per-key attempt counters so parallel tests do not interfere.
fn attempt_counters() -> &'static Mutex<HashMap<String, Arc<AtomicU32>>> {
    static COUNTERS: OnceLock<Mutex<HashMap<String, Arc<AtomicU32>>>> = OnceLock::new();
    COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn counter_for(key: &str) -> Arc<AtomicU32> {
    let mut counters = attempt_counters().lock().unwrap();
    counters
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(AtomicU32::new(0)))
        .clone()
}

/// How many times a flaky workflow body ran for `key`.
pub fn attempts_for(key: &str) -> u32 {
    counter_for(key).load(Ordering::SeqCst)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlakyParams {
    /// Unique per test, used to track attempts across retries.
    pub key: String,
    /// Number of leading attempts that fail.
    pub fail_times: u32,
}

/// Fails its first `fail_times` attempts, then succeeds.
pub struct FlakyWorkflow;

#[async_trait]
impl Workflow for FlakyWorkflow {
    const NAME: &'static str = "flaky";
    type Input = FlakyParams;
    type Output = String;

    async fn run(input: Self::Input, _ctx: WorkflowContext) -> WorkflowResult<Self::Output> {
        let attempt = counter_for(&input.key).fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= input.fail_times {
            anyhow::bail!("flaky failure on attempt {attempt}");
        }
        Ok(format!("succeeded on attempt {attempt}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StallParams {
    /// Unique per test, used to track attempts across retries.
    pub key: String,
    /// How long the first attempt holds its claim before failing.
    pub stall_ms: u64,
}

/// First attempt outlives its lease (sleeps, then fails); every later
/// attempt completes immediately. Used to drive lease-expiry reclaim.
pub struct StallThenFailWorkflow;

#[async_trait]
impl Workflow for StallThenFailWorkflow {
    const NAME: &'static str = "stall-then-fail";
    type Input = StallParams;
    type Output = String;

    async fn run(input: Self::Input, _ctx: WorkflowContext) -> WorkflowResult<Self::Output> {
        let attempt = counter_for(&input.key).fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == 1 {
            tokio::time::sleep(std::time::Duration::from_millis(input.stall_ms)).await;
            anyhow::bail!("stalled past the lease on attempt {attempt}");
        }
        Ok(format!("completed on attempt {attempt}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailingParams {
    pub message: String,
}

/// Always fails with the given message.
pub struct AlwaysFailsWorkflow;

#[async_trait]
impl Workflow for AlwaysFailsWorkflow {
    const NAME: &'static str = "always-fails";
    type Input = FailingParams;
    type Output = ();

    async fn run(input: Self::Input, _ctx: WorkflowContext) -> WorkflowResult<Self::Output> {
        anyhow::bail!("{}", input.message)
    }
}
