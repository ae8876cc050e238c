use durable_greeter::GreeterClient;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

/// Create a client over the test pool for the given queue.
pub async fn create_client(pool: PgPool, queue: &str) -> GreeterClient {
    GreeterClient::builder()
        .pool(pool)
        .queue(queue)
        .build()
        .await
        .expect("Failed to create client")
}

/// Poll the run row until it reaches `state` or `timeout` elapses.
pub async fn wait_for_run_state(
    pool: &PgPool,
    workflow_id: Uuid,
    state: &str,
    timeout: Duration,
) -> Result<(), String> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let (current,): (String,) =
            sqlx::query_as("SELECT state FROM greeter.workflow_runs WHERE workflow_id = $1")
                .bind(workflow_id)
                .fetch_one(pool)
                .await
                .map_err(|e| format!("status query failed: {e}"))?;
        if current == state {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!(
                "run {workflow_id} did not reach `{state}` within {timeout:?} (last: `{current}`)"
            ));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
