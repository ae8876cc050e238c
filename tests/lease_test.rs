#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::helpers::create_client;
use common::workflows::{attempts_for, StallParams, StallThenFailWorkflow};
use durable_greeter::{WaitOptions, WorkerOptions, WorkflowStatus, MIGRATOR};
use sqlx::PgPool;
use std::time::Duration;

/// A run whose lease expired is reclaimed and re-executed; the original
/// attempt finishes later and must not overwrite the terminal row.
#[sqlx::test(migrator = "MIGRATOR")]
#[ignore = "requires a running Postgres"]
async fn stale_lease_holder_cannot_overwrite_terminal_run(pool: PgPool) -> sqlx::Result<()> {
    let client = create_client(pool.clone(), "lease_stale").await;
    client.register::<StallThenFailWorkflow>().await.unwrap();

    let started = client
        .start::<StallThenFailWorkflow>(StallParams {
            key: "lease_stale".to_string(),
            stall_ms: 3_000,
        })
        .await
        .unwrap();

    // Lease far shorter than the first attempt's stall, and a second permit
    // so the reclaimed attempt can run while the stale one is still going.
    let worker = client
        .start_worker(WorkerOptions {
            concurrency: 2,
            poll_interval: Duration::from_millis(50),
            lease_timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .await
        .unwrap();

    // The reclaimed second attempt completes while the first still stalls.
    let output = client
        .wait_for_result::<StallThenFailWorkflow>(
            started.workflow_id,
            WaitOptions::with_timeout(Duration::from_secs(10)),
        )
        .await
        .unwrap();
    assert_eq!(output, "completed on attempt 2");
    assert_eq!(attempts_for("lease_stale"), 2);

    // Outlive the stale attempt's failure path, then confirm the terminal
    // row was left alone.
    tokio::time::sleep(Duration::from_secs(4)).await;

    let status = client.status(started.workflow_id).await.unwrap();
    match status {
        WorkflowStatus::Completed { output, .. } => {
            assert_eq!(output, serde_json::json!("completed on attempt 2"));
        }
        other => panic!("terminal run was overwritten: {other:?}"),
    }

    let (state, failure): (String, Option<serde_json::Value>) = sqlx::query_as(
        "SELECT state, failure FROM greeter.workflow_runs WHERE workflow_id = $1",
    )
    .bind(started.workflow_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(state, "completed");
    assert!(failure.is_none(), "stale failure was persisted: {failure:?}");

    worker.shutdown().await;
    Ok(())
}
