//! One-shot starter process: enqueues a greeting workflow, waits for the
//! result, and prints the message.
//!
//! Usage: `greeter-starter [name] [--simple]`

use std::time::Duration;

use durable_greeter::telemetry::Telemetry;
use durable_greeter::{
    Config, FancyGreetingWorkflow, GreeterClient, GreetingInput, SimpleGreetingWorkflow,
    WaitOptions, Workflow,
};

#[tokio::main]
async fn main() {
    let config = match Config::builder().build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("starter failed: {e}");
            std::process::exit(1);
        }
    };
    let telemetry = match Telemetry::init(&config) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("starter failed: {e}");
            std::process::exit(1);
        }
    };

    // Flush before exiting either way: a failed start or a failed run has
    // already recorded spans worth exporting.
    let result = run(&config, &telemetry).await;
    telemetry.shutdown().await;
    match result {
        Ok(message) => println!("{message}"),
        Err(e) => {
            eprintln!("starter failed: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(config: &Config, telemetry: &Telemetry) -> anyhow::Result<String> {
    let mut name = "World".to_string();
    let mut simple = false;
    for arg in std::env::args().skip(1) {
        if arg == "--simple" {
            simple = true;
        } else {
            name = arg;
        }
    }

    let client = GreeterClient::from_config(config, telemetry).build().await?;
    client.register::<SimpleGreetingWorkflow>().await?;
    client.register::<FancyGreetingWorkflow>().await?;

    let input = GreetingInput { name };
    let wait = WaitOptions::with_timeout(Duration::from_secs(30));

    let result = if simple {
        let started = client.start::<SimpleGreetingWorkflow>(input).await?;
        tracing::info!(workflow_id = %started.workflow_id, "started {}", SimpleGreetingWorkflow::NAME);
        client
            .wait_for_result::<SimpleGreetingWorkflow>(started.workflow_id, wait)
            .await
    } else {
        let started = client.start::<FancyGreetingWorkflow>(input).await?;
        tracing::info!(workflow_id = %started.workflow_id, "started {}", FancyGreetingWorkflow::NAME);
        client
            .wait_for_result::<FancyGreetingWorkflow>(started.workflow_id, wait)
            .await
    };

    client.close().await;
    Ok(result?.message)
}
