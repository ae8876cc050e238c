//! Long-running worker process: registers the greeting workflows and
//! processes runs until SIGINT/SIGTERM.

use durable_greeter::telemetry::Telemetry;
use durable_greeter::{
    Config, FancyGreetingWorkflow, GreeterClient, ShutdownCoordinator, SimpleGreetingWorkflow,
    WorkerOptions,
};

#[tokio::main]
async fn main() {
    let config = match Config::builder().build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("worker failed: {e}");
            std::process::exit(1);
        }
    };
    let telemetry = match Telemetry::init(&config) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("worker failed: {e}");
            std::process::exit(1);
        }
    };

    // Fatal errors still flush telemetry before the process exits, so the
    // spans and log records narrating the failure are exported. On the
    // clean path the coordinator already flushed and this is a no-op.
    let result = serve(&config, &telemetry).await;
    telemetry.shutdown().await;
    if let Err(e) = result {
        eprintln!("worker failed: {e:#}");
        std::process::exit(1);
    }
}

async fn serve(config: &Config, telemetry: &Telemetry) -> anyhow::Result<()> {
    let client = GreeterClient::from_config(config, telemetry).build().await?;
    client.register::<SimpleGreetingWorkflow>().await?;
    client.register::<FancyGreetingWorkflow>().await?;

    let worker = client
        .start_worker(WorkerOptions {
            concurrency: 4,
            ..Default::default()
        })
        .await?;

    let coordinator = ShutdownCoordinator::new();
    coordinator.wait_for_signal().await;
    coordinator.run(Some(worker), client, telemetry).await;

    Ok(())
}
