mod client;
mod config;
mod context;
mod error;
mod greeting;
mod shutdown;
pub mod telemetry;
mod types;
mod worker;
mod workflow;

// Re-export public API
pub use client::{GreeterClient, GreeterClientBuilder};
pub use config::{Config, ConfigBuilder, Protocol};
pub use context::WorkflowContext;
pub use error::{serialize_failure, GreeterError, GreeterResult, WorkflowResult};
pub use greeting::{
    format_name, pick_greeting, stamp, FancyGreetingWorkflow, GreetingInput, GreetingOutput,
    SimpleGreetingWorkflow, GREETINGS,
};
pub use shutdown::ShutdownCoordinator;
pub use types::{
    ClaimedRun, FailureInfo, StartOptions, StartedWorkflow, WaitOptions, WorkerOptions,
    WorkflowStatus,
};
pub use worker::GreeterWorker;
pub use workflow::Workflow;

// Re-export async_trait for convenience
pub use async_trait::async_trait;

/// Migrator for the run store schema. Also usable from `#[sqlx::test]`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("src/postgres/migrations");
