use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::WorkflowContext;
use crate::error::WorkflowResult;

/// Defines a workflow with typed input and output.
///
/// The worker will:
/// 1. Deserialize the stored input into `Input`
/// 2. Call `run()` with the typed input and a [`WorkflowContext`]
/// 3. Serialize the result back to JSON for storage
///
/// # Example
/// ```ignore
/// struct SimpleGreetingWorkflow;
///
/// #[async_trait]
/// impl Workflow for SimpleGreetingWorkflow {
///     const NAME: &'static str = "simple-greeting";
///     type Input = GreetingInput;
///     type Output = GreetingOutput;
///
///     async fn run(input: Self::Input, ctx: WorkflowContext) -> WorkflowResult<Self::Output> {
///         let message = ctx.activity("greet", || format!("Hello, {}!", input.name.trim()));
///         Ok(GreetingOutput { message })
///     }
/// }
/// ```
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Workflow name as stored in the run row. Unique across the process.
    const NAME: &'static str;

    /// Input type (must be JSON-serializable)
    type Input: Serialize + DeserializeOwned + Send;

    /// Output type (must be JSON-serializable)
    type Output: Serialize + DeserializeOwned + Send;

    /// Execute the workflow logic.
    ///
    /// Use `?` freely; errors propagate to the worker, which records them
    /// on the active span and retries while attempts remain.
    async fn run(input: Self::Input, ctx: WorkflowContext) -> WorkflowResult<Self::Output>;
}

/// Object-safe wrapper so heterogeneous workflows fit one registry.
/// Converts between the typed [`Workflow`] interface and JSON values.
#[async_trait]
pub trait ErasedWorkflow: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, input: JsonValue, ctx: WorkflowContext)
        -> WorkflowResult<JsonValue>;
}

#[async_trait]
impl<W: Workflow> ErasedWorkflow for PhantomData<W> {
    fn name(&self) -> &'static str {
        W::NAME
    }

    async fn execute(
        &self,
        input: JsonValue,
        ctx: WorkflowContext,
    ) -> WorkflowResult<JsonValue> {
        let typed_input: W::Input = serde_json::from_value(input)?;
        let output = W::run(typed_input, ctx).await?;
        Ok(serde_json::to_value(&output)?)
    }
}

/// Type alias for the workflow registry
pub type WorkflowRegistry = std::collections::HashMap<String, Arc<dyn ErasedWorkflow>>;
