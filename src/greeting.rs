//! The demo workload: greeting activities and the two workflow variants.
//!
//! Activities are pure string formatting; the interesting part is the span
//! and counter scaffolding they run under, not the computation.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::context::WorkflowContext;
use crate::error::WorkflowResult;
use crate::workflow::Workflow;

/// Greeting words the fancy variant picks from. "Hello" stays first so the
/// simple variant and the docs agree on the canonical greeting.
pub const GREETINGS: &[&str] = &["Hello", "Welcome", "Howdy", "G'day"];

/// Trim surrounding whitespace and capitalize the first letter.
///
/// `"  bob  "` becomes `"Bob"`.
pub fn format_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Pick a greeting word and address `name` with it.
pub fn pick_greeting(name: &str) -> String {
    let mut rng = rand::thread_rng();
    // GREETINGS is non-empty, so choose cannot return None.
    let word = GREETINGS.choose(&mut rng).unwrap_or(&GREETINGS[0]);
    format!("{word}, {name}!")
}

/// Prefix a message with a bracketed RFC 3339 timestamp.
pub fn stamp(message: &str) -> String {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    format!("[{now}] {message}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreetingInput {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreetingOutput {
    pub message: String,
}

/// Trim-and-prefix variant: one activity, fixed greeting.
pub struct SimpleGreetingWorkflow;

#[async_trait]
impl Workflow for SimpleGreetingWorkflow {
    const NAME: &'static str = "simple-greeting";
    type Input = GreetingInput;
    type Output = GreetingOutput;

    async fn run(input: Self::Input, ctx: WorkflowContext) -> WorkflowResult<Self::Output> {
        let message = ctx.activity("greet", || format!("Hello, {}!", input.name.trim()));
        Ok(GreetingOutput { message })
    }
}

/// Capitalize + random greeting + timestamp variant: three sequential
/// activities, mirroring the three-step shape of the original demo.
pub struct FancyGreetingWorkflow;

#[async_trait]
impl Workflow for FancyGreetingWorkflow {
    const NAME: &'static str = "fancy-greeting";
    type Input = GreetingInput;
    type Output = GreetingOutput;

    async fn run(input: Self::Input, ctx: WorkflowContext) -> WorkflowResult<Self::Output> {
        let name = ctx.activity("format_name", || format_name(&input.name));
        let greeting = ctx.activity("pick_greeting", || pick_greeting(&name));
        let message = ctx.activity("stamp", || stamp(&greeting));
        Ok(GreetingOutput { message })
    }
}
