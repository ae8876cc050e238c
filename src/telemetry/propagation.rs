//! Trace context propagation between the starting client and the executing
//! worker.
//!
//! The starter's span context is injected into the run row's header map at
//! start time and restored when a worker picks the run up, so the
//! `RunWorkflow` span parents to the original `StartWorkflow` span even
//! across processes. Uses the globally installed composite propagator, so
//! baggage travels with the trace context.

use std::collections::HashMap;

use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::Context;
use tracing_opentelemetry::OpenTelemetrySpanExt;

struct HeaderInjector<'a>(&'a mut HashMap<String, String>);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

struct HeaderExtractor<'a>(&'a HashMap<String, String>);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// Capture the current span's context into a header map. Called by the
/// client when a workflow is started.
pub fn inject_trace_context(headers: &mut HashMap<String, String>) {
    let cx = tracing::Span::current().context();
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&cx, &mut HeaderInjector(headers));
    });
}

/// Restore a previously captured context from a header map. Called by the
/// worker before opening the `RunWorkflow` span.
pub fn extract_trace_context(headers: &HashMap<String, String>) -> Context {
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(headers))
    })
}
