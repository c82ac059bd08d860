// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Collection profiler
//!
//! Wraps pipeline steps with start/end timestamps and status, producing a
//! structured trace for tuning collection latency. The profiler is
//! diagnostic tooling, not a failure boundary: an error inside a step is
//! recorded and then re-raised unchanged.

use crate::event::now_millis;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

/// Outcome of one profiled step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Error,
    Skipped,
}

/// One entry in a profile trace.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileStep {
    pub name: String,
    pub status: StepStatus,
    /// Wall-clock start (epoch ms).
    pub start_ms: i64,
    /// Wall-clock end (epoch ms).
    pub end_ms: i64,
    /// Monotonic duration in milliseconds.
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// The completed trace for one collection call. Immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileTrace {
    pub label: String,
    pub steps: Vec<ProfileStep>,
    pub start_ms: i64,
    pub end_ms: i64,
    pub duration_ms: f64,
}

/// Accumulates steps for one profiled run.
pub struct Profiler {
    label: String,
    started: Instant,
    start_ms: i64,
    steps: Vec<ProfileStep>,
}

impl Profiler {
    /// Begin a profiled run.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
            start_ms: now_millis(),
            steps: Vec::new(),
        }
    }

    /// Run an infallible step.
    pub fn run<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let (start_ms, begin) = (now_millis(), Instant::now());
        let value = f();
        self.push(name, StepStatus::Ok, start_ms, begin, None, None);
        value
    }

    /// Run a fallible step. The error's message is recorded and the `Err`
    /// is returned to the caller unchanged.
    pub fn step<T, E: Display>(
        &mut self,
        name: &str,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let (start_ms, begin) = (now_millis(), Instant::now());
        let result = f();
        self.record(name, start_ms, begin, &result, None);
        result
    }

    /// Like [`step`](Self::step), with static metadata attached.
    pub fn step_meta<T, E: Display>(
        &mut self,
        name: &str,
        meta: Value,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let (start_ms, begin) = (now_millis(), Instant::now());
        let result = f();
        self.record(name, start_ms, begin, &result, Some(meta));
        result
    }

    /// Like [`step`](Self::step), with metadata computed lazily from the
    /// successful result.
    pub fn step_mapped<T, E: Display>(
        &mut self,
        name: &str,
        f: impl FnOnce() -> Result<T, E>,
        meta_of: impl FnOnce(&T) -> Value,
    ) -> Result<T, E> {
        let (start_ms, begin) = (now_millis(), Instant::now());
        let result = f();
        let meta = result.as_ref().ok().map(meta_of);
        self.record(name, start_ms, begin, &result, meta);
        result
    }

    /// Run an infallible asynchronous step.
    pub async fn run_async<T>(&mut self, name: &str, fut: impl Future<Output = T>) -> T {
        let (start_ms, begin) = (now_millis(), Instant::now());
        let value = fut.await;
        self.push(name, StepStatus::Ok, start_ms, begin, None, None);
        value
    }

    /// Run a fallible asynchronous step.
    pub async fn step_async<T, E: Display>(
        &mut self,
        name: &str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, E> {
        let (start_ms, begin) = (now_millis(), Instant::now());
        let result = fut.await;
        self.record(name, start_ms, begin, &result, None);
        result
    }

    /// Record a zero-duration skipped step for a branch not taken, so traces
    /// stay complete when features are disabled.
    pub fn skip(&mut self, name: &str, meta: Option<Value>) {
        let stamp = now_millis();
        self.steps.push(ProfileStep {
            name: name.to_string(),
            status: StepStatus::Skipped,
            start_ms: stamp,
            end_ms: stamp,
            duration_ms: 0.0,
            error: None,
            metadata: meta,
        });
    }

    /// Finish the run and return the accumulated trace.
    pub fn finish(self) -> ProfileTrace {
        let duration = self.started.elapsed();
        ProfileTrace {
            label: self.label,
            steps: self.steps,
            start_ms: self.start_ms,
            end_ms: now_millis(),
            duration_ms: duration.as_secs_f64() * 1000.0,
        }
    }

    fn record<T, E: Display>(
        &mut self,
        name: &str,
        start_ms: i64,
        begin: Instant,
        result: &Result<T, E>,
        meta: Option<Value>,
    ) {
        match result {
            Ok(_) => self.push(name, StepStatus::Ok, start_ms, begin, None, meta),
            Err(err) => self.push(
                name,
                StepStatus::Error,
                start_ms,
                begin,
                Some(err.to_string()),
                meta,
            ),
        }
    }

    fn push(
        &mut self,
        name: &str,
        status: StepStatus,
        start_ms: i64,
        begin: Instant,
        error: Option<String>,
        metadata: Option<Value>,
    ) {
        let duration = begin.elapsed();
        self.steps.push(ProfileStep {
            name: name.to_string(),
            status,
            start_ms,
            end_ms: now_millis(),
            duration_ms: duration.as_secs_f64() * 1000.0,
            error,
            metadata,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_step_recorded() {
        let mut profiler = Profiler::start("test");
        let value = profiler
            .step("double", || Ok::<_, String>(21 * 2))
            .expect("step succeeds");
        assert_eq!(value, 42);

        let trace = profiler.finish();
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].name, "double");
        assert_eq!(trace.steps[0].status, StepStatus::Ok);
        assert!(trace.steps[0].error.is_none());
    }

    #[test]
    fn test_error_recorded_and_propagated() {
        let mut profiler = Profiler::start("test");
        let result: Result<(), String> = profiler.step("boom", || Err("went wrong".to_string()));
        assert_eq!(result, Err("went wrong".to_string()));

        let trace = profiler.finish();
        assert_eq!(trace.steps[0].status, StepStatus::Error);
        assert_eq!(trace.steps[0].error.as_deref(), Some("went wrong"));
    }

    #[test]
    fn test_skip_records_zero_duration() {
        let mut profiler = Profiler::start("test");
        profiler.skip("fingerprint", Some(json!({"enabled": false})));

        let trace = profiler.finish();
        assert_eq!(trace.steps[0].status, StepStatus::Skipped);
        assert_eq!(trace.steps[0].duration_ms, 0.0);
        assert_eq!(trace.steps[0].metadata, Some(json!({"enabled": false})));
    }

    #[test]
    fn test_lazy_metadata_from_result() {
        let mut profiler = Profiler::start("test");
        let _ = profiler.step_mapped(
            "count",
            || Ok::<_, String>(vec![1, 2, 3]),
            |items| json!({"count": items.len()}),
        );

        let trace = profiler.finish();
        assert_eq!(trace.steps[0].metadata, Some(json!({"count": 3})));
    }

    #[tokio::test]
    async fn test_async_step() {
        let mut profiler = Profiler::start("test");
        let value = profiler.run_async("wait", async { 7 }).await;
        assert_eq!(value, 7);

        let trace = profiler.finish();
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(trace.steps[0].status, StepStatus::Ok);
    }

    #[test]
    fn test_trace_is_ordered_and_serializable() {
        let mut profiler = Profiler::start("collect");
        profiler.run("first", || ());
        profiler.skip("second", None);
        profiler.run("third", || ());

        let trace = profiler.finish();
        let names: Vec<&str> = trace.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(trace.label, "collect");
        assert!(trace.duration_ms >= 0.0);

        let json = serde_json::to_string(&trace).expect("serializes");
        assert!(json.contains("skipped"));
    }
}
