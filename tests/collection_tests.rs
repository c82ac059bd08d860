// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Collection pipeline scenarios: metric races, visibility truncation,
//! snapshot delivery.

use pagetrace::{
    visibility_channel, MetricKind, MetricSample, ScriptedSource, StepStatus, Telemetry,
    Visibility,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_partial_metrics_survive_backgrounding() {
    let source = ScriptedSource::new(vec![
        (
            Duration::from_millis(20),
            MetricSample::new(MetricKind::Ttfb, 110.0),
        ),
        (
            Duration::from_millis(30),
            MetricSample::new(MetricKind::CumulativeLayoutShift, 0.04),
        ),
        // Fires long after the page is hidden.
        (
            Duration::from_secs(20),
            MetricSample::new(MetricKind::LargestContentfulPaint, 2500.0),
        ),
    ]);
    let (visibility_tx, visibility_rx) = visibility_channel(Visibility::Visible);
    let mut telemetry = Telemetry::builder()
        .signal_source(Arc::new(source))
        .visibility(visibility_rx)
        .build();
    telemetry.configure(json!({"metrics": {"timeout_ms": 60_000}}));

    let collection = telemetry.collect_metrics(&[
        MetricKind::Ttfb,
        MetricKind::CumulativeLayoutShift,
        MetricKind::LargestContentfulPaint,
    ]);
    let background = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = visibility_tx.send(Visibility::Hidden);
    };

    let started = tokio::time::Instant::now();
    let (set, _) = tokio::join!(collection, background);

    // Hidden beat the 60s timeout by a wide margin.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(set.value(MetricKind::Ttfb), Some(110.0));
    assert_eq!(set.value(MetricKind::CumulativeLayoutShift), Some(0.04));
    assert_eq!(set.value(MetricKind::LargestContentfulPaint), None);
}

#[tokio::test(start_paused = true)]
async fn test_per_metric_override_extends_the_shared_timer() {
    let source = ScriptedSource::new(vec![(
        Duration::from_millis(400),
        MetricSample::new(MetricKind::LargestContentfulPaint, 1900.0),
    )]);
    let mut telemetry = Telemetry::builder()
        .signal_source(Arc::new(source))
        .build();
    telemetry.configure(json!({
        "metrics": {
            "timeout_ms": 100,
            "overrides": {"largest_contentful_paint": 1000}
        }
    }));

    let set = telemetry
        .collect_metrics(&[MetricKind::Ttfb, MetricKind::LargestContentfulPaint])
        .await;

    // The LCP override stretched the shared bound past the 400ms sample.
    assert_eq!(
        set.value(MetricKind::LargestContentfulPaint),
        Some(1900.0)
    );
}

#[tokio::test(start_paused = true)]
async fn test_full_collect_produces_a_complete_trace() {
    let source = ScriptedSource::new(vec![(
        Duration::from_millis(5),
        MetricSample::new(MetricKind::FirstContentfulPaint, 600.0),
    )]);
    let mut telemetry = Telemetry::builder()
        .signal_source(Arc::new(source))
        .page(pagetrace::PageContext {
            user_agent: "TestAgent/1.0".to_string(),
            language: "en-US".to_string(),
            screen_width: 1920,
            screen_height: 1080,
            ..pagetrace::PageContext::default()
        })
        .page_errors(vec!["ReferenceError: boom".to_string()])
        .build();
    telemetry.configure(json!({"metrics": {"timeout_ms": 50}}));

    let snapshot = telemetry.collect().await;

    let browser = snapshot.context.browser.expect("device module on");
    assert_eq!(browser.user_agent, "TestAgent/1.0");
    let screen = snapshot.context.screen.expect("device module on");
    assert_eq!((screen.width, screen.height), (1920, 1080));
    let network = snapshot.context.network.expect("network module on");
    assert!(network.online);
    assert_eq!(snapshot.context.errors, vec!["ReferenceError: boom"]);
    assert_eq!(
        snapshot.metrics.value(MetricKind::FirstContentfulPaint),
        Some(600.0)
    );

    // Every pipeline stage shows up in the trace, in order.
    let names: Vec<&str> = snapshot
        .trace
        .steps
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["identity", "device", "network", "fingerprint", "errors", "performance"]
    );
    assert!(snapshot
        .trace
        .steps
        .iter()
        .all(|s| s.status != StepStatus::Error));
    assert!(snapshot.trace.duration_ms >= 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_incremental_observation_callbacks_fire_before_resolution() {
    use pagetrace::{CollectRequest, Orchestrator, UnavailableSource};
    use std::sync::atomic::{AtomicU64, Ordering};

    let source = ScriptedSource::new(vec![
        (
            Duration::from_millis(10),
            MetricSample::new(MetricKind::Ttfb, 95.0),
        ),
        (
            Duration::from_millis(25),
            MetricSample::new(MetricKind::FirstPaint, 310.0),
        ),
    ]);
    let (tx, rx) = visibility_channel(Visibility::Visible);
    let orchestrator = Orchestrator::new(Arc::new(source), rx);

    static LAST_ELAPSED_MS: AtomicU64 = AtomicU64::new(0);
    LAST_ELAPSED_MS.store(0, Ordering::SeqCst);

    let request = CollectRequest::new(
        &[MetricKind::Ttfb, MetricKind::FirstPaint],
        Duration::from_millis(200),
    )
    .on_observed(Box::new(|_kind, elapsed| {
        LAST_ELAPSED_MS.store(elapsed.as_millis() as u64, Ordering::SeqCst);
    }));

    let set = orchestrator.collect(request).await;
    drop(tx);

    assert_eq!(set.len(), 2);
    // The second (and last) callback fired at the FirstPaint sample, well
    // before the 200ms bound.
    let last = LAST_ELAPSED_MS.load(Ordering::SeqCst);
    assert!((25..200).contains(&last), "elapsed was {}ms", last);

    // Unrelated: an orchestrator over an unavailable source stays inert.
    let (_tx2, rx2) = visibility_channel(Visibility::Visible);
    let inert = Orchestrator::new(Arc::new(UnavailableSource), rx2);
    let empty = inert
        .collect(CollectRequest::new(&[MetricKind::Ttfb], Duration::from_secs(5)))
        .await;
    assert!(empty.is_empty());
}
