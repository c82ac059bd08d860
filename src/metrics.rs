// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Performance metric model and the observation seam.
//!
//! Metrics are long-tail, push-based signals. Some fire exactly once
//! (time-to-first-byte, first paint); others update repeatedly and only the
//! latest value counts (largest contentful paint, cumulative layout shift).
//! A metric whose signal never fires is simply absent from the result set -
//! never an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// The performance signals this collector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Time to first byte (ms).
    Ttfb,
    /// DOM interactive (ms).
    DomInteractive,
    /// First paint (ms).
    FirstPaint,
    /// First contentful paint (ms).
    FirstContentfulPaint,
    /// Largest contentful paint (ms). Updates until engagement settles.
    LargestContentfulPaint,
    /// First input delay (ms).
    FirstInputDelay,
    /// Cumulative layout shift (unitless score). Updates for the page's life.
    CumulativeLayoutShift,
}

impl MetricKind {
    /// Every known kind.
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Ttfb,
        MetricKind::DomInteractive,
        MetricKind::FirstPaint,
        MetricKind::FirstContentfulPaint,
        MetricKind::LargestContentfulPaint,
        MetricKind::FirstInputDelay,
        MetricKind::CumulativeLayoutShift,
    ];

    /// Wire / configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Ttfb => "ttfb",
            MetricKind::DomInteractive => "dom_interactive",
            MetricKind::FirstPaint => "first_paint",
            MetricKind::FirstContentfulPaint => "first_contentful_paint",
            MetricKind::LargestContentfulPaint => "largest_contentful_paint",
            MetricKind::FirstInputDelay => "first_input_delay",
            MetricKind::CumulativeLayoutShift => "cumulative_layout_shift",
        }
    }

    /// Whether this signal fires exactly once. Non-single-shot kinds keep
    /// updating, so their presence never justifies resolving early.
    pub fn is_single_shot(&self) -> bool {
        !matches!(
            self,
            MetricKind::LargestContentfulPaint | MetricKind::CumulativeLayoutShift
        )
    }
}

/// One observed value, pushed by the signal source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub kind: MetricKind,
    pub value: f64,
}

impl MetricSample {
    pub fn new(kind: MetricKind, value: f64) -> Self {
        Self { kind, value }
    }
}

/// Sparse map of observed metrics. Mutated incrementally as observers fire,
/// frozen when the orchestration resolves.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricSet {
    #[serde(flatten)]
    values: HashMap<MetricKind, f64>,
    #[serde(skip)]
    finalized: bool,
}

impl MetricSet {
    /// Record a sample, keeping only the latest value per kind. Returns
    /// whether this was the first observation of that kind. No-op once
    /// finalized.
    pub fn record(&mut self, sample: MetricSample) -> bool {
        if self.finalized {
            return false;
        }
        self.values.insert(sample.kind, sample.value).is_none()
    }

    /// Observed value, or `None` for "not yet observed".
    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.values.get(&kind).copied()
    }

    /// Number of observed metrics.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Freeze the set. Later samples are discarded.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_final(&self) -> bool {
        self.finalized
    }
}

/// Handle to registered observers. `disconnect` must be idempotent: the
/// orchestrator calls it exactly once, but late host callbacks may race it.
pub trait ObserverHandle: Send {
    fn disconnect(&mut self);
}

/// Push-based source of performance signals, supplied by the host.
pub trait SignalSource: Send + Sync {
    /// Register observers for `kinds`, delivering samples through `sender`.
    ///
    /// Returns `None` when the observation mechanism is unavailable in this
    /// host; the orchestrator then resolves immediately with all values
    /// absent.
    fn subscribe(
        &self,
        kinds: &[MetricKind],
        sender: mpsc::UnboundedSender<MetricSample>,
    ) -> Option<Box<dyn ObserverHandle>>;
}

/// A host without any observation mechanism.
#[derive(Debug, Default)]
pub struct UnavailableSource;

impl SignalSource for UnavailableSource {
    fn subscribe(
        &self,
        _kinds: &[MetricKind],
        _sender: mpsc::UnboundedSender<MetricSample>,
    ) -> Option<Box<dyn ObserverHandle>> {
        None
    }
}

/// Observer handle backed by a spawned task; disconnecting aborts it.
pub struct SpawnedObserver {
    task: Option<JoinHandle<()>>,
}

impl SpawnedObserver {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }
}

impl ObserverHandle for SpawnedObserver {
    fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Replay source emitting scripted samples after fixed delays. Used by tests
/// and by hosts that feed pre-recorded signals.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    samples: Vec<(Duration, MetricSample)>,
}

impl ScriptedSource {
    pub fn new(samples: Vec<(Duration, MetricSample)>) -> Self {
        Self { samples }
    }

    /// Add a sample fired `delay` after subscription.
    pub fn push(&mut self, delay: Duration, sample: MetricSample) {
        self.samples.push((delay, sample));
    }
}

impl SignalSource for ScriptedSource {
    fn subscribe(
        &self,
        kinds: &[MetricKind],
        sender: mpsc::UnboundedSender<MetricSample>,
    ) -> Option<Box<dyn ObserverHandle>> {
        let mut script: Vec<(Duration, MetricSample)> = self
            .samples
            .iter()
            .filter(|(_, sample)| kinds.contains(&sample.kind))
            .copied()
            .collect();
        script.sort_by_key(|(delay, _)| *delay);

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for (delay, sample) in script {
                tokio::time::sleep_until(start + delay).await;
                if sender.send(sample).is_err() {
                    break;
                }
            }
        });
        Some(Box::new(SpawnedObserver::new(task)))
    }
}
