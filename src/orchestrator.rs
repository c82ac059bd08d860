// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Metric collection orchestration.
//!
//! One collection call races three settlement paths: the sample stream, a
//! shared timeout, and the page-visibility signal flipping to hidden. The
//! race resolves exactly once; registered observers are disconnected exactly
//! once regardless of which path won. If the host has no observation
//! mechanism at all, collection resolves immediately with every metric
//! absent - it never hangs.

use crate::metrics::{MetricKind, MetricSet, SignalSource};
use crate::page::{Visibility, VisibilityWatch};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Callback fired the moment a metric is first observed, carrying the
/// elapsed time since collection start.
pub type ObservedCallback = Box<dyn Fn(MetricKind, Duration) + Send>;

/// One metric collection call.
pub struct CollectRequest {
    kinds: Vec<MetricKind>,
    timeout: Duration,
    on_observed: Option<ObservedCallback>,
}

impl CollectRequest {
    /// Request the given kinds under a shared timeout. Duplicate kinds are
    /// collapsed, order preserved.
    pub fn new(kinds: &[MetricKind], timeout: Duration) -> Self {
        let mut seen = HashSet::new();
        let kinds = kinds
            .iter()
            .copied()
            .filter(|k| seen.insert(*k))
            .collect();
        Self {
            kinds,
            timeout,
            on_observed: None,
        }
    }

    /// Fire `callback` when each metric individually resolves, so consumers
    /// can react incrementally instead of waiting for the whole set.
    pub fn on_observed(mut self, callback: ObservedCallback) -> Self {
        self.on_observed = Some(callback);
        self
    }
}

/// Runs collection calls against a signal source and the visibility signal.
///
/// Overlapping calls are independent: each gets its own channel, timer and
/// observer registration.
pub struct Orchestrator {
    source: Arc<dyn SignalSource>,
    visibility: VisibilityWatch,
}

impl Orchestrator {
    pub fn new(source: Arc<dyn SignalSource>, visibility: VisibilityWatch) -> Self {
        Self { source, visibility }
    }

    /// Collect the requested metrics, resolving on the first of: timeout,
    /// visibility-hidden, source hang-up, or (when every requested kind is
    /// single-shot) all kinds observed. Returns the frozen result set.
    pub async fn collect(&self, request: CollectRequest) -> MetricSet {
        let mut set = MetricSet::default();

        if request.kinds.is_empty() {
            set.finalize();
            return set;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let Some(mut observer) = self.source.subscribe(&request.kinds, tx) else {
            set.finalize();
            return set;
        };

        let started = Instant::now();
        // Early settlement on "all observed" only applies when no requested
        // kind keeps updating after its first sample.
        let all_single_shot = request.kinds.iter().all(|k| k.is_single_shot());
        let mut observed: HashSet<MetricKind> = HashSet::new();

        let mut visibility = self.visibility.clone();
        let mut visibility_open = true;

        let deadline = tokio::time::sleep(request.timeout);
        tokio::pin!(deadline);

        let mut resolved = false;
        while !resolved {
            tokio::select! {
                sample = rx.recv() => {
                    match sample {
                        Some(sample) => {
                            if !request.kinds.contains(&sample.kind) {
                                continue;
                            }
                            if set.record(sample) {
                                observed.insert(sample.kind);
                                if let Some(callback) = &request.on_observed {
                                    callback(sample.kind, started.elapsed());
                                }
                            }
                            if all_single_shot && observed.len() == request.kinds.len() {
                                resolved = true;
                            }
                        }
                        // Source hung up; nothing more will ever arrive.
                        None => resolved = true,
                    }
                }
                _ = &mut deadline => {
                    resolved = true;
                }
                changed = visibility.changed(), if visibility_open => {
                    match changed {
                        Ok(()) => {
                            if *visibility.borrow() == Visibility::Hidden {
                                resolved = true;
                            }
                        }
                        // Host dropped the sender; stop polling this branch.
                        Err(_) => visibility_open = false,
                    }
                }
            }
        }

        observer.disconnect();
        set.finalize();
        set
    }
}
