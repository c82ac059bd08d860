// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Event emitter
//!
//! Sequences, optionally batches, and transmits event envelopes. Delivery is
//! tiered and best-effort: beacon first, detached keep-alive request second,
//! and any transmission error is swallowed - telemetry must never break the
//! page it instruments.
//!
//! The queue and sequence counter live behind one lock shared with the batch
//! timer task. Both the timer and a manual flush drain via `mem::take` under
//! that lock, so a timer firing concurrently with a flush cannot double-send.

use crate::config::ConfigStore;
use crate::event::{EventEnvelope, EventOptions};
use crate::identity::Identity;
use crate::page::PageContext;
use crate::transport::Transport;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What happened to an emit call. Purely for instrumentation; no outcome is
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Transmitted immediately. `beacon` reports whether the primary tier
    /// accepted the payload.
    Sent { beacon: bool },
    /// Appended to the batch queue.
    Queued,
    /// Dropped: no event endpoint configured.
    NoEndpoint,
}

#[derive(Default)]
struct EmitterState {
    queue: VecDeque<EventEnvelope>,
    seq: u64,
    timer: Option<JoinHandle<()>>,
}

/// Sequencing and delivery of discrete events. Cheap to clone; clones share
/// the queue, counter and timer, and read endpoints from the shared
/// configuration at the moment of transmission.
#[derive(Clone)]
pub struct EventEmitter {
    state: Arc<Mutex<EmitterState>>,
    transport: Arc<dyn Transport>,
    config: ConfigStore,
}

impl EventEmitter {
    pub fn new(transport: Arc<dyn Transport>, config: ConfigStore) -> Self {
        Self {
            state: Arc::new(Mutex::new(EmitterState::default())),
            transport,
            config,
        }
    }

    /// Build and dispatch one event.
    ///
    /// Identity fields are injected from the caller-resolved triple;
    /// timestamp, path and referrer default from the navigation context
    /// unless overridden. With batching enabled the envelope is queued and
    /// a single batch timer is armed; otherwise it is transmitted now.
    pub fn emit(
        &self,
        identity: &Identity,
        page: &PageContext,
        event_type: &str,
        opts: EventOptions,
    ) -> EmitOutcome {
        let config = self.config.snapshot();
        let Some(endpoint) = config.endpoints.event_url.clone() else {
            log::warn!("event '{}' dropped: no event endpoint configured", event_type);
            return EmitOutcome::NoEndpoint;
        };

        if config.batching.enabled {
            let interval = Duration::from_millis(config.batching.interval_ms);
            // Sequence assignment and enqueue share one critical section so
            // the queue stays ordered by seq.
            let mut state = self.lock();
            state.seq += 1;
            let envelope = EventEnvelope::build(identity, page, event_type, state.seq, opts);
            state.queue.push_back(envelope);
            if state.timer.is_none() {
                state.timer = self.arm_timer(interval);
            }
            EmitOutcome::Queued
        } else {
            let envelope = {
                let mut state = self.lock();
                state.seq += 1;
                EventEnvelope::build(identity, page, event_type, state.seq, opts)
            };
            let beacon = self.send(&endpoint, &envelope);
            EmitOutcome::Sent { beacon }
        }
    }

    /// Transmit one envelope through the delivery tiers. Returns whether the
    /// beacon tier accepted the payload.
    pub fn send(&self, endpoint: &str, envelope: &EventEnvelope) -> bool {
        match serde_json::to_vec(envelope) {
            Ok(body) => self.send_json(endpoint, body),
            Err(err) => {
                log::debug!("could not encode envelope: {}", err);
                false
            }
        }
    }

    /// Tiered delivery of a serialized JSON body: beacon first, then a
    /// detached keep-alive request whose result nobody awaits.
    pub fn send_json(&self, endpoint: &str, body: Vec<u8>) -> bool {
        if self.transport.send_beacon(endpoint, &body) {
            return true;
        }

        let request = self.transport.send_request(endpoint.to_string(), body);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = request.await {
                        log::debug!("event transmission failed: {}", err);
                    }
                });
            }
            // No runtime, no fallback tier. Best-effort means the event is
            // simply lost.
            Err(_) => log::debug!("no async runtime; keep-alive fallback dropped"),
        }
        false
    }

    /// Drain the queue and transmit everything in enqueue order, to the
    /// event endpoint as configured right now. A no-op on an empty queue;
    /// discards with a warning when no endpoint is configured.
    pub fn flush(&self) {
        let endpoint = self.config.snapshot().endpoints.event_url;
        self.flush_to(endpoint.as_deref());
    }

    fn flush_to(&self, endpoint: Option<&str>) {
        let drained = {
            let mut state = self.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            std::mem::take(&mut state.queue)
        };

        if drained.is_empty() {
            return;
        }

        let Some(endpoint) = endpoint else {
            log::warn!(
                "discarding {} queued events: no event endpoint configured",
                drained.len()
            );
            return;
        };

        for envelope in drained {
            self.send(endpoint, &envelope);
        }
    }

    /// Clear the queue, cancel any pending timer and reset the sequence
    /// counter. The next emitted event carries `seq == 1`.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.queue.clear();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.seq = 0;
    }

    /// Number of queued, untransmitted envelopes.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    fn arm_timer(&self, interval: Duration) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                // Events stay queued until a manual flush.
                log::debug!("no async runtime; batch timer not armed");
                return None;
            }
        };
        let emitter = self.clone();
        Some(handle.spawn(async move {
            tokio::time::sleep(interval).await;
            // Drop our own handle first so the flush does not abort us, then
            // deliver to whatever endpoint is configured at fire time.
            emitter.lock().timer = None;
            emitter.flush();
        }))
    }

    fn lock(&self) -> MutexGuard<'_, EmitterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
