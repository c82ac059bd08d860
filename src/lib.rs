// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! # Pagetrace - Client-side visitor telemetry
//!
//! Pseudonymous visitor/session/pageview identity, asynchronous metric
//! collection, and best-effort event delivery for pages that can be torn
//! down at any moment.
//!
//! ## Key properties
//!
//! - **Never fatal**: every missing host capability degrades to a
//!   documented fallback; telemetry must not break the page it instruments
//! - **Teardown-aware**: metric collection races a timeout and the page
//!   visibility signal; delivery degrades from beacon to detached request
//! - **Best-effort delivery**: fire-and-forget, no retries, in-order flush
//! - **One owning instance per embedding**: no process-wide globals
//!
//! ## Quick start
//!
//! ```rust
//! use pagetrace::{EventOptions, MemoryTransport, Telemetry};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let transport = MemoryTransport::new();
//! let mut telemetry = Telemetry::builder()
//!     .transport(Arc::new(transport.clone()))
//!     .build();
//!
//! telemetry.configure(json!({
//!     "endpoints": {"event_url": "https://example.test/event"}
//! }));
//!
//! telemetry.emit_event("click", EventOptions::with_payload(json!({"x": 1})));
//!
//! let sent = transport.envelopes();
//! assert_eq!(sent.len(), 1);
//! assert_eq!(sent[0].event_type, "click");
//! assert_eq!(sent[0].seq, 1);
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: two-horizon storage adapter with memory fallback
//! - [`identity`]: visitor / session / pageview identifiers
//! - [`config`]: deep-merge configuration store
//! - [`metrics`] / [`orchestrator`]: observer-driven metric collection
//! - [`event`] / [`emitter`]: envelopes, sequencing, tiered delivery
//! - [`profiler`]: structured execution traces for collection calls
//! - [`collector`]: the owning [`Telemetry`] instance

// Modules
pub mod collector;
pub mod config;
pub mod emitter;
pub mod error;
pub mod event;
pub mod identity;
pub mod metrics;
pub mod orchestrator;
pub mod page;
pub mod profiler;
pub mod storage;
pub mod transport;

// Re-exports for convenient access
pub use collector::{
    BrowserInfo, CollectionSnapshot, ContextSnapshot, FingerprintInputs, FingerprintSummary,
    NetworkInfo, ScreenInfo, Telemetry, TelemetryBuilder,
};
pub use config::{
    BatchingConfig, ConfigStore, EndpointConfig, FingerprintConfig, IdentityConfig, MetricsConfig,
    ModulesConfig, TelemetryConfig,
};
pub use emitter::{EmitOutcome, EventEmitter};
pub use error::{CollectError, Result, StorageError, TransportError};
pub use event::{EventEnvelope, EventOptions};
pub use identity::{Identity, IdentityManager};
pub use metrics::{
    MetricKind, MetricSample, MetricSet, ObserverHandle, ScriptedSource, SignalSource,
    SpawnedObserver, UnavailableSource,
};
pub use orchestrator::{CollectRequest, ObservedCallback, Orchestrator};
pub use page::{visibility_channel, PageContext, Visibility, VisibilityWatch};
pub use profiler::{ProfileStep, ProfileTrace, Profiler, StepStatus};
pub use storage::{FaultyBackend, MemoryBackend, StorageTier, StoreBackend, TierStorage};
pub use transport::{Delivery, DeliveryTier, MemoryTransport, Transport, ENVELOPE_CONTENT_TYPE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_emit_flow() {
        let transport = MemoryTransport::new();
        let mut telemetry = Telemetry::builder()
            .transport(std::sync::Arc::new(transport.clone()))
            .build();

        telemetry.configure(serde_json::json!({
            "endpoints": {"event_url": "https://example.test/event"}
        }));

        let outcome = telemetry.emit_event("pageview", EventOptions::default());
        assert_eq!(outcome, EmitOutcome::Sent { beacon: true });
        assert_eq!(transport.delivery_count(), 1);
    }
}
