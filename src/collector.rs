// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Top-level collector
//!
//! [`Telemetry`] is the owning context object for one embedding: it holds
//! the configuration store, identity manager, emitter and orchestrator, so
//! multiple independent collectors can coexist in one host. `collect()`
//! runs the profiled pipeline and returns one immutable snapshot.

use crate::config::{ConfigStore, TelemetryConfig};
use crate::emitter::{EmitOutcome, EventEmitter};
use crate::event::EventOptions;
use crate::identity::{Identity, IdentityManager};
use crate::metrics::{MetricKind, MetricSet, SignalSource, UnavailableSource};
use crate::orchestrator::{CollectRequest, Orchestrator};
use crate::page::{visibility_channel, PageContext, Visibility, VisibilityWatch};
use crate::profiler::{ProfileTrace, Profiler};
use crate::storage::{MemoryBackend, StoreBackend, TierStorage};
use crate::transport::{MemoryTransport, Transport};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

/// Browser context portion of a snapshot (device family).
#[derive(Debug, Clone, Serialize)]
pub struct BrowserInfo {
    pub user_agent: String,
    pub language: String,
}

/// Screen dimensions portion of a snapshot (device family).
#[derive(Debug, Clone, Serialize)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
}

/// Connectivity hints portion of a snapshot (network family).
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub online: bool,
}

/// Raw fingerprint material supplied by the host. The collector only
/// filters and packages it; which techniques run is a config decision.
#[derive(Debug, Clone, Default)]
pub struct FingerprintInputs {
    /// Canvas rendering hash.
    pub canvas: Option<String>,
    /// Detected font names.
    pub fonts: Option<Vec<String>>,
    /// WebGL renderer string.
    pub webgl: Option<String>,
}

/// Fingerprint techniques that actually ran, per config.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FingerprintSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fonts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webgl: Option<String>,
}

/// Synchronous context gathered per collection call.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<ScreenInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprints: Option<FingerprintSummary>,
    pub errors: Vec<String>,
}

/// The immutable result of one `collect()` call.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSnapshot {
    pub identity: Identity,
    pub context: ContextSnapshot,
    pub metrics: MetricSet,
    pub trace: ProfileTrace,
}

/// Builder wiring host capability seams into a [`Telemetry`] instance.
/// Every seam has a degraded default: memory storage, recording transport,
/// no observation mechanism, always-visible page.
pub struct TelemetryBuilder {
    persistent: Box<dyn StoreBackend>,
    session: Box<dyn StoreBackend>,
    transport: Arc<dyn Transport>,
    source: Arc<dyn SignalSource>,
    visibility: Option<VisibilityWatch>,
    page: PageContext,
    fingerprints: FingerprintInputs,
    errors: Vec<String>,
}

impl Default for TelemetryBuilder {
    fn default() -> Self {
        Self {
            persistent: Box::new(MemoryBackend::new()),
            session: Box::new(MemoryBackend::new()),
            transport: Arc::new(MemoryTransport::new()),
            source: Arc::new(UnavailableSource),
            visibility: None,
            page: PageContext::default(),
            fingerprints: FingerprintInputs::default(),
            errors: Vec::new(),
        }
    }
}

impl TelemetryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend for the survive-restart tier.
    pub fn persistent_store(mut self, backend: Box<dyn StoreBackend>) -> Self {
        self.persistent = backend;
        self
    }

    /// Backend for the per-tab tier.
    pub fn session_store(mut self, backend: Box<dyn StoreBackend>) -> Self {
        self.session = backend;
        self
    }

    /// Network transmission primitive.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Performance signal source.
    pub fn signal_source(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.source = source;
        self
    }

    /// Page visibility signal.
    pub fn visibility(mut self, watch: VisibilityWatch) -> Self {
        self.visibility = Some(watch);
        self
    }

    /// Navigation / device context.
    pub fn page(mut self, page: PageContext) -> Self {
        self.page = page;
        self
    }

    /// Host-computed fingerprint material.
    pub fn fingerprints(mut self, inputs: FingerprintInputs) -> Self {
        self.fingerprints = inputs;
        self
    }

    /// Seed the errors slot with host-captured page errors.
    pub fn page_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn build(self) -> Telemetry {
        let (default_tx, visibility) = match self.visibility {
            Some(watch) => (None, watch),
            None => {
                let (tx, rx) = visibility_channel(Visibility::Visible);
                (Some(tx), rx)
            }
        };

        let storage = TierStorage::new(self.persistent, self.session);
        let config = ConfigStore::new();
        Telemetry {
            identity: IdentityManager::new(storage),
            emitter: EventEmitter::new(Arc::clone(&self.transport), config.clone()),
            config,
            orchestrator: Orchestrator::new(self.source, visibility),
            page: self.page,
            fingerprints: self.fingerprints,
            errors: self.errors,
            _default_visibility: default_tx,
        }
    }
}

/// One collector embedding.
pub struct Telemetry {
    config: ConfigStore,
    identity: IdentityManager,
    emitter: EventEmitter,
    orchestrator: Orchestrator,
    page: PageContext,
    fingerprints: FingerprintInputs,
    errors: Vec<String>,
    // Keeps the default always-visible channel alive when the host supplied
    // no visibility signal.
    _default_visibility: Option<watch::Sender<Visibility>>,
}

impl Telemetry {
    pub fn builder() -> TelemetryBuilder {
        TelemetryBuilder::new()
    }

    /// A collector with every seam defaulted. Useful for tests and hosts
    /// that only want identity plus events.
    pub fn new() -> Self {
        TelemetryBuilder::new().build()
    }

    /// Deep-merge a configuration patch; returns the new snapshot.
    pub fn configure(&mut self, patch: Value) -> TelemetryConfig {
        self.config.configure(patch)
    }

    /// An owned copy of the live configuration snapshot.
    pub fn config(&self) -> TelemetryConfig {
        self.config.snapshot()
    }

    /// Restore compiled-in configuration defaults.
    pub fn reset_config(&mut self) {
        self.config.reset();
    }

    pub fn visitor_id(&mut self) -> String {
        let identity = self.config.snapshot().identity;
        self.identity.visitor_id(&identity)
    }

    pub fn session_id(&mut self) -> String {
        let identity = self.config.snapshot().identity;
        self.identity.session_id(&identity)
    }

    pub fn pageview_id(&self) -> String {
        self.identity.pageview_id()
    }

    /// Emit one discrete event through the configured delivery path.
    pub fn emit_event(&mut self, event_type: &str, opts: EventOptions) -> EmitOutcome {
        let identity_config = self.config.snapshot().identity;
        let identity = self.identity.identity(&identity_config);
        self.emitter.emit(&identity, &self.page, event_type, opts)
    }

    /// Drain and transmit all queued events in enqueue order.
    pub fn flush_events(&self) {
        self.emitter.flush();
    }

    /// Clear the queue and restart the sequence counter at zero.
    pub fn reset_emitter(&self) {
        self.emitter.reset();
    }

    /// Number of queued, untransmitted events.
    pub fn pending_events(&self) -> usize {
        self.emitter.pending()
    }

    /// Collect a metric subset directly, using configured timeouts.
    pub async fn collect_metrics(&self, kinds: &[MetricKind]) -> MetricSet {
        let timeout = self.config.snapshot().metrics.timeout_for_set(kinds);
        self.orchestrator
            .collect(CollectRequest::new(kinds, timeout))
            .await
    }

    /// Run the full profiled collection pipeline and return one immutable
    /// snapshot. If a collect endpoint is configured the snapshot is also
    /// posted there, best-effort, without blocking the return.
    pub async fn collect(&mut self) -> CollectionSnapshot {
        let config = self.config.snapshot();
        let mut profiler = Profiler::start("collect");

        let identity = {
            let identity_config = &config.identity;
            let manager = &mut self.identity;
            profiler.run("identity", || manager.identity(identity_config))
        };

        let (browser, screen) = if config.modules.device {
            let page = &self.page;
            profiler.run("device", || {
                (
                    Some(BrowserInfo {
                        user_agent: page.user_agent.clone(),
                        language: page.language.clone(),
                    }),
                    Some(ScreenInfo {
                        width: page.screen_width,
                        height: page.screen_height,
                    }),
                )
            })
        } else {
            profiler.skip("device", None);
            (None, None)
        };

        let network = if config.modules.network {
            let online = self.page.online;
            profiler.run("network", || Some(NetworkInfo { online }))
        } else {
            profiler.skip("network", None);
            None
        };

        let fingerprints = if config.modules.fingerprint {
            let inputs = &self.fingerprints;
            let techniques = &config.fingerprint;
            profiler.run("fingerprint", || {
                Some(FingerprintSummary {
                    canvas: techniques.canvas.then(|| inputs.canvas.clone()).flatten(),
                    fonts: techniques.fonts.then(|| inputs.fonts.clone()).flatten(),
                    webgl: techniques.webgl.then(|| inputs.webgl.clone()).flatten(),
                })
            })
        } else {
            profiler.skip("fingerprint", Some(json!({"enabled": false})));
            None
        };

        let errors = if config.modules.errors {
            let captured = &self.errors;
            profiler.run("errors", || captured.clone())
        } else {
            profiler.skip("errors", None);
            Vec::new()
        };

        let metrics = if config.modules.performance {
            let timeout = config.metrics.timeout_for_set(&MetricKind::ALL);
            let request = CollectRequest::new(&MetricKind::ALL, timeout);
            profiler
                .run_async("performance", self.orchestrator.collect(request))
                .await
        } else {
            profiler.skip("performance", None);
            let mut empty = MetricSet::default();
            empty.finalize();
            empty
        };

        let snapshot = CollectionSnapshot {
            identity,
            context: ContextSnapshot {
                browser,
                screen,
                network,
                fingerprints,
                errors,
            },
            metrics,
            trace: profiler.finish(),
        };

        if let Some(endpoint) = &config.endpoints.collect_url {
            match serde_json::to_vec(&snapshot) {
                Ok(body) => {
                    self.emitter.send_json(endpoint, body);
                }
                Err(err) => log::debug!("could not encode snapshot: {}", err),
            }
        }

        snapshot
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
