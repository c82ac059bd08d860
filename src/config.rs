// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Collector configuration.
//!
//! Typed defaults patched through JSON deep merge: callers hand
//! [`ConfigStore::configure`] a partial tree and both-sides plain objects
//! merge recursively, while scalars and arrays replace. Exactly one snapshot
//! is active at any instant; a patch that fails to re-type is rejected whole.

use crate::metrics::MetricKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Master configuration for one collector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Per-family module toggles.
    pub modules: ModulesConfig,

    /// Fingerprint technique sub-options (only read when the module is on).
    pub fingerprint: FingerprintConfig,

    /// Identity persistence and storage key names.
    pub identity: IdentityConfig,

    /// Event batching.
    pub batching: BatchingConfig,

    /// Delivery endpoints.
    pub endpoints: EndpointConfig,

    /// Metric collection timeouts.
    pub metrics: MetricsConfig,
}

/// Module toggles per metric family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Asynchronous performance metrics.
    pub performance: bool,
    /// Fingerprint summary (default: false, opt-in).
    pub fingerprint: bool,
    /// Network hints (connectivity state).
    pub network: bool,
    /// Device context: user agent, language, screen dimensions.
    pub device: bool,
    /// Host-captured page errors.
    pub errors: bool,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            performance: true,
            fingerprint: false,
            network: true,
            device: true,
            errors: true,
        }
    }
}

/// Which fingerprint techniques run when the module is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub canvas: bool,
    pub fonts: bool,
    pub webgl: bool,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            canvas: true,
            fonts: true,
            webgl: true,
        }
    }
}

/// Identity persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// When false, visitor/session IDs are regenerated per call with no
    /// storage I/O.
    pub persist: bool,
    /// Persistent-tier key for the visitor ID.
    pub visitor_key: String,
    /// Session-tier key for the session ID.
    pub session_key: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            persist: true,
            visitor_key: "pt_visitor_id".to_string(),
            session_key: "pt_session_id".to_string(),
        }
    }
}

/// Event batching settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub enabled: bool,
    /// Delay between the first enqueue and the automatic flush.
    pub interval_ms: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 500,
        }
    }
}

/// Delivery endpoints. Both optional: a missing endpoint turns the
/// corresponding operation into a logged no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EndpointConfig {
    /// Snapshot delivery endpoint.
    pub collect_url: Option<String>,
    /// Discrete event endpoint.
    pub event_url: Option<String>,
}

/// Metric collection timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Shared resolution bound for a collection call, in milliseconds.
    pub timeout_ms: u64,
    /// Per-metric overrides, keyed by metric name (see [`MetricKind::as_str`]).
    pub overrides: HashMap<String, u64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            overrides: HashMap::new(),
        }
    }
}

impl MetricsConfig {
    /// Effective timeout for one metric kind.
    pub fn timeout_for(&self, kind: MetricKind) -> Duration {
        let ms = self
            .overrides
            .get(kind.as_str())
            .copied()
            .unwrap_or(self.timeout_ms);
        Duration::from_millis(ms)
    }

    /// Shared timer bound for a set of kinds: the largest effective timeout,
    /// so no requested metric is cut short by another's override.
    pub fn timeout_for_set(&self, kinds: &[MetricKind]) -> Duration {
        kinds
            .iter()
            .map(|k| self.timeout_for(*k))
            .max()
            .unwrap_or(Duration::from_millis(self.timeout_ms))
    }
}

/// Holds the active configuration snapshot. Cheap to clone; clones share
/// the snapshot, so late readers (the batch timer among them) always see
/// the live configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    current: Arc<Mutex<TelemetryConfig>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// An owned copy of the live snapshot.
    pub fn snapshot(&self) -> TelemetryConfig {
        self.lock().clone()
    }

    /// Deep-merge a partial configuration onto the current snapshot and
    /// return the result.
    ///
    /// Objects merge recursively; scalars, arrays and `null` replace. A patch
    /// that does not re-deserialize (wrong type for a known key) is rejected
    /// atomically: the previous snapshot stays active.
    pub fn configure(&self, patch: Value) -> TelemetryConfig {
        let mut current = self.lock();

        let mut tree = match serde_json::to_value(&*current) {
            Ok(tree) => tree,
            Err(err) => {
                log::warn!("could not serialize active configuration: {}", err);
                return current.clone();
            }
        };

        deep_merge(&mut tree, patch);

        match serde_json::from_value(tree) {
            Ok(next) => *current = next,
            Err(err) => log::warn!("rejected configuration patch: {}", err),
        }
        current.clone()
    }

    /// Restore compiled-in defaults.
    pub fn reset(&self) {
        *self.lock() = TelemetryConfig::default();
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryConfig> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Recursive merge of `patch` onto `base`. Only plain-object/plain-object
/// pairs merge; everything else (arrays included) replaces.
pub fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, incoming) in patch_map {
                match base_map.get_mut(&key) {
                    Some(slot) if slot.is_object() && incoming.is_object() => {
                        deep_merge(slot, incoming);
                    }
                    _ => {
                        base_map.insert(key, incoming);
                    }
                }
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = TelemetryConfig::default();
        assert!(config.modules.performance);
        assert!(!config.modules.fingerprint);
        assert!(config.modules.network);
        assert!(config.modules.device);
        assert!(config.identity.persist);
        assert!(!config.batching.enabled);
        assert_eq!(config.batching.interval_ms, 500);
        assert_eq!(config.endpoints.event_url, None);
        assert_eq!(config.metrics.timeout_ms, 3000);
    }

    #[test]
    fn test_configure_merges_nested() {
        let store = ConfigStore::new();
        store.configure(json!({
            "modules": {"fingerprint": true},
            "batching": {"interval_ms": 50}
        }));

        let config = store.snapshot();
        assert!(config.modules.fingerprint);
        // Siblings untouched by the patch keep their values.
        assert!(config.modules.performance);
        assert_eq!(config.batching.interval_ms, 50);
        assert!(!config.batching.enabled);
    }

    #[test]
    fn test_module_family_toggles_merge() {
        let store = ConfigStore::new();
        let config = store.configure(json!({
            "modules": {"network": false, "device": false}
        }));

        assert!(!config.modules.network);
        assert!(!config.modules.device);
        assert!(config.modules.performance);

        // Every family toggle survives a serialization round trip.
        let tree = serde_json::to_value(&config).expect("serializes");
        for family in ["performance", "fingerprint", "network", "device", "errors"] {
            assert!(tree["modules"][family].is_boolean(), "missing {}", family);
        }
    }

    #[test]
    fn test_reset_restores_defaults() {
        let store = ConfigStore::new();
        store.configure(json!({"modules": {"fingerprint": true}}));
        assert!(store.snapshot().modules.fingerprint);

        store.reset();
        assert!(!store.snapshot().modules.fingerprint);
    }

    #[test]
    fn test_invalid_patch_rejected_atomically() {
        let store = ConfigStore::new();
        store.configure(json!({"batching": {"interval_ms": 50}}));

        // Wrong type for a known key: whole patch rejected.
        store.configure(json!({
            "batching": {"interval_ms": "soon", "enabled": true}
        }));

        let config = store.snapshot();
        assert_eq!(config.batching.interval_ms, 50);
        assert!(!config.batching.enabled);
    }

    #[test]
    fn test_clones_share_the_snapshot() {
        let store = ConfigStore::new();
        let clone = store.clone();
        store.configure(json!({"batching": {"interval_ms": 50}}));
        assert_eq!(clone.snapshot().batching.interval_ms, 50);
    }

    #[test]
    fn test_deep_merge_arrays_replace() {
        let mut base = json!({"a": [1, 2, 3], "b": {"c": 1}});
        deep_merge(&mut base, json!({"a": [9], "b": {"d": 2}}));

        assert_eq!(base["a"], json!([9]));
        assert_eq!(base["b"], json!({"c": 1, "d": 2}));
    }

    #[test]
    fn test_deep_merge_null_overwrites() {
        let mut base = json!({"a": {"b": 1}});
        deep_merge(&mut base, json!({"a": null}));
        assert_eq!(base["a"], Value::Null);
    }

    #[test]
    fn test_timeout_overrides() {
        let mut config = MetricsConfig::default();
        config
            .overrides
            .insert("largest_contentful_paint".to_string(), 8000);

        assert_eq!(
            config.timeout_for(MetricKind::LargestContentfulPaint),
            Duration::from_millis(8000)
        );
        assert_eq!(
            config.timeout_for(MetricKind::Ttfb),
            Duration::from_millis(3000)
        );
        assert_eq!(
            config.timeout_for_set(&[MetricKind::Ttfb, MetricKind::LargestContentfulPaint]),
            Duration::from_millis(8000)
        );
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = TelemetryConfig::default();
        let json = serde_json::to_string(&config).expect("serializes");
        let parsed: TelemetryConfig = serde_json::from_str(&json).expect("parses");
        assert_eq!(config, parsed);
    }
}
