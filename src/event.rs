// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Event envelopes - the wire unit of discrete telemetry.

use crate::identity::Identity;
use crate::page::PageContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A self-contained telemetry event, immutable once built.
///
/// Serialized as `application/json` and POSTed to the configured event
/// endpoint. `seq` is assigned by the emitter: monotonically increasing
/// from 1, reset only by an explicit emitter reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub visitor_id: String,
    pub session_id: String,
    pub pageview_id: String,
    pub event_type: String,
    pub seq: u64,
    /// Epoch milliseconds at emit time.
    pub client_timestamp: i64,
    pub path: String,
    pub referrer: String,
    pub payload: Value,
}

impl EventEnvelope {
    /// Build an envelope for one emit call. Timestamp, path and referrer
    /// come from `opts` when overridden, otherwise from the current
    /// navigation context.
    pub fn build(
        identity: &Identity,
        page: &PageContext,
        event_type: &str,
        seq: u64,
        opts: EventOptions,
    ) -> Self {
        Self {
            visitor_id: identity.visitor_id.clone(),
            session_id: identity.session_id.clone(),
            pageview_id: identity.pageview_id.clone(),
            event_type: event_type.to_string(),
            seq,
            client_timestamp: opts.client_timestamp.unwrap_or_else(now_millis),
            path: opts.path.unwrap_or_else(|| page.path.clone()),
            referrer: opts.referrer.unwrap_or_else(|| page.referrer.clone()),
            payload: opts.payload.unwrap_or(Value::Null),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Caller-supplied overrides for one emit call.
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    /// Arbitrary event payload.
    pub payload: Option<Value>,
    /// Override the document path.
    pub path: Option<String>,
    /// Override the referrer.
    pub referrer: Option<String>,
    /// Override the emit timestamp (epoch ms).
    pub client_timestamp: Option<i64>,
}

impl EventOptions {
    /// Options carrying only a payload.
    pub fn with_payload(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> Identity {
        Identity {
            visitor_id: "v_aa".to_string(),
            session_id: "s_bb".to_string(),
            pageview_id: "p_cc".to_string(),
        }
    }

    #[test]
    fn test_build_defaults_from_page_context() {
        let page = PageContext {
            path: "/pricing".to_string(),
            referrer: "https://example.test/".to_string(),
            ..PageContext::default()
        };

        let envelope =
            EventEnvelope::build(&identity(), &page, "click", 1, EventOptions::default());

        assert_eq!(envelope.event_type, "click");
        assert_eq!(envelope.seq, 1);
        assert_eq!(envelope.path, "/pricing");
        assert_eq!(envelope.referrer, "https://example.test/");
        assert_eq!(envelope.payload, Value::Null);
        assert!(envelope.client_timestamp > 0);
    }

    #[test]
    fn test_options_override_defaults() {
        let page = PageContext::for_path("/home");
        let opts = EventOptions {
            payload: Some(json!({"x": 1})),
            path: Some("/override".to_string()),
            referrer: Some("ref".to_string()),
            client_timestamp: Some(1234),
        };

        let envelope = EventEnvelope::build(&identity(), &page, "click", 7, opts);

        assert_eq!(envelope.path, "/override");
        assert_eq!(envelope.referrer, "ref");
        assert_eq!(envelope.client_timestamp, 1234);
        assert_eq!(envelope.payload["x"], 1);
    }

    #[test]
    fn test_wire_field_names() {
        let page = PageContext::default();
        let envelope = EventEnvelope::build(
            &identity(),
            &page,
            "pageview",
            1,
            EventOptions::with_payload(json!({"k": "v"})),
        );

        let json = envelope.to_json().expect("serializes");
        for field in [
            "visitor_id",
            "session_id",
            "pageview_id",
            "event_type",
            "seq",
            "client_timestamp",
            "path",
            "referrer",
            "payload",
        ] {
            assert!(json.contains(field), "missing wire field {}", field);
        }
    }
}
