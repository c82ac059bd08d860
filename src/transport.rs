// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Network transmission seam
//!
//! Two tiers, degrading as page teardown approaches:
//!
//! 1. **Beacon**: synchronous hand-off that survives page unload without
//!    blocking it. No readable response, only an accepted/rejected bit.
//! 2. **Request**: keep-alive-flagged asynchronous POST, used when the host
//!    has no beacon primitive. The emitter spawns it detached and never
//!    awaits the result.
//!
//! [`MemoryTransport`] records deliveries for inspection and can simulate
//! hosts without beacon support or with failing request tiers.

use crate::error::TransportError;
use crate::event::EventEnvelope;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

/// Boxed future returned by the request tier.
pub type RequestFuture = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;

/// Content type of every outbound payload. Implementations label bodies
/// with it on both tiers.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/json";

/// Host network primitive. Bodies are serialized JSON, to be labeled
/// [`ENVELOPE_CONTENT_TYPE`] on the wire.
pub trait Transport: Send + Sync {
    /// Fire-and-forget tier. Returns whether the payload was accepted for
    /// transmission. Must never block.
    fn send_beacon(&self, url: &str, body: &[u8]) -> bool;

    /// Keep-alive request tier. The returned future must own everything it
    /// needs; callers spawn it detached.
    fn send_request(&self, url: String, body: Vec<u8>) -> RequestFuture;
}

/// Which tier carried a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryTier {
    Beacon,
    Request,
}

/// One recorded transmission.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub url: String,
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub tier: DeliveryTier,
}

#[derive(Debug, Default)]
struct MemoryTransportState {
    deliveries: Vec<Delivery>,
    beacon_unsupported: bool,
    fail_requests: bool,
}

/// In-memory transport recording every delivery. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryTransportState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host without the beacon primitive; everything goes through the
    /// request tier.
    pub fn without_beacon() -> Self {
        let transport = Self::new();
        transport.lock().beacon_unsupported = true;
        transport
    }

    /// Make the request tier fail every call.
    pub fn fail_requests(&self) {
        self.lock().fail_requests = true;
    }

    /// All recorded deliveries, in transmission order.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().deliveries.clone()
    }

    /// Number of recorded deliveries.
    pub fn delivery_count(&self) -> usize {
        self.lock().deliveries.len()
    }

    /// Decode recorded bodies as event envelopes, in transmission order.
    pub fn envelopes(&self) -> Vec<EventEnvelope> {
        self.lock()
            .deliveries
            .iter()
            .filter_map(|d| serde_json::from_slice(&d.body).ok())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTransportState> {
        // A poisoned lock only means a test panicked mid-record.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MemoryTransport {
    fn send_beacon(&self, url: &str, body: &[u8]) -> bool {
        let mut state = self.lock();
        if state.beacon_unsupported {
            return false;
        }
        state.deliveries.push(Delivery {
            url: url.to_string(),
            body: body.to_vec(),
            content_type: ENVELOPE_CONTENT_TYPE,
            tier: DeliveryTier::Beacon,
        });
        true
    }

    fn send_request(&self, url: String, body: Vec<u8>) -> RequestFuture {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let mut state = inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.fail_requests {
                return Err(TransportError::Request("scripted failure".to_string()));
            }
            state.deliveries.push(Delivery {
                url,
                body,
                content_type: ENVELOPE_CONTENT_TYPE,
                tier: DeliveryTier::Request,
            });
            Ok(())
        })
    }
}
