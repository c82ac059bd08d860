// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Visitor / session / pageview identity
//!
//! Three pseudonymous identifiers with different lifetimes:
//!
//! - **visitor**: stable across sessions whenever the persistent tier works
//! - **session**: stable within one tab lifetime
//! - **pageview**: fresh on every collection call, never persisted
//!
//! Format is `{prefix}_{32 hex}` - 128 bits of entropy on the strong-random
//! path. A failed persistence write is not cached as "storage is broken":
//! the next call simply reads, misses, and regenerates.

use crate::config::IdentityConfig;
use crate::storage::{StorageTier, TierStorage};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix for visitor identifiers.
pub const VISITOR_PREFIX: &str = "v";
/// Prefix for session identifiers.
pub const SESSION_PREFIX: &str = "s";
/// Prefix for pageview identifiers.
pub const PAGEVIEW_PREFIX: &str = "p";

/// Entropy per identifier, in bytes.
const ID_ENTROPY_BYTES: usize = 16;

/// The identity triple injected into every event envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub visitor_id: String,
    pub session_id: String,
    pub pageview_id: String,
}

/// Generate a `{prefix}_{32 hex}` identifier.
///
/// Uses the OS entropy source; if that errors, falls back to a time-seeded
/// generator rather than failing the caller.
pub fn generate_id(prefix: &str) -> String {
    let mut bytes = [0u8; ID_ENTROPY_BYTES];
    if OsRng.try_fill_bytes(&mut bytes).is_err() {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x70617_4726163);
        StdRng::seed_from_u64(seed).fill_bytes(&mut bytes);
    }

    let mut id = String::with_capacity(prefix.len() + 1 + ID_ENTROPY_BYTES * 2);
    id.push_str(prefix);
    id.push('_');
    for byte in bytes {
        let _ = write!(id, "{:02x}", byte);
    }
    id
}

/// Sole writer of the identity keys in both storage tiers.
pub struct IdentityManager {
    storage: TierStorage,
}

impl IdentityManager {
    pub fn new(storage: TierStorage) -> Self {
        Self { storage }
    }

    /// Visitor ID: read-or-create against the persistent tier.
    ///
    /// With persistence disabled this is a fresh ID per call with no
    /// storage I/O at all.
    pub fn visitor_id(&mut self, config: &IdentityConfig) -> String {
        self.tier_id(
            StorageTier::Persistent,
            &config.visitor_key,
            VISITOR_PREFIX,
            config.persist,
        )
    }

    /// Session ID: read-or-create against the per-tab tier.
    pub fn session_id(&mut self, config: &IdentityConfig) -> String {
        self.tier_id(
            StorageTier::Session,
            &config.session_key,
            SESSION_PREFIX,
            config.persist,
        )
    }

    /// Pageview ID: always fresh, never persisted.
    pub fn pageview_id(&self) -> String {
        generate_id(PAGEVIEW_PREFIX)
    }

    /// The full triple for one collection call.
    pub fn identity(&mut self, config: &IdentityConfig) -> Identity {
        Identity {
            visitor_id: self.visitor_id(config),
            session_id: self.session_id(config),
            pageview_id: self.pageview_id(),
        }
    }

    fn tier_id(&mut self, tier: StorageTier, key: &str, prefix: &str, persist: bool) -> String {
        if !persist {
            return generate_id(prefix);
        }

        if let Some(existing) = self.storage.get(tier, key) {
            return existing;
        }

        let fresh = generate_id(prefix);
        // A failed write just means the next call regenerates.
        if !self.storage.set(tier, key, &fresh) {
            log::debug!("could not persist {} under '{}'", prefix, key);
        }
        fresh
    }
}
