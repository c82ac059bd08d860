// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Storage tier adapter
//!
//! Uniform get/set/remove over two storage horizons: [`StorageTier::Persistent`]
//! survives restarts, [`StorageTier::Session`] lives for one tab. Each tier is
//! probe-tested on construction; a tier whose backend fails the probe is
//! transparently replaced with an in-process map that does not outlive the
//! execution context. All operations suppress backend errors - storage is
//! advisory, never fatal.

use crate::error::StorageError;
use std::collections::HashMap;

/// Sentinel key written and removed during the construction probe.
const PROBE_KEY: &str = "__pt_probe__";

/// The two storage horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTier {
    /// Survives restarts of the host environment.
    Persistent,
    /// Lives for one tab / one execution context.
    Session,
}

/// A raw key-value backend supplied by the host environment.
///
/// Implementations may fail freely; [`TierStorage`] catches everything.
pub trait StoreBackend: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// In-process map backend. Used as the fallback for failed probes and as the
/// default backend for hosts without persistence.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.map.remove(key);
        Ok(())
    }
}

/// Backend that fails every operation. Models a host that restricts
/// persistence (private browsing, denied quota).
#[derive(Debug, Default)]
pub struct FaultyBackend;

impl StoreBackend for FaultyBackend {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }

    fn set(&mut self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn remove(&mut self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }
}

/// Two-tier storage with probe-on-construction fallback.
pub struct TierStorage {
    persistent: Box<dyn StoreBackend>,
    session: Box<dyn StoreBackend>,
}

impl TierStorage {
    /// Build from host backends. Each backend is probed with a sentinel
    /// write/read/remove; failures swap that tier to a fresh memory map.
    pub fn new(persistent: Box<dyn StoreBackend>, session: Box<dyn StoreBackend>) -> Self {
        Self {
            persistent: Self::probe(persistent, "persistent"),
            session: Self::probe(session, "session"),
        }
    }

    /// Both tiers in memory. IDs stay stable within the process only.
    pub fn in_memory() -> Self {
        Self {
            persistent: Box::new(MemoryBackend::new()),
            session: Box::new(MemoryBackend::new()),
        }
    }

    fn probe(mut backend: Box<dyn StoreBackend>, tier_name: &str) -> Box<dyn StoreBackend> {
        let round_trip = backend.set(PROBE_KEY, "1").is_ok()
            && matches!(backend.get(PROBE_KEY), Ok(Some(v)) if v == "1")
            && backend.remove(PROBE_KEY).is_ok();

        if round_trip {
            backend
        } else {
            log::debug!("{} tier failed storage probe, falling back to memory", tier_name);
            Box::new(MemoryBackend::new())
        }
    }

    /// Read a value. Backend errors surface as `None`.
    pub fn get(&self, tier: StorageTier, key: &str) -> Option<String> {
        match self.backend(tier).get(key) {
            Ok(value) => value,
            Err(err) => {
                log::debug!("storage get({}) failed: {}", key, err);
                None
            }
        }
    }

    /// Write a value. Returns whether the write succeeded.
    pub fn set(&mut self, tier: StorageTier, key: &str, value: &str) -> bool {
        match self.backend_mut(tier).set(key, value) {
            Ok(()) => true,
            Err(err) => {
                log::debug!("storage set({}) failed: {}", key, err);
                false
            }
        }
    }

    /// Remove a value. Returns whether the removal succeeded.
    pub fn remove(&mut self, tier: StorageTier, key: &str) -> bool {
        match self.backend_mut(tier).remove(key) {
            Ok(()) => true,
            Err(err) => {
                log::debug!("storage remove({}) failed: {}", key, err);
                false
            }
        }
    }

    fn backend(&self, tier: StorageTier) -> &dyn StoreBackend {
        match tier {
            StorageTier::Persistent => self.persistent.as_ref(),
            StorageTier::Session => self.session.as_ref(),
        }
    }

    fn backend_mut(&mut self, tier: StorageTier) -> &mut dyn StoreBackend {
        match tier {
            StorageTier::Persistent => self.persistent.as_mut(),
            StorageTier::Session => self.session.as_mut(),
        }
    }
}
