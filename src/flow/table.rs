//! In-memory flow table.
//!
//! Stands in for the host session tracker: the server registers every
//! accepted connection and the registration is removed when its guard drops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::flow::{ConnKey, FlowMetadata, FlowResolver};

/// Metadata plus the registration that owns it.
#[derive(Debug, Clone, Copy)]
struct Entry {
    generation: u64,
    metadata: FlowMetadata,
}

/// Concurrent map from remote endpoint to flow metadata.
///
/// A remote endpoint may be reused while an older connection from it is
/// still open (scanners often send from a fixed source port). The newest
/// registration wins, and an older guard never removes a newer entry.
#[derive(Debug, Default)]
pub struct FlowTable {
    flows: Arc<DashMap<ConnKey, Entry>>,
    next_generation: AtomicU64,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a flow. The entry lives until the returned guard is dropped
    /// or a later registration for the same key replaces it.
    pub fn register(&self, key: ConnKey, metadata: FlowMetadata) -> FlowRegistration {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            generation,
            metadata,
        };
        if self.flows.insert(key, entry).is_some() {
            tracing::debug!(flow = %key, "Flow key reused while still registered");
        }
        FlowRegistration {
            flows: Arc::clone(&self.flows),
            key,
            generation,
        }
    }

    /// Number of flows currently tracked.
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

impl FlowResolver for FlowTable {
    fn connection_by_flow(&self, key: &ConnKey) -> FlowMetadata {
        self.flows
            .get(key)
            .map(|entry| entry.value().metadata)
            .unwrap_or_default()
    }
}

/// Guard that removes its own flow entry from the table when dropped.
#[derive(Debug)]
pub struct FlowRegistration {
    flows: Arc<DashMap<ConnKey, Entry>>,
    key: ConnKey,
    generation: u64,
}

impl Drop for FlowRegistration {
    fn drop(&mut self) {
        let generation = self.generation;
        let removed = self
            .flows
            .remove_if(&self.key, |_, entry| entry.generation == generation);
        if removed.is_some() {
            tracing::trace!(flow = %self.key, "Flow released");
        }
    }
}
