//! Ordinal index of active meta nodes
//!
//! Downstream consumers need a dense, replica-independent slot number for
//! every active meta node. The cache:
//! - Maps each active, unsuspended meta node to a slot in `[0, N)`
//! - Numbers slots by ascending raw address bytes
//! - Rebuilds lazily on lookup after an explicit `invalidate`
//!
//! The lock is held only while the map itself is read or replaced.

use crate::error::{RegisterError, Result};
use crate::types::NetworkAddress;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
struct IndexState {
    slots: HashMap<NetworkAddress, usize>,
    dirty: bool,
}

/// Lazily rebuilt ordinal index of active meta nodes
#[derive(Default)]
pub struct MetaNodeIndexCache {
    state: Mutex<IndexState>,
}

impl MetaNodeIndexCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the index stale; the next lookup rebuilds it
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        if !state.dirty {
            debug!("Meta node index cache invalidated");
        }
        state.dirty = true;
    }

    /// Whether the next lookup must rebuild
    pub fn needs_rebuild(&self) -> bool {
        let state = self.state.lock();
        state.dirty || state.slots.is_empty()
    }

    /// Replace the index with the ascending enumeration of `active`
    pub fn rebuild(&self, active: impl IntoIterator<Item = NetworkAddress>) {
        let mut addresses: Vec<NetworkAddress> = active.into_iter().collect();
        addresses.sort();
        addresses.dedup();

        let slots: HashMap<NetworkAddress, usize> = addresses
            .into_iter()
            .enumerate()
            .map(|(slot, addr)| (addr, slot))
            .collect();
        let count = slots.len();

        let mut state = self.state.lock();
        state.slots = slots;
        state.dirty = false;

        debug!("Meta node index cache rebuilt with {} entries", count);
    }

    /// Slot of `addr` in the current index, without rebuilding
    pub fn lookup(&self, addr: &NetworkAddress) -> Option<usize> {
        self.state.lock().slots.get(addr).copied()
    }

    /// Slot of `addr`, rebuilding from `load_active` first when stale
    pub fn get_index<F>(&self, addr: &NetworkAddress, load_active: F) -> Result<usize>
    where
        F: FnOnce() -> Result<Vec<NetworkAddress>>,
    {
        if self.needs_rebuild() {
            let active = load_active()?;
            self.rebuild(active);
        }
        self.lookup(addr)
            .ok_or_else(|| RegisterError::NoMetaNodeFound(addr.to_string()))
    }

    /// Number of indexed nodes
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().slots.is_empty()
    }
}
