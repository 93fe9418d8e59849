//! Key/value storage for the register module
//!
//! This module provides:
//! - The `KvStore` trait supplied by the host runtime
//! - An in-memory ordered store
//! - A write-buffering transaction that commits into a parent store
//! - The persisted key layout
//! - bincode helpers for record values

use crate::error::Result;
use crate::types::{AccountAddress, NetworkAddress};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Ordered byte-keyed store scoped to this module
pub trait KvStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write a value
    fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    /// Delete a value
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// All entries whose key starts with `prefix`, ascending by key
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// All entries in `[start, end]`, ascending by key
    fn range_scan(&self, start: &[u8], end_inclusive: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// In-memory ordered store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.entries.write().insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn range_scan(&self, start: &[u8], end_inclusive: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if start > end_inclusive {
            return Ok(Vec::new());
        }
        let entries = self.entries.read();
        Ok(entries
            .range::<[u8], _>((Bound::Included(start), Bound::Included(end_inclusive)))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

/// Write buffer over a parent store
///
/// Reads observe the buffered writes. Nothing reaches the parent until
/// `commit`; dropping the transaction discards it.
pub struct StoreTransaction<'a> {
    parent: &'a dyn KvStore,
    writes: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl<'a> StoreTransaction<'a> {
    /// Start a transaction over `parent`
    pub fn new(parent: &'a dyn KvStore) -> Self {
        Self {
            parent,
            writes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of buffered writes and deletes
    pub fn pending_writes(&self) -> usize {
        self.writes.read().len()
    }

    /// Apply buffered writes to the parent store
    pub fn commit(self) -> Result<()> {
        let writes = self.writes.into_inner();
        for (key, value) in writes {
            match value {
                Some(value) => self.parent.set(key, value)?,
                None => self.parent.delete(&key)?,
            }
        }
        Ok(())
    }

    fn merge(
        &self,
        base: Vec<(Vec<u8>, Vec<u8>)>,
        in_range: impl Fn(&[u8]) -> bool,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = base.into_iter().collect();
        for (key, value) in self.writes.read().iter() {
            if !in_range(key.as_slice()) {
                continue;
            }
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }
}

impl KvStore for StoreTransaction<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.writes.read().get(key) {
            return Ok(value.clone());
        }
        self.parent.get(key)
    }

    fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.writes.write().insert(key, Some(value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.writes.write().insert(key.to_vec(), None);
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let base = self.parent.prefix_scan(prefix)?;
        Ok(self.merge(base, |key| key.starts_with(prefix)))
    }

    fn range_scan(&self, start: &[u8], end_inclusive: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let base = self.parent.range_scan(start, end_inclusive)?;
        Ok(self.merge(base, |key| key >= start && key <= end_inclusive))
    }
}

/// Persisted key layout
pub mod keys {
    use super::*;

    /// Resource node records
    pub const RESOURCE_NODE_PREFIX: u8 = 0x11;
    /// Meta node records
    pub const META_NODE_PREFIX: u8 = 0x12;
    /// Unbonding records
    pub const UNBONDING_NODE_PREFIX: u8 = 0x21;
    /// Unbonding queue buckets
    pub const UNBONDING_QUEUE_PREFIX: u8 = 0x22;
    /// Registration vote pools
    pub const REGISTRATION_VOTE_PREFIX: u8 = 0x31;
    /// Kick vote pools
    pub const KICK_VOTE_PREFIX: u8 = 0x32;
    /// Remaining ozone limit
    pub const REMAINING_OZONE_LIMIT: &[u8] = &[0x41, 0x01];
    /// Effective total deposit
    pub const EFFECTIVE_TOTAL_DEPOSIT: &[u8] = &[0x41, 0x02];
    /// Deposit to ozone rate
    pub const DEPOSIT_NOZ_RATE: &[u8] = &[0x41, 0x03];
    /// Bonded resource node count
    pub const BONDED_RESOURCE_NODE_COUNT: &[u8] = &[0x41, 0x04];
    /// Bonded meta node count
    pub const BONDED_META_NODE_COUNT: &[u8] = &[0x41, 0x05];
    /// Initial genesis deposit total
    pub const INITIAL_GENESIS_DEPOSIT_TOTAL: &[u8] = &[0x41, 0x06];
    /// Per-owner slashing amounts
    pub const SLASHING_PREFIX: u8 = 0x51;
    /// Module params
    pub const PARAMS: &[u8] = &[0x61];

    fn prefixed(prefix: u8, body: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + body.len());
        key.push(prefix);
        key.extend_from_slice(body);
        key
    }

    /// Resource node record key
    pub fn resource_node_key(addr: &NetworkAddress) -> Vec<u8> {
        prefixed(RESOURCE_NODE_PREFIX, addr.as_bytes())
    }

    /// Meta node record key
    pub fn meta_node_key(addr: &NetworkAddress) -> Vec<u8> {
        prefixed(META_NODE_PREFIX, addr.as_bytes())
    }

    /// Unbonding record key
    pub fn unbonding_node_key(addr: &NetworkAddress) -> Vec<u8> {
        prefixed(UNBONDING_NODE_PREFIX, addr.as_bytes())
    }

    /// Registration vote pool key
    pub fn registration_vote_key(addr: &NetworkAddress) -> Vec<u8> {
        prefixed(REGISTRATION_VOTE_PREFIX, addr.as_bytes())
    }

    /// Kick vote pool key
    pub fn kick_vote_key(addr: &NetworkAddress) -> Vec<u8> {
        prefixed(KICK_VOTE_PREFIX, addr.as_bytes())
    }

    /// Slashing amount key
    pub fn slashing_key(owner: &AccountAddress) -> Vec<u8> {
        prefixed(SLASHING_PREFIX, owner.as_bytes())
    }

    /// Queue bucket key; byte order equals time order
    pub fn unbonding_queue_key(time: &DateTime<Utc>) -> Vec<u8> {
        prefixed(UNBONDING_QUEUE_PREFIX, &sortable_time_bytes(time))
    }

    /// Fixed-width RFC 3339 rendering with nanoseconds
    pub fn sortable_time_bytes(time: &DateTime<Utc>) -> Vec<u8> {
        time.format("%Y-%m-%dT%H:%M:%S%.9fZ")
            .to_string()
            .into_bytes()
    }
}

/// Encode a record value
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Decode a record value
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Read and decode a record
pub fn get_record<T: DeserializeOwned>(store: &dyn KvStore, key: &[u8]) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a record
pub fn set_record<T: Serialize>(store: &dyn KvStore, key: Vec<u8>, value: &T) -> Result<()> {
    store.set(key, encode(value)?)
}
