//! Node record persistence
//!
//! This module handles:
//! - Reading and writing resource and meta node records
//! - Full and active-only listings per node kind
//! - Decoding through bounded per-kind decode caches
//! - Node lookups by owner and moniker

use crate::cache::{CacheStats, DecodeCache};
use crate::error::Result;
use crate::params::CacheConfig;
use crate::store::{self, keys, KvStore};
use crate::types::{
    AccountAddress, BondStatus, MetaNode, NetworkAddress, NodeKind, ResourceNode, ServiceNode,
};
use std::sync::Arc;
use tracing::trace;

/// Keyed storage of resource and meta nodes
pub struct NodeStore {
    /// Decoded resource node records
    resource_cache: Arc<DecodeCache<ResourceNode>>,

    /// Decoded meta node records
    meta_cache: Arc<DecodeCache<MetaNode>>,
}

impl NodeStore {
    /// Create a node store with its own decode caches
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            resource_cache: Arc::new(DecodeCache::new(config.node_cache_size)),
            meta_cache: Arc::new(DecodeCache::new(config.node_cache_size)),
        }
    }

    /// Get a resource node
    pub fn get_resource_node(
        &self,
        store: &dyn KvStore,
        addr: &NetworkAddress,
    ) -> Result<Option<ResourceNode>> {
        match store.get(&keys::resource_node_key(addr))? {
            Some(bytes) => Ok(Some(
                self.resource_cache.get_or_decode(&bytes, store::decode::<ResourceNode>)?,
            )),
            None => Ok(None),
        }
    }

    /// Get a meta node
    pub fn get_meta_node(
        &self,
        store: &dyn KvStore,
        addr: &NetworkAddress,
    ) -> Result<Option<MetaNode>> {
        match store.get(&keys::meta_node_key(addr))? {
            Some(bytes) => Ok(Some(self.meta_cache.get_or_decode(&bytes, store::decode::<MetaNode>)?)),
            None => Ok(None),
        }
    }

    /// Get a node of either kind
    pub fn get_node(
        &self,
        store: &dyn KvStore,
        kind: NodeKind,
        addr: &NetworkAddress,
    ) -> Result<Option<ServiceNode>> {
        Ok(match kind {
            NodeKind::Resource => self.get_resource_node(store, addr)?.map(ServiceNode::from),
            NodeKind::Meta => self.get_meta_node(store, addr)?.map(ServiceNode::from),
        })
    }

    /// Persist a resource node
    pub fn set_resource_node(&self, store: &dyn KvStore, node: &ResourceNode) -> Result<()> {
        trace!("Storing resource node {}", node.network_address);
        store::set_record(store, keys::resource_node_key(&node.network_address), node)
    }

    /// Persist a meta node
    pub fn set_meta_node(&self, store: &dyn KvStore, node: &MetaNode) -> Result<()> {
        trace!("Storing meta node {}", node.network_address);
        store::set_record(store, keys::meta_node_key(&node.network_address), node)
    }

    /// Persist a node of either kind
    pub fn set_node(&self, store: &dyn KvStore, node: &ServiceNode) -> Result<()> {
        match node {
            ServiceNode::Resource(n) => self.set_resource_node(store, n),
            ServiceNode::Meta(n) => self.set_meta_node(store, n),
        }
    }

    /// Delete a node record
    pub fn remove_node(&self, store: &dyn KvStore, kind: NodeKind, addr: &NetworkAddress) -> Result<()> {
        match kind {
            NodeKind::Resource => store.delete(&keys::resource_node_key(addr)),
            NodeKind::Meta => store.delete(&keys::meta_node_key(addr)),
        }
    }

    /// All resource nodes, ascending by address
    pub fn get_all_resource_nodes(&self, store: &dyn KvStore) -> Result<Vec<ResourceNode>> {
        store
            .prefix_scan(&[keys::RESOURCE_NODE_PREFIX])?
            .into_iter()
            .map(|(_, bytes)| self.resource_cache.get_or_decode(&bytes, store::decode::<ResourceNode>))
            .collect()
    }

    /// All meta nodes, ascending by address
    pub fn get_all_meta_nodes(&self, store: &dyn KvStore) -> Result<Vec<MetaNode>> {
        store
            .prefix_scan(&[keys::META_NODE_PREFIX])?
            .into_iter()
            .map(|(_, bytes)| self.meta_cache.get_or_decode(&bytes, store::decode::<MetaNode>))
            .collect()
    }

    /// All nodes of a kind
    pub fn get_all(&self, store: &dyn KvStore, kind: NodeKind) -> Result<Vec<ServiceNode>> {
        Ok(match kind {
            NodeKind::Resource => self
                .get_all_resource_nodes(store)?
                .into_iter()
                .map(ServiceNode::from)
                .collect(),
            NodeKind::Meta => self
                .get_all_meta_nodes(store)?
                .into_iter()
                .map(ServiceNode::from)
                .collect(),
        })
    }

    /// Bonded, unsuspended nodes of a kind
    pub fn get_all_active(&self, store: &dyn KvStore, kind: NodeKind) -> Result<Vec<ServiceNode>> {
        Ok(self
            .get_all(store, kind)?
            .into_iter()
            .filter(|node| node.is_active())
            .collect())
    }

    /// Bonded, unsuspended meta nodes
    pub fn get_all_active_meta_nodes(&self, store: &dyn KvStore) -> Result<Vec<MetaNode>> {
        Ok(self
            .get_all_meta_nodes(store)?
            .into_iter()
            .filter(|node| node.status == BondStatus::Bonded && !node.suspended)
            .collect())
    }

    /// Nodes of a kind owned by `owner`
    pub fn get_nodes_by_owner(
        &self,
        store: &dyn KvStore,
        kind: NodeKind,
        owner: &AccountAddress,
    ) -> Result<Vec<ServiceNode>> {
        Ok(self
            .get_all(store, kind)?
            .into_iter()
            .filter(|node| node.owner_address() == *owner)
            .collect())
    }

    /// Resource nodes with a given moniker
    pub fn get_resource_nodes_by_moniker(
        &self,
        store: &dyn KvStore,
        moniker: &str,
    ) -> Result<Vec<ResourceNode>> {
        Ok(self
            .get_all_resource_nodes(store)?
            .into_iter()
            .filter(|node| node.description.moniker == moniker)
            .collect())
    }

    /// Meta nodes with a given moniker
    pub fn get_meta_nodes_by_moniker(&self, store: &dyn KvStore, moniker: &str) -> Result<Vec<MetaNode>> {
        Ok(self
            .get_all_meta_nodes(store)?
            .into_iter()
            .filter(|node| node.description.moniker == moniker)
            .collect())
    }

    /// Decode cache statistics (resource, meta)
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.resource_cache.stats(), self.meta_cache.stats())
    }
}
