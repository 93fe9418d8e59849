//! Unbonding scheduler
//!
//! This module handles:
//! - Unbonding entries per node with a cap on open entries
//! - Maturity time calculation from the unbonding threshold and completion time
//! - The time-ordered unbonding queue
//! - Draining matured entries once per block and releasing their funds
//!
//! A failure completing one node is logged and skipped; it never blocks the
//! rest of the queue.

use crate::context::Context;
use crate::deposit::DepositEngine;
use crate::error::{RegisterError, Result};
use crate::events::RegisterEvent;
use crate::index_cache::MetaNodeIndexCache;
use crate::ledger;
use crate::node_store::NodeStore;
use crate::params::RegisterParams;
use crate::store::{self, keys, KvStore};
use crate::types::{BondStatus, Coin, NetworkAddress, NodeKind, ServiceNode};
use crate::voting;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One withdrawal in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingEntry {
    /// Height at which the unbonding started
    pub creation_height: i64,
    /// Time at which the funds become releasable
    pub completion_time: DateTime<Utc>,
    /// Amount initially scheduled
    pub initial_balance: u128,
    /// Amount still to release
    pub balance: u128,
}

impl UnbondingEntry {
    /// Create an entry
    pub fn new(creation_height: i64, completion_time: DateTime<Utc>, balance: u128) -> Self {
        Self {
            creation_height,
            completion_time,
            initial_balance: balance,
            balance,
        }
    }

    /// Whether the entry can be released at `now`
    pub fn is_mature(&self, now: DateTime<Utc>) -> bool {
        self.completion_time <= now
    }
}

/// Open unbonding entries of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingNode {
    /// Node address
    pub network_address: NetworkAddress,
    /// Node kind
    pub kind: NodeKind,
    /// Entries in creation order
    pub entries: Vec<UnbondingEntry>,
}

impl UnbondingNode {
    /// Create an empty record
    pub fn new(network_address: NetworkAddress, kind: NodeKind) -> Self {
        Self {
            network_address,
            kind,
            entries: Vec::new(),
        }
    }

    /// Load the record of `addr`
    pub fn load(store: &dyn KvStore, addr: &NetworkAddress) -> Result<Option<Self>> {
        store::get_record(store, &keys::unbonding_node_key(addr))
    }

    /// Persist the record
    pub fn save(&self, store: &dyn KvStore) -> Result<()> {
        store::set_record(store, keys::unbonding_node_key(&self.network_address), self)
    }

    /// Delete the record of `addr`
    pub fn remove(store: &dyn KvStore, addr: &NetworkAddress) -> Result<()> {
        store.delete(&keys::unbonding_node_key(addr))
    }

    /// All records, ascending by address
    pub fn load_all(store: &dyn KvStore) -> Result<Vec<Self>> {
        store
            .prefix_scan(&[keys::UNBONDING_NODE_PREFIX])?
            .into_iter()
            .map(|(_, bytes)| store::decode(&bytes))
            .collect()
    }

    /// Append an entry
    pub fn add_entry(&mut self, creation_height: i64, completion_time: DateTime<Utc>, balance: u128) {
        self.entries
            .push(UnbondingEntry::new(creation_height, completion_time, balance));
    }

    /// Remove the entry at `index`
    pub fn remove_entry(&mut self, index: usize) -> Option<UnbondingEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Total balance still unbonding
    pub fn balance(&self) -> u128 {
        self.entries.iter().map(|e| e.balance).sum()
    }

    /// Whether no entries remain
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of starting an unbonding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbondOutcome {
    /// Node after the unbonding started
    pub node: ServiceNode,
    /// Ozone limit withdrawn
    pub ozone_limit_change: u128,
    /// When the new entry matures
    pub mature_time: DateTime<Utc>,
    /// Available deposit before
    pub available_before: u128,
    /// Available deposit after
    pub available_after: u128,
}

/// Maturity time of an unbonding started at `now`
///
/// Unbonded nodes release immediately. Nodes younger than the unbonding
/// threshold wait for the threshold to pass before the completion time starts.
pub fn calc_mature_time(
    params: &RegisterParams,
    status: BondStatus,
    creation_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if status == BondStatus::Unbonded {
        return now;
    }
    let threshold_end = creation_time + params.unbonding_threshold();
    if threshold_end > now {
        threshold_end + params.unbonding_completion()
    } else {
        now + params.unbonding_completion()
    }
}

/// Addresses queued in the bucket of `time`
pub fn get_queue_bucket(store: &dyn KvStore, time: &DateTime<Utc>) -> Result<Vec<NetworkAddress>> {
    Ok(store::get_record(store, &keys::unbonding_queue_key(time))?.unwrap_or_default())
}

/// Enqueue `addr` in the bucket of `time`
pub fn insert_unbonding_queue(store: &dyn KvStore, time: &DateTime<Utc>, addr: NetworkAddress) -> Result<()> {
    let mut bucket = get_queue_bucket(store, time)?;
    if !bucket.contains(&addr) {
        bucket.push(addr);
    }
    store::set_record(store, keys::unbonding_queue_key(time), &bucket)
}

/// Unbonding scheduler
pub struct UnbondingScheduler {
    /// Node records
    nodes: Arc<NodeStore>,

    /// Deposit and capacity engine
    deposits: Arc<DepositEngine>,

    /// Ordinal index of active meta nodes
    index_cache: Arc<MetaNodeIndexCache>,
}

impl UnbondingScheduler {
    /// Create a scheduler
    pub fn new(
        nodes: Arc<NodeStore>,
        deposits: Arc<DepositEngine>,
        index_cache: Arc<MetaNodeIndexCache>,
    ) -> Self {
        Self {
            nodes,
            deposits,
            index_cache,
        }
    }

    /// Start unbonding `amount` of a node's deposit
    pub fn unbond(
        &self,
        ctx: &Context<'_>,
        params: &RegisterParams,
        node: ServiceNode,
        amount: u128,
    ) -> Result<UnbondOutcome> {
        let store = ctx.store();
        let addr = node.network_address();
        let kind = node.kind();

        if amount == 0 {
            return Err(RegisterError::InvalidAmount("unbonding amount must be positive".to_string()));
        }
        if node.status() == BondStatus::Unbonding {
            return Err(RegisterError::UnbondingNode(addr.to_string()));
        }

        let available_before = self.deposits.available_deposit(store, &node)?;
        if available_before < amount {
            return Err(RegisterError::InsufficientBalance(format!(
                "node {} has {} available, cannot unbond {}",
                addr, available_before, amount
            )));
        }

        let mut ubd = UnbondingNode::load(store, &addr)?.unwrap_or_else(|| UnbondingNode::new(addr, kind));
        if ubd.entries.len() >= params.max_entries as usize {
            return Err(RegisterError::MaxUnbondingNodeEntries(addr.to_string()));
        }

        // Credit held by the node for the part being withdrawn
        let credit = if node.suspended() {
            0
        } else {
            amount.min(node.credited_tokens())
        };
        if credit > 0 && !self.deposits.is_unbondable(store, credit)? {
            return Err(RegisterError::InsufficientOzoneLimit(
                self.deposits.get_remaining_ozone_limit(store)?,
            ));
        }

        let now = ctx.block_time();
        let mature_time = calc_mature_time(params, node.status(), node.creation_time(), now);
        let coin = Coin::new(params.bond_denom.clone(), amount);

        let ozone_limit_change = if credit > 0 {
            self.deposits.decrease_ozone_limit_by_subtract_deposit(store, credit)?
        } else {
            0
        };

        let mut updated = node;
        if let ServiceNode::Resource(n) = &mut updated {
            n.effective_tokens -= credit;
        }

        if updated.status() == BondStatus::Bonded {
            self.deposits.ledger().send_pool_to_pool(
                ledger::bonded_pool(kind),
                ledger::not_bonded_pool(kind),
                &coin,
            )?;

            if amount == available_before {
                updated.set_status(BondStatus::Unbonding);
                self.deposits.decrement_bonded_count(store, kind)?;
                if kind == NodeKind::Meta {
                    self.index_cache.invalidate();
                }
                info!("{} node {} is now unbonding", kind, addr);
            }
        }

        ubd.add_entry(ctx.block_height(), mature_time, amount);
        ubd.save(store)?;
        insert_unbonding_queue(store, &mature_time, addr)?;
        self.nodes.set_node(store, &updated)?;

        info!(
            "Unbonding {} from {} node {} (matures at {}, ozone limit -{})",
            coin, kind, addr, mature_time, ozone_limit_change
        );

        Ok(UnbondOutcome {
            node: updated,
            ozone_limit_change,
            mature_time,
            available_before,
            available_after: available_before - amount,
        })
    }

    /// Release every mature entry of the node at `addr`
    ///
    /// Returns the total amount released.
    pub fn complete_unbonding(&self, ctx: &Context<'_>, params: &RegisterParams, addr: &NetworkAddress) -> Result<u128> {
        let store = ctx.store();
        let now = ctx.block_time();

        let mut ubd = UnbondingNode::load(store, addr)?
            .ok_or_else(|| RegisterError::NoUnbondingNode(addr.to_string()))?;
        let kind = ubd.kind;
        let mut node = Some(self.nodes.get_node(store, kind, addr)?.ok_or_else(|| match kind {
            NodeKind::Resource => RegisterError::NoResourceNodeFound(addr.to_string()),
            NodeKind::Meta => RegisterError::NoMetaNodeFound(addr.to_string()),
        })?);

        let mut released = 0u128;
        let mut i = 0;
        while i < ubd.entries.len() {
            if !ubd.entries[i].is_mature(now) {
                i += 1;
                continue;
            }
            let Some(current) = node.take() else {
                break;
            };
            let balance = ubd.entries[i].balance;
            node = self
                .deposits
                .subtract_deposit(store, current, &Coin::new(params.bond_denom.clone(), balance))?;
            ubd.remove_entry(i);
            released += balance;
        }

        if !ubd.is_empty() && node.is_some() {
            ubd.save(store)?;
        } else {
            UnbondingNode::remove(store, addr)?;
            let left_register = match node {
                Some(mut current) if current.status() == BondStatus::Unbonding => {
                    current.set_status(BondStatus::Unbonded);
                    self.nodes.set_node(store, &current)?;
                    info!("{} node {} is now unbonded", kind, addr);
                    true
                }
                Some(_) => false,
                None => true,
            };
            if left_register && kind == NodeKind::Meta {
                self.index_cache.invalidate();
                voting::remove_vote_pools(store, addr)?;
            }
        }

        if released > 0 {
            ctx.emit(RegisterEvent::CompleteUnbondingNode {
                network_address: *addr,
                amount: Coin::new(params.bond_denom.clone(), released),
            });
        }
        Ok(released)
    }

    /// Drain every queue bucket at or before the block time
    ///
    /// Returns the addresses that completed without error.
    pub fn drain_mature(&self, ctx: &Context<'_>, params: &RegisterParams) -> Result<Vec<NetworkAddress>> {
        let store = ctx.store();
        let now = ctx.block_time();

        let buckets = store.range_scan(&[keys::UNBONDING_QUEUE_PREFIX], &keys::unbonding_queue_key(&now))?;
        if buckets.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let mut matured = Vec::new();
        for (key, value) in &buckets {
            let bucket: Vec<NetworkAddress> = store::decode(value)?;
            for addr in bucket {
                if seen.insert(addr) {
                    matured.push(addr);
                }
            }
            store.delete(key)?;
        }
        debug!(
            "Draining {} unbonding queue buckets with {} nodes",
            buckets.len(),
            matured.len()
        );

        let mut completed = Vec::with_capacity(matured.len());
        for addr in matured {
            match ctx.atomic(|node_ctx| self.complete_unbonding(node_ctx, params, &addr)) {
                Ok(released) => {
                    debug!("Completed unbonding of {} (released {})", addr, released);
                    completed.push(addr);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Failed to complete unbonding of node {}: {}", addr, e);
                }
            }
        }

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BlockHeader;
    use crate::ledger::{Ledger, MemoryLedger};
    use crate::params::CacheConfig;
    use crate::store::MemoryStore;
    use crate::types::{AccountAddress, Description, NodeType, ResourceNode, ADDRESS_LEN};
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    const DENOM: &str = "ustos";

    struct TestEnv {
        store: MemoryStore,
        ledger: Arc<MemoryLedger>,
        nodes: Arc<NodeStore>,
        deposits: Arc<DepositEngine>,
        scheduler: UnbondingScheduler,
        params: RegisterParams,
    }

    fn create_test_env() -> TestEnv {
        let store = MemoryStore::new();
        let ledger = Arc::new(MemoryLedger::new());
        let nodes = Arc::new(NodeStore::new(&CacheConfig::default()));
        let deposits = Arc::new(DepositEngine::new(ledger.clone(), nodes.clone()));
        deposits.set_deposit_noz_rate(&store, Decimal::from(10u32)).unwrap();
        let scheduler = UnbondingScheduler::new(nodes.clone(), deposits.clone(), Arc::new(MetaNodeIndexCache::new()));
        TestEnv {
            store,
            ledger,
            nodes,
            deposits,
            scheduler,
            params: RegisterParams::default(),
        }
    }

    fn test_time(days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(days)
    }

    fn create_test_context(store: &dyn KvStore, days: i64) -> Context<'_> {
        Context::new(store, BlockHeader { height: days + 1, time: test_time(days) })
    }

    /// Bonded, unsuspended resource node holding `deposit` in the bonded pool
    fn create_bonded_resource_node(env: &TestEnv, id: u8, deposit: u128) -> ServiceNode {
        let mut node: ServiceNode = ResourceNode::new(
            NetworkAddress::new([id; ADDRESS_LEN]),
            vec![id],
            AccountAddress::new([id + 100; ADDRESS_LEN]),
            Description::with_moniker(format!("resource-{}", id)),
            NodeType::new(NodeType::STORAGE).unwrap(),
            test_time(-365),
        )
        .unwrap()
        .into();
        node.set_status(BondStatus::Bonded);
        node.set_suspended(false);
        env.ledger.mint(&node.owner_address(), &Coin::new(DENOM, deposit));
        env.deposits
            .add_deposit(&env.store, &env.params, &mut node, &Coin::new(DENOM, deposit))
            .unwrap();
        env.deposits.increment_bonded_count(&env.store, NodeKind::Resource).unwrap();
        node
    }

    #[test]
    fn test_calc_mature_time() {
        let params = RegisterParams::default();
        let now = test_time(0);

        assert_eq!(calc_mature_time(&params, BondStatus::Unbonded, now, now), now);

        // Young node waits for the threshold
        let created = now - Duration::days(10);
        assert_eq!(
            calc_mature_time(&params, BondStatus::Bonded, created, now),
            created + Duration::days(180) + Duration::days(14)
        );

        let created = now - Duration::days(200);
        assert_eq!(
            calc_mature_time(&params, BondStatus::Bonded, created, now),
            now + Duration::days(14)
        );
    }

    #[test]
    fn test_full_unbond_moves_to_unbonding() {
        let env = create_test_env();
        let node = create_bonded_resource_node(&env, 1, 100);
        let ctx = create_test_context(&env.store, 0);

        assert_eq!(env.deposits.get_remaining_ozone_limit(&env.store).unwrap(), 10);

        let outcome = env.scheduler.unbond(&ctx, &env.params, node, 100).unwrap();

        assert_eq!(outcome.node.status(), BondStatus::Unbonding);
        assert_eq!(outcome.ozone_limit_change, 10);
        assert_eq!(outcome.mature_time, test_time(14));
        assert_eq!(env.deposits.get_remaining_ozone_limit(&env.store).unwrap(), 0);
        assert_eq!(env.deposits.get_bonded_count(&env.store, NodeKind::Resource).unwrap(), 0);

        let ubd = UnbondingNode::load(&env.store, &outcome.node.network_address())
            .unwrap()
            .unwrap();
        assert_eq!(ubd.entries.len(), 1);
        assert_eq!(ubd.balance(), 100);

        let pools = env.deposits.pool_totals(DENOM);
        assert_eq!(pools.resource_node_bonded, 0);
        assert_eq!(pools.resource_node_not_bonded, 100);
    }

    #[test]
    fn test_unbond_rejections() {
        let env = create_test_env();
        let node = create_bonded_resource_node(&env, 1, 100);
        let ctx = create_test_context(&env.store, 0);

        let result = env.scheduler.unbond(&ctx, &env.params, node.clone(), 0);
        assert!(matches!(result, Err(RegisterError::InvalidAmount(_))));

        let result = env.scheduler.unbond(&ctx, &env.params, node.clone(), 101);
        assert!(matches!(result, Err(RegisterError::InsufficientBalance(_))));

        // Capacity already consumed elsewhere
        env.deposits.set_remaining_ozone_limit(&env.store, 5).unwrap();
        let result = env.scheduler.unbond(&ctx, &env.params, node, 60);
        assert!(matches!(result, Err(RegisterError::InsufficientOzoneLimit(5))));
    }

    #[test]
    fn test_max_entries() {
        let mut env = create_test_env();
        env.params.max_entries = 2;
        let mut node = create_bonded_resource_node(&env, 1, 100);
        let ctx = create_test_context(&env.store, 0);

        for _ in 0..2 {
            node = env.scheduler.unbond(&ctx, &env.params, node, 10).unwrap().node;
        }
        let result = env.scheduler.unbond(&ctx, &env.params, node, 10);
        assert!(matches!(result, Err(RegisterError::MaxUnbondingNodeEntries(_))));
    }

    #[test]
    fn test_drain_releases_and_flips_status() {
        let env = create_test_env();
        let node = create_bonded_resource_node(&env, 1, 100);
        let addr = node.network_address();
        let owner = node.owner_address();
        let ctx = create_test_context(&env.store, 0);
        env.scheduler.unbond(&ctx, &env.params, node, 40).unwrap();
        let node = env.nodes.get_node(&env.store, NodeKind::Resource, &addr).unwrap().unwrap();
        env.scheduler.unbond(&ctx, &env.params, node, 60).unwrap();

        // Nothing matured yet
        let early = create_test_context(&env.store, 13);
        assert!(env.scheduler.drain_mature(&early, &env.params).unwrap().is_empty());
        assert_eq!(env.ledger.get_balance(&owner, DENOM).amount, 0);

        let ctx = create_test_context(&env.store, 14);
        let completed = env.scheduler.drain_mature(&ctx, &env.params).unwrap();
        assert_eq!(completed, vec![addr]);
        assert_eq!(env.ledger.get_balance(&owner, DENOM).amount, 100);

        // Zero deposit removes the record
        assert!(env.nodes.get_node(&env.store, NodeKind::Resource, &addr).unwrap().is_none());
        assert!(UnbondingNode::load(&env.store, &addr).unwrap().is_none());
        assert!(get_queue_bucket(&env.store, &test_time(14)).unwrap().is_empty());
        assert_eq!(ctx.events().events().len(), 1);
    }

    #[test]
    fn test_partial_unbond_keeps_node() {
        let env = create_test_env();
        let node = create_bonded_resource_node(&env, 1, 100);
        let addr = node.network_address();
        let ctx = create_test_context(&env.store, 0);

        let outcome = env.scheduler.unbond(&ctx, &env.params, node, 30).unwrap();
        assert_eq!(outcome.node.status(), BondStatus::Bonded);
        assert_eq!(outcome.available_after, 70);

        let ctx = create_test_context(&env.store, 20);
        env.scheduler.drain_mature(&ctx, &env.params).unwrap();

        let node = env.nodes.get_node(&env.store, NodeKind::Resource, &addr).unwrap().unwrap();
        assert_eq!(node.tokens(), 70);
        assert_eq!(node.status(), BondStatus::Bonded);
        assert!(UnbondingNode::load(&env.store, &addr).unwrap().is_none());
    }

    #[test]
    fn test_drain_skips_failing_node() {
        let env = create_test_env();
        let ctx = create_test_context(&env.store, 0);
        let ghost = NetworkAddress::new([9; ADDRESS_LEN]);
        insert_unbonding_queue(&env.store, &test_time(0), ghost).unwrap();

        let good = create_bonded_resource_node(&env, 1, 50);
        let good_addr = good.network_address();
        env.scheduler.unbond(&ctx, &env.params, good, 50).unwrap();

        let later = create_test_context(&env.store, 30);
        let completed = env.scheduler.drain_mature(&later, &env.params).unwrap();
        assert_eq!(completed, vec![good_addr]);
    }

    #[test]
    fn test_drain_idempotent_without_mature_entries() {
        let env = create_test_env();
        let node = create_bonded_resource_node(&env, 1, 100);
        let ctx = create_test_context(&env.store, 0);
        env.scheduler.unbond(&ctx, &env.params, node, 100).unwrap();

        let before = env.store.len();
        let pools = env.deposits.pool_totals(DENOM);
        let ctx = create_test_context(&env.store, 1);
        assert!(env.scheduler.drain_mature(&ctx, &env.params).unwrap().is_empty());
        assert_eq!(env.store.len(), before);
        assert_eq!(env.deposits.pool_totals(DENOM), pools);
    }

    #[test]
    fn test_queue_bucket_dedup() {
        let store = MemoryStore::new();
        let addr = NetworkAddress::new([1; ADDRESS_LEN]);
        insert_unbonding_queue(&store, &test_time(0), addr).unwrap();
        insert_unbonding_queue(&store, &test_time(0), addr).unwrap();
        assert_eq!(get_queue_bucket(&store, &test_time(0)).unwrap(), vec![addr]);
    }
}
