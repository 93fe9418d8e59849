//! Genesis import and export
//!
//! The genesis document carries the full register state:
//! - Module params and the deposit to ozone rate
//! - Resource and meta node records
//! - Remaining ozone limit
//! - Outstanding slashing per owner
//!
//! On a fresh chain (all deposit pools empty) the node deposits are pulled
//! from the owners into the pools matching each node's status. On a restart
//! the pools already hold the funds and only the records are written back.

use crate::context::Context;
use crate::error::{RegisterError, Result};
use crate::keeper::RegisterKeeper;
use crate::ledger;
use crate::params::{RegisterParams, DEFAULT_DEPOSIT_NOZ_RATE};
use crate::slashing::SlashingRecord;
use crate::types::{BondStatus, Coin, MetaNode, NodeKind, ResourceNode, ServiceNode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Register genesis state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisState {
    /// Module params
    pub params: RegisterParams,

    /// Resource nodes
    pub resource_nodes: Vec<ResourceNode>,

    /// Meta nodes
    pub meta_nodes: Vec<MetaNode>,

    /// Remaining ozone limit, used when the chain restarts from exported state
    pub remaining_noz_limit: u128,

    /// Outstanding slashing
    pub slashing: Vec<SlashingRecord>,

    /// Deposit to ozone rate
    pub deposit_noz_rate: Decimal,
}

impl Default for GenesisState {
    fn default() -> Self {
        Self {
            params: RegisterParams::default(),
            resource_nodes: Vec::new(),
            meta_nodes: Vec::new(),
            remaining_noz_limit: 0,
            slashing: Vec::new(),
            deposit_noz_rate: DEFAULT_DEPOSIT_NOZ_RATE,
        }
    }
}

impl GenesisState {
    /// Check the document before it touches any state
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;

        if self.deposit_noz_rate <= Decimal::ZERO {
            return Err(RegisterError::InvalidDepositNozRate);
        }

        let statuses = self
            .resource_nodes
            .iter()
            .map(|node| (node.network_address, node.status))
            .chain(self.meta_nodes.iter().map(|node| (node.network_address, node.status)));
        for (addr, status) in statuses {
            if status == BondStatus::Unbonding {
                return Err(RegisterError::InvalidNodeStatus(format!(
                    "node {} cannot start in status {}",
                    addr, status
                )));
            }
        }

        let mut seen = HashSet::new();
        for node in &self.resource_nodes {
            node.description.validate()?;
            if !seen.insert(node.network_address) {
                return Err(RegisterError::NodeAlreadyExists(node.network_address.to_string()));
            }
            if node.effective_tokens > node.tokens {
                return Err(RegisterError::InvalidEffectiveToken(format!(
                    "resource node {} has effective tokens {} above deposit {}",
                    node.network_address, node.effective_tokens, node.tokens
                )));
            }
        }

        seen.clear();
        for node in &self.meta_nodes {
            node.description.validate()?;
            if !seen.insert(node.network_address) {
                return Err(RegisterError::NodeAlreadyExists(node.network_address.to_string()));
            }
        }

        Ok(())
    }

    /// Parse a JSON genesis document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the state as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl RegisterKeeper {
    /// Load a genesis document into an empty register
    pub fn init_genesis(&self, ctx: &Context<'_>, genesis: &GenesisState) -> Result<()> {
        genesis.validate()?;

        ctx.atomic(|ctx| {
            let store = ctx.store();
            genesis.params.save(store)?;
            let denom = genesis.params.bond_denom.as_str();

            let fresh_start = self.deposits.pool_totals(denom).deposit_pools_empty();
            info!(
                "Initializing register genesis: {} resource nodes, {} meta nodes, fresh start {}",
                genesis.resource_nodes.len(),
                genesis.meta_nodes.len(),
                fresh_start
            );

            let nodes = genesis
                .resource_nodes
                .iter()
                .cloned()
                .map(ServiceNode::from)
                .chain(genesis.meta_nodes.iter().cloned().map(|mut node| {
                    if node.beneficiary_address.is_empty() {
                        node.beneficiary_address = node.owner_address;
                    }
                    ServiceNode::from(node)
                }));

            let mut initial_deposit_total: u128 = 0;
            let mut bonded_resource: u64 = 0;
            let mut bonded_meta: u64 = 0;

            for node in nodes {
                let kind = node.kind();
                let pool = match node.status() {
                    BondStatus::Bonded => {
                        match kind {
                            NodeKind::Resource => bonded_resource += 1,
                            NodeKind::Meta => bonded_meta += 1,
                        }
                        if !node.suspended() {
                            initial_deposit_total = initial_deposit_total
                                .checked_add(node.credited_tokens())
                                .ok_or_else(|| {
                                    RegisterError::InvalidAmount("genesis deposit total overflow".to_string())
                                })?;
                        }
                        ledger::bonded_pool(kind)
                    }
                    BondStatus::Unbonded => ledger::not_bonded_pool(kind),
                    BondStatus::Unbonding => {
                        return Err(RegisterError::InvalidNodeStatus(format!(
                            "{} node {} cannot start in status {}",
                            kind,
                            node.network_address(),
                            node.status()
                        )));
                    }
                };

                if fresh_start && node.tokens() > 0 {
                    let coin = Coin::new(denom, node.tokens());
                    self.ledger
                        .send_account_to_pool(&node.owner_address(), pool, &coin)?;
                }
                self.nodes.set_node(store, &node)?;
                debug!(
                    "Genesis {} node {} with {} tokens ({})",
                    kind,
                    node.network_address(),
                    node.tokens(),
                    node.status()
                );
            }

            self.deposits
                .set_bonded_count(store, NodeKind::Resource, bonded_resource)?;
            self.deposits.set_bonded_count(store, NodeKind::Meta, bonded_meta)?;
            self.deposits
                .set_initial_genesis_deposit_total(store, initial_deposit_total)?;
            self.deposits
                .set_effective_total_deposit(store, initial_deposit_total)?;
            self.deposits
                .set_deposit_noz_rate(store, genesis.deposit_noz_rate)?;

            let ozone_limit = if fresh_start {
                self.deposits.ozone_for_deposit(store, initial_deposit_total)?
            } else {
                genesis.remaining_noz_limit
            };
            self.deposits.set_remaining_ozone_limit(store, ozone_limit)?;

            for record in &genesis.slashing {
                self.slashing.set(store, &record.wallet_address, record.value)?;
            }

            info!(
                "Register genesis loaded: initial deposit {}, ozone limit {}, rate {}",
                initial_deposit_total, ozone_limit, genesis.deposit_noz_rate
            );
            Ok(())
        })?;

        self.reload_meta_node_index(ctx)
    }

    /// Export the register state as a genesis document
    pub fn export_genesis(&self, ctx: &Context<'_>) -> Result<GenesisState> {
        let store = ctx.store();
        Ok(GenesisState {
            params: RegisterParams::load(store)?,
            resource_nodes: self.nodes.get_all_resource_nodes(store)?,
            meta_nodes: self.nodes.get_all_meta_nodes(store)?,
            remaining_noz_limit: self.deposits.get_remaining_ozone_limit(store)?,
            slashing: self.slashing.iterate(store)?,
            deposit_noz_rate: self.deposits.get_deposit_noz_rate(store)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BlockHeader;
    use crate::ledger::{Ledger, MemoryLedger};
    use crate::params::CacheConfig;
    use crate::store::MemoryStore;
    use crate::types::{AccountAddress, Description, NetworkAddress, NodeType, ADDRESS_LEN};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    const DENOM: &str = "ustos";

    fn create_test_context(store: &MemoryStore) -> Context<'_> {
        Context::new(
            store,
            BlockHeader {
                height: 0,
                time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            },
        )
    }

    fn owner(id: u8) -> AccountAddress {
        AccountAddress::new([id + 100; ADDRESS_LEN])
    }

    fn create_test_resource_node(id: u8, tokens: u128, status: BondStatus) -> ResourceNode {
        let mut node = ResourceNode::new(
            NetworkAddress::new([id; ADDRESS_LEN]),
            vec![id],
            owner(id),
            Description::with_moniker(format!("resource-{}", id)),
            NodeType::new(NodeType::STORAGE).unwrap(),
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        node.tokens = tokens;
        node.effective_tokens = tokens;
        node.status = status;
        node.suspended = false;
        node
    }

    fn create_test_meta_node(id: u8, tokens: u128) -> MetaNode {
        let mut node = MetaNode::new(
            NetworkAddress::new([id; ADDRESS_LEN]),
            vec![id],
            owner(id),
            Some(AccountAddress::new([0; ADDRESS_LEN])),
            Description::with_moniker(format!("meta-{}", id)),
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        node.tokens = tokens;
        node.status = BondStatus::Bonded;
        node.suspended = false;
        node
    }

    fn create_test_genesis() -> GenesisState {
        GenesisState {
            resource_nodes: vec![
                create_test_resource_node(1, 100, BondStatus::Bonded),
                create_test_resource_node(2, 40, BondStatus::Unbonded),
            ],
            meta_nodes: vec![create_test_meta_node(9, 200), create_test_meta_node(8, 300)],
            slashing: vec![SlashingRecord {
                wallet_address: owner(1),
                value: 7,
            }],
            deposit_noz_rate: Decimal::from(10u32),
            ..GenesisState::default()
        }
    }

    fn fund_owners(ledger: &MemoryLedger, genesis: &GenesisState) {
        for node in &genesis.resource_nodes {
            ledger.mint(&node.owner_address, &Coin::new(DENOM, node.tokens));
        }
        for node in &genesis.meta_nodes {
            ledger.mint(&node.owner_address, &Coin::new(DENOM, node.tokens));
        }
    }

    #[test]
    fn test_fresh_start_moves_funds_into_pools() {
        let ledger = Arc::new(MemoryLedger::new());
        let keeper = RegisterKeeper::new(ledger.clone(), &CacheConfig::default());
        let store = MemoryStore::new();
        let ctx = create_test_context(&store);
        let genesis = create_test_genesis();
        fund_owners(&ledger, &genesis);

        keeper.init_genesis(&ctx, &genesis).unwrap();

        let totals = keeper.pool_totals(&ctx).unwrap();
        assert_eq!(totals.resource_node_bonded, 100);
        assert_eq!(totals.resource_node_not_bonded, 40);
        assert_eq!(totals.meta_node_bonded, 500);

        // 100 effective resource tokens plus 500 meta tokens
        assert_eq!(keeper.effective_total_deposit(&ctx).unwrap(), 600);
        assert_eq!(keeper.remaining_ozone_limit(&ctx).unwrap(), 60);
        assert_eq!(keeper.bonded_node_count(&ctx, NodeKind::Resource).unwrap(), 1);
        assert_eq!(keeper.bonded_node_count(&ctx, NodeKind::Meta).unwrap(), 2);
        assert_eq!(keeper.slashing_of(&ctx, &owner(1)).unwrap(), 7);

        // Empty beneficiary falls back to the owner
        let meta = keeper
            .get_meta_node(&ctx, &NetworkAddress::new([9; ADDRESS_LEN]))
            .unwrap()
            .unwrap();
        assert_eq!(meta.beneficiary_address, owner(9));

        // Index is ready without an extra block
        assert_eq!(
            keeper
                .get_meta_node_index(&ctx, &NetworkAddress::new([8; ADDRESS_LEN]))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_restart_uses_exported_limit() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.mint(&owner(50), &Coin::new(DENOM, 1_000));
        ledger
            .send_account_to_pool(&owner(50), ledger::RESOURCE_NODE_BONDED_POOL, &Coin::new(DENOM, 1_000))
            .unwrap();

        let keeper = RegisterKeeper::new(ledger.clone(), &CacheConfig::default());
        let store = MemoryStore::new();
        let ctx = create_test_context(&store);
        let genesis = GenesisState {
            remaining_noz_limit: 33,
            ..create_test_genesis()
        };

        keeper.init_genesis(&ctx, &genesis).unwrap();
        assert_eq!(keeper.remaining_ozone_limit(&ctx).unwrap(), 33);
        // No funds moved on restart
        assert_eq!(ledger.get_balance(&owner(1), DENOM).amount, 0);
    }

    #[test]
    fn test_unbonding_status_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        let keeper = RegisterKeeper::new(ledger.clone(), &CacheConfig::default());
        let store = MemoryStore::new();
        let ctx = create_test_context(&store);
        let mut genesis = create_test_genesis();
        genesis.resource_nodes[0].status = BondStatus::Unbonding;
        fund_owners(&ledger, &genesis);

        let result = keeper.init_genesis(&ctx, &genesis);
        assert!(matches!(result, Err(RegisterError::InvalidNodeStatus(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_export_and_json_round_trip() {
        let ledger = Arc::new(MemoryLedger::new());
        let keeper = RegisterKeeper::new(ledger.clone(), &CacheConfig::default());
        let store = MemoryStore::new();
        let ctx = create_test_context(&store);
        let genesis = create_test_genesis();
        fund_owners(&ledger, &genesis);
        keeper.init_genesis(&ctx, &genesis).unwrap();

        let exported = keeper.export_genesis(&ctx).unwrap();
        assert_eq!(exported.resource_nodes.len(), 2);
        assert_eq!(exported.meta_nodes.len(), 2);
        assert_eq!(exported.remaining_noz_limit, 60);
        assert_eq!(exported.slashing, genesis.slashing);
        assert_eq!(exported.deposit_noz_rate, Decimal::from(10u32));

        let json = exported.to_json().unwrap();
        let parsed = GenesisState::from_json(&json).unwrap();
        assert_eq!(parsed, exported);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_rate() {
        let mut genesis = create_test_genesis();
        genesis.meta_nodes.push(create_test_meta_node(9, 1));
        assert!(matches!(genesis.validate(), Err(RegisterError::NodeAlreadyExists(_))));

        let genesis = GenesisState {
            deposit_noz_rate: Decimal::ZERO,
            ..GenesisState::default()
        };
        assert!(matches!(genesis.validate(), Err(RegisterError::InvalidDepositNozRate)));
    }
}
