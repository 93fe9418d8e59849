//! Register keeper
//!
//! This module ties the register components together and exposes the entry
//! points called by request handlers and the block hooks:
//! - Resource and meta node registration
//! - Deposit top-ups, withdrawals and node removal
//! - Meta node admission and kick votes
//! - Effective deposit reports and resource node slashing
//! - Begin / end block processing
//! - Read-only queries
//!
//! Arguments are expected to be validated and authenticated by the caller.
//! Every mutating entry point runs atomically against the block store.

use crate::context::Context;
use crate::deposit::{self, DepositEngine, PoolTotals};
use crate::error::{RegisterError, Result};
use crate::events::RegisterEvent;
use crate::index_cache::MetaNodeIndexCache;
use crate::ledger::{self, Ledger};
use crate::node_store::NodeStore;
use crate::params::{CacheConfig, RegisterParams};
use crate::slashing::SlashingLedger;
use crate::types::{
    AccountAddress, BondStatus, Coin, Description, MetaNode, NetworkAddress, NodeKind, NodeType,
    ResourceNode, ServiceNode, VoteOpinion,
};
use crate::unbonding::{UnbondOutcome, UnbondingNode, UnbondingScheduler};
use crate::voting::{VoteEngine, VoteKind, VotePool};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Validator set change returned to the host at end of block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    /// Validator public key
    pub pubkey: Vec<u8>,
    /// New voting power
    pub power: i64,
}

/// Result of a deposit change request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositUpdate {
    /// Signed ozone limit change
    pub ozone_limit_change: i128,
    /// Available deposit before the change
    pub available_before: u128,
    /// Available deposit after the change
    pub available_after: u128,
    /// Maturity time when the change started an unbonding
    pub unbonding_mature_time: Option<DateTime<Utc>>,
}

/// Result of an effective deposit report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveDepositUpdate {
    /// Whether the report lifted a suspension
    pub is_unsuspended: bool,
    /// Signed ozone limit change
    pub ozone_limit_change: i128,
    /// Effective tokens after the report
    pub effective_tokens: u128,
}

/// Register module keeper
pub struct RegisterKeeper {
    /// Wallet and pool balances
    pub(crate) ledger: Arc<dyn Ledger>,

    /// Node records
    pub(crate) nodes: Arc<NodeStore>,

    /// Deposit and capacity engine
    pub(crate) deposits: Arc<DepositEngine>,

    /// Unbonding scheduler
    pub(crate) scheduler: Arc<UnbondingScheduler>,

    /// Admission and kick votes
    pub(crate) votes: VoteEngine,

    /// Ordinal index of active meta nodes
    pub(crate) index_cache: Arc<MetaNodeIndexCache>,

    /// Outstanding penalties
    pub(crate) slashing: SlashingLedger,
}

impl RegisterKeeper {
    /// Create a keeper over a ledger gateway
    pub fn new(ledger: Arc<dyn Ledger>, cache_config: &CacheConfig) -> Self {
        let nodes = Arc::new(NodeStore::new(cache_config));
        let index_cache = Arc::new(MetaNodeIndexCache::new());
        let deposits = Arc::new(DepositEngine::new(ledger.clone(), nodes.clone()));
        let scheduler = Arc::new(UnbondingScheduler::new(
            nodes.clone(),
            deposits.clone(),
            index_cache.clone(),
        ));
        let votes = VoteEngine::new(
            nodes.clone(),
            deposits.clone(),
            scheduler.clone(),
            index_cache.clone(),
        );

        Self {
            ledger,
            nodes,
            deposits,
            scheduler,
            votes,
            index_cache,
            slashing: SlashingLedger::new(),
        }
    }

    /// Current module params
    pub fn params(&self, ctx: &Context<'_>) -> Result<RegisterParams> {
        RegisterParams::load(ctx.store())
    }

    /// Replace the module params
    pub fn set_params(&self, ctx: &Context<'_>, params: &RegisterParams) -> Result<()> {
        params.save(ctx.store())
    }

    // ---- Registration ----

    /// Register a resource node and bond its initial deposit
    ///
    /// Resource nodes need no admission vote. Returns the ozone limit granted.
    #[allow(clippy::too_many_arguments)]
    pub fn register_resource_node(
        &self,
        ctx: &Context<'_>,
        network_address: NetworkAddress,
        pubkey: Vec<u8>,
        owner: AccountAddress,
        description: Description,
        node_type: u32,
        deposit: Coin,
    ) -> Result<u128> {
        ctx.atomic(|ctx| {
            let store = ctx.store();
            let params = RegisterParams::load(store)?;

            if !params.resource_node_reg_enabled {
                return Err(RegisterError::ResourceNodeRegDisabled);
            }
            let node_type = NodeType::new(node_type)?;
            deposit::validate_coin(&params, &deposit)?;
            if deposit.amount < params.resource_node_min_deposit.amount {
                return Err(RegisterError::InsufficientDeposit {
                    min: params.resource_node_min_deposit.amount,
                    got: deposit.amount,
                });
            }
            if self.nodes.get_resource_node(store, &network_address)?.is_some() {
                return Err(RegisterError::NodeAlreadyExists(network_address.to_string()));
            }

            let node = ResourceNode::new(
                network_address,
                pubkey,
                owner,
                description,
                node_type,
                ctx.block_time(),
            )?;
            info!("Registering resource node {} ({})", network_address, node_type);
            self.register_node(ctx, &params, node.into(), deposit)
        })
    }

    /// Register a meta node and open its admission vote
    #[allow(clippy::too_many_arguments)]
    pub fn register_meta_node(
        &self,
        ctx: &Context<'_>,
        network_address: NetworkAddress,
        pubkey: Vec<u8>,
        owner: AccountAddress,
        beneficiary: Option<AccountAddress>,
        description: Description,
        deposit: Coin,
    ) -> Result<()> {
        ctx.atomic(|ctx| {
            let store = ctx.store();
            let params = RegisterParams::load(store)?;

            deposit::validate_coin(&params, &deposit)?;
            if self.nodes.get_meta_node(store, &network_address)?.is_some() {
                return Err(RegisterError::NodeAlreadyExists(network_address.to_string()));
            }

            let node = MetaNode::new(
                network_address,
                pubkey,
                owner,
                beneficiary,
                description,
                ctx.block_time(),
            )?;
            info!("Registering meta node {}", network_address);
            self.register_node(ctx, &params, node.into(), deposit)
                .map(|_| ())
        })
    }

    /// Take the initial deposit, then bond the node or open its admission vote
    ///
    /// Returns the ozone limit granted.
    fn register_node(
        &self,
        ctx: &Context<'_>,
        params: &RegisterParams,
        mut node: ServiceNode,
        deposit: Coin,
    ) -> Result<u128> {
        let store = ctx.store();
        let kind = node.kind();
        let network_address = node.network_address();
        self.deposits.add_deposit(store, params, &mut node, &deposit)?;

        let ozone = if kind.requires_admission_vote() {
            self.votes.open_registration_pool(ctx, params, network_address)?;
            info!(
                "{} node {} deposited {}, awaiting admission vote",
                kind, network_address, deposit
            );
            0
        } else {
            self.ledger.send_pool_to_pool(
                ledger::not_bonded_pool(kind),
                ledger::bonded_pool(kind),
                &deposit,
            )?;
            node.set_status(BondStatus::Bonded);
            node.set_suspended(false);
            self.nodes.set_node(store, &node)?;
            self.deposits.increment_bonded_count(store, kind)?;
            let ozone = self
                .deposits
                .increase_ozone_limit_by_add_deposit(store, node.credited_tokens())?;
            info!("{} node {} bonded with deposit {}", kind, network_address, deposit);
            ozone
        };

        ctx.emit(RegisterEvent::CreateNode {
            kind,
            network_address,
            owner: node.owner_address(),
            initial_deposit: deposit,
            ozone_limit_change: ozone as i128,
        });
        Ok(ozone)
    }

    // ---- Deposits ----

    /// Top up (positive delta) or start withdrawing (negative delta) a resource node deposit
    pub fn update_resource_node_deposit(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
        owner: &AccountAddress,
        deposit_delta: i128,
    ) -> Result<DepositUpdate> {
        if deposit_delta == 0 {
            return Err(RegisterError::InvalidDepositChange(
                "deposit delta must not be zero".to_string(),
            ));
        }

        ctx.atomic(|ctx| {
            let params = RegisterParams::load(ctx.store())?;
            let node = self.owned_node(ctx, NodeKind::Resource, network_address, owner)?;
            let amount = deposit_delta.unsigned_abs();

            let update = if deposit_delta > 0 {
                self.top_up(ctx, &params, node, amount)?
            } else {
                let outcome = self.scheduler.unbond(ctx, &params, node, amount)?;
                DepositUpdate {
                    ozone_limit_change: -(outcome.ozone_limit_change as i128),
                    available_before: outcome.available_before,
                    available_after: outcome.available_after,
                    unbonding_mature_time: Some(outcome.mature_time),
                }
            };

            self.emit_deposit_update(ctx, NodeKind::Resource, network_address, deposit_delta, &update)?;
            Ok(update)
        })
    }

    /// Top up a meta node deposit
    pub fn update_meta_node_deposit(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
        owner: &AccountAddress,
        deposit: Coin,
    ) -> Result<DepositUpdate> {
        ctx.atomic(|ctx| {
            let params = RegisterParams::load(ctx.store())?;
            deposit::validate_coin(&params, &deposit)?;
            let node = self.owned_node(ctx, NodeKind::Meta, network_address, owner)?;

            let update = self.top_up(ctx, &params, node, deposit.amount)?;
            let delta = i128::try_from(deposit.amount)
                .map_err(|_| RegisterError::InvalidAmount(format!("deposit {} out of range", deposit)))?;
            self.emit_deposit_update(ctx, NodeKind::Meta, network_address, delta, &update)?;
            Ok(update)
        })
    }

    fn top_up(
        &self,
        ctx: &Context<'_>,
        params: &RegisterParams,
        mut node: ServiceNode,
        amount: u128,
    ) -> Result<DepositUpdate> {
        let coin = Coin::new(params.bond_denom.clone(), amount);
        let change = self.deposits.add_deposit(ctx.store(), params, &mut node, &coin)?;
        Ok(DepositUpdate {
            ozone_limit_change: change.ozone_limit_change,
            available_before: change.available_before,
            available_after: change.available_after,
            unbonding_mature_time: None,
        })
    }

    fn emit_deposit_update(
        &self,
        ctx: &Context<'_>,
        kind: NodeKind,
        network_address: &NetworkAddress,
        deposit_delta: i128,
        update: &DepositUpdate,
    ) -> Result<()> {
        let current_deposit = self
            .nodes
            .get_node(ctx.store(), kind, network_address)?
            .map(|node| node.tokens())
            .unwrap_or(0);
        ctx.emit(RegisterEvent::UpdateDeposit {
            kind,
            network_address: *network_address,
            deposit_delta,
            current_deposit,
            available_before: update.available_before,
            available_after: update.available_after,
            ozone_limit_change: update.ozone_limit_change,
            unbonding_mature_time: update.unbonding_mature_time,
        });
        Ok(())
    }

    /// Withdraw the whole available deposit of a resource node
    pub fn remove_resource_node(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
        owner: &AccountAddress,
    ) -> Result<UnbondOutcome> {
        self.remove_node(ctx, NodeKind::Resource, network_address, owner)
    }

    /// Withdraw the whole available deposit of a meta node
    pub fn remove_meta_node(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
        owner: &AccountAddress,
    ) -> Result<UnbondOutcome> {
        self.remove_node(ctx, NodeKind::Meta, network_address, owner)
    }

    fn remove_node(
        &self,
        ctx: &Context<'_>,
        kind: NodeKind,
        network_address: &NetworkAddress,
        owner: &AccountAddress,
    ) -> Result<UnbondOutcome> {
        ctx.atomic(|ctx| {
            let params = RegisterParams::load(ctx.store())?;
            let node = self.owned_node(ctx, kind, network_address, owner)?;
            if node.status() == BondStatus::Unbonding {
                return Err(RegisterError::UnbondingNode(network_address.to_string()));
            }

            let available = self.deposits.available_deposit(ctx.store(), &node)?;
            let outcome = self.scheduler.unbond(ctx, &params, node, available)?;

            ctx.emit(RegisterEvent::UnbondingNode {
                kind,
                network_address: *network_address,
                deposit_to_remove: Coin::new(params.bond_denom.clone(), available),
                ozone_limit_change: -(outcome.ozone_limit_change as i128),
                unbonding_mature_time: outcome.mature_time,
            });
            Ok(outcome)
        })
    }

    /// Withdraw the deposit of a meta node that was never admitted
    ///
    /// Closes the admission vote. Returns the maturity time of the withdrawal.
    pub fn withdraw_meta_node_registration_deposit(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
        owner: &AccountAddress,
    ) -> Result<DateTime<Utc>> {
        ctx.atomic(|ctx| {
            let params = RegisterParams::load(ctx.store())?;
            let node = self.owned_node(ctx, NodeKind::Meta, network_address, owner)?;
            if node.status() != BondStatus::Unbonded {
                return Err(RegisterError::InvalidNodeStatus(format!(
                    "meta node {} is {}, registration deposit can only be withdrawn before admission",
                    network_address,
                    node.status()
                )));
            }

            let available = self.deposits.available_deposit(ctx.store(), &node)?;
            let outcome = self.scheduler.unbond(ctx, &params, node, available)?;
            VotePool::remove(ctx.store(), VoteKind::Registration, network_address)?;

            ctx.emit(RegisterEvent::WithdrawMetaNodeRegistrationDeposit {
                network_address: *network_address,
                unbonding_mature_time: outcome.mature_time,
            });
            Ok(outcome.mature_time)
        })
    }

    // ---- Votes ----

    /// Vote on the admission of a registered meta node
    #[allow(clippy::too_many_arguments)]
    pub fn handle_vote_for_meta_node_registration(
        &self,
        ctx: &Context<'_>,
        candidate: &NetworkAddress,
        candidate_owner: &AccountAddress,
        opinion: VoteOpinion,
        voter: &NetworkAddress,
        voter_owner: &AccountAddress,
    ) -> Result<BondStatus> {
        ctx.atomic(|ctx| {
            let params = RegisterParams::load(ctx.store())?;
            self.votes.handle_registration_vote(
                ctx,
                &params,
                candidate,
                candidate_owner,
                opinion,
                voter,
                voter_owner,
            )
        })
    }

    /// Vote on removing a meta node
    #[allow(clippy::too_many_arguments)]
    pub fn handle_vote_for_meta_node_kick(
        &self,
        ctx: &Context<'_>,
        target: &NetworkAddress,
        target_owner: &AccountAddress,
        opinion: VoteOpinion,
        voter: &NetworkAddress,
        voter_owner: &AccountAddress,
    ) -> Result<BondStatus> {
        ctx.atomic(|ctx| {
            let params = RegisterParams::load(ctx.store())?;
            self.votes.handle_kick_vote(
                ctx,
                &params,
                target,
                target_owner,
                opinion,
                voter,
                voter_owner,
            )
        })
    }

    // ---- Descriptions ----

    /// Update the description and node type of a resource node
    pub fn update_resource_node(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
        owner: &AccountAddress,
        description: Description,
        node_type: u32,
    ) -> Result<()> {
        description.validate()?;
        let node_type = NodeType::new(node_type)?;

        ctx.atomic(|ctx| {
            let node = self.owned_node(ctx, NodeKind::Resource, network_address, owner)?;
            if let ServiceNode::Resource(mut node) = node {
                node.description = description;
                node.node_type = node_type;
                self.nodes.set_resource_node(ctx.store(), &node)?;
            }

            debug!("Updated resource node {}", network_address);
            ctx.emit(RegisterEvent::UpdateNode {
                kind: NodeKind::Resource,
                network_address: *network_address,
            });
            Ok(())
        })
    }

    /// Update the description and beneficiary of a meta node
    pub fn update_meta_node(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
        owner: &AccountAddress,
        description: Description,
        beneficiary: Option<AccountAddress>,
    ) -> Result<()> {
        description.validate()?;

        ctx.atomic(|ctx| {
            let node = self.owned_node(ctx, NodeKind::Meta, network_address, owner)?;
            if let ServiceNode::Meta(mut node) = node {
                node.description = description;
                if let Some(beneficiary) = beneficiary {
                    node.beneficiary_address = beneficiary;
                }
                self.nodes.set_meta_node(ctx.store(), &node)?;
            }

            debug!("Updated meta node {}", network_address);
            ctx.emit(RegisterEvent::UpdateNode {
                kind: NodeKind::Meta,
                network_address: *network_address,
            });
            Ok(())
        })
    }

    // ---- Capacity reports ----

    /// Apply an effective deposit reported by meta nodes for a resource node
    ///
    /// At least one reporter must be an active meta node owned by the matching
    /// reporter owner. A suspended node is unsuspended by the report.
    pub fn update_effective_deposit(
        &self,
        ctx: &Context<'_>,
        reporters: &[NetworkAddress],
        reporter_owners: &[AccountAddress],
        network_address: &NetworkAddress,
        effective_tokens: u128,
    ) -> Result<EffectiveDepositUpdate> {
        ctx.atomic(|ctx| {
            let store = ctx.store();

            let mut has_valid_reporter = false;
            for (reporter, reporter_owner) in reporters.iter().zip(reporter_owners) {
                if let Some(meta) = self.nodes.get_meta_node(store, reporter)? {
                    if meta.owner_address == *reporter_owner
                        && meta.status == BondStatus::Bonded
                        && !meta.suspended
                    {
                        has_valid_reporter = true;
                        break;
                    }
                }
            }
            if !has_valid_reporter {
                return Err(RegisterError::NoValidReporter);
            }

            let mut node = self
                .nodes
                .get_resource_node(store, network_address)?
                .ok_or_else(|| RegisterError::NoResourceNodeFound(network_address.to_string()))?;
            let available = self
                .deposits
                .available_deposit(store, &ServiceNode::from(node.clone()))?;
            if effective_tokens == 0 || effective_tokens > available {
                return Err(RegisterError::InvalidEffectiveToken(format!(
                    "effective deposit {} must be in 1..={}",
                    effective_tokens, available
                )));
            }

            let is_unsuspended = node.suspended;
            let ozone_limit_change = if node.suspended {
                node.suspended = false;
                self.deposits
                    .increase_ozone_limit_by_add_deposit(store, effective_tokens)? as i128
            } else if effective_tokens > node.effective_tokens {
                self.deposits
                    .increase_ozone_limit_by_add_deposit(store, effective_tokens - node.effective_tokens)?
                    as i128
            } else if effective_tokens < node.effective_tokens {
                -(self
                    .deposits
                    .decrease_ozone_limit_by_subtract_deposit(store, node.effective_tokens - effective_tokens)?
                    as i128)
            } else {
                0
            };
            node.effective_tokens = effective_tokens;
            self.nodes.set_resource_node(store, &node)?;

            info!(
                "Effective deposit of resource node {} set to {} (ozone limit change {}, unsuspended {})",
                network_address, effective_tokens, ozone_limit_change, is_unsuspended
            );
            ctx.emit(RegisterEvent::UpdateEffectiveDeposit {
                network_address: *network_address,
                effective_deposit_after: effective_tokens,
                is_unsuspended,
            });
            Ok(EffectiveDepositUpdate {
                is_unsuspended,
                ozone_limit_change,
                effective_tokens,
            })
        })
    }

    /// Penalize the owner of a resource node and optionally suspend the node
    ///
    /// The penalty is collected when the owner's deposit is next released.
    /// Suspension withdraws the node's ozone credit; if the remaining limit
    /// cannot cover it the call fails and no penalty is recorded.
    pub fn slash_resource_node(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
        penalty: u128,
        suspend: bool,
    ) -> Result<bool> {
        ctx.atomic(|ctx| {
            let store = ctx.store();
            let mut node = self
                .nodes
                .get_resource_node(store, network_address)?
                .ok_or_else(|| RegisterError::NoResourceNodeFound(network_address.to_string()))?;

            if suspend && !node.suspended {
                if node.effective_tokens > 0 && node.status == BondStatus::Bonded {
                    self.deposits
                        .decrease_ozone_limit_by_subtract_deposit(store, node.effective_tokens)?;
                }
                node.suspended = true;
                self.nodes.set_resource_node(store, &node)?;
                info!("Suspended resource node {}", network_address);
            }
            if penalty > 0 {
                self.slashing.add(store, &node.owner_address, penalty)?;
            }

            ctx.emit(RegisterEvent::SlashResourceNode {
                network_address: *network_address,
                penalty,
                suspended: node.suspended,
            });
            Ok(node.suspended)
        })
    }

    // ---- Block hooks ----

    /// Refresh the meta node index if it was invalidated
    pub fn begin_block(&self, ctx: &Context<'_>) -> Result<()> {
        if self.index_cache.needs_rebuild() {
            let active = self.active_meta_addresses(ctx)?;
            self.index_cache.rebuild(active);
        }
        Ok(())
    }

    /// Release matured unbondings
    ///
    /// The register never changes the validator set, so the returned list is
    /// always empty.
    pub fn end_block(&self, ctx: &Context<'_>) -> Result<Vec<ValidatorUpdate>> {
        let params = RegisterParams::load(ctx.store())?;
        let completed = self.scheduler.drain_mature(ctx, &params)?;
        if !completed.is_empty() {
            debug!(
                "Completed {} unbonding nodes at height {}",
                completed.len(),
                ctx.block_height()
            );
        }
        Ok(Vec::new())
    }

    /// Ordinal slot of an active meta node
    pub fn get_meta_node_index(&self, ctx: &Context<'_>, network_address: &NetworkAddress) -> Result<usize> {
        self.index_cache
            .get_index(network_address, || self.active_meta_addresses(ctx))
    }

    /// Force the meta node index to rebuild on next lookup
    pub fn reload_meta_node_index(&self, ctx: &Context<'_>) -> Result<()> {
        self.index_cache.invalidate();
        self.begin_block(ctx)
    }

    fn active_meta_addresses(&self, ctx: &Context<'_>) -> Result<Vec<NetworkAddress>> {
        Ok(self
            .nodes
            .get_all_active_meta_nodes(ctx.store())?
            .into_iter()
            .map(|node| node.network_address)
            .collect())
    }

    fn owned_node(
        &self,
        ctx: &Context<'_>,
        kind: NodeKind,
        network_address: &NetworkAddress,
        owner: &AccountAddress,
    ) -> Result<ServiceNode> {
        let node = self
            .nodes
            .get_node(ctx.store(), kind, network_address)?
            .ok_or_else(|| match kind {
                NodeKind::Resource => RegisterError::NoResourceNodeFound(network_address.to_string()),
                NodeKind::Meta => RegisterError::NoMetaNodeFound(network_address.to_string()),
            })?;
        if node.owner_address() != *owner {
            return Err(RegisterError::InvalidOwnerAddr(owner.to_string()));
        }
        Ok(node)
    }

    // ---- Queries ----

    /// Resource node by address
    pub fn get_resource_node(&self, ctx: &Context<'_>, network_address: &NetworkAddress) -> Result<Option<ResourceNode>> {
        self.nodes.get_resource_node(ctx.store(), network_address)
    }

    /// Meta node by address
    pub fn get_meta_node(&self, ctx: &Context<'_>, network_address: &NetworkAddress) -> Result<Option<MetaNode>> {
        self.nodes.get_meta_node(ctx.store(), network_address)
    }

    /// All resource nodes
    pub fn get_all_resource_nodes(&self, ctx: &Context<'_>) -> Result<Vec<ResourceNode>> {
        self.nodes.get_all_resource_nodes(ctx.store())
    }

    /// All meta nodes
    pub fn get_all_meta_nodes(&self, ctx: &Context<'_>) -> Result<Vec<MetaNode>> {
        self.nodes.get_all_meta_nodes(ctx.store())
    }

    /// Nodes of a kind owned by `owner`
    pub fn get_nodes_by_owner(
        &self,
        ctx: &Context<'_>,
        kind: NodeKind,
        owner: &AccountAddress,
    ) -> Result<Vec<ServiceNode>> {
        self.nodes.get_nodes_by_owner(ctx.store(), kind, owner)
    }

    /// Registration vote pool of a candidate
    pub fn get_registration_vote_pool(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
    ) -> Result<Option<VotePool>> {
        VotePool::load(ctx.store(), VoteKind::Registration, network_address)
    }

    /// Kick vote pool of a target
    pub fn get_kick_vote_pool(&self, ctx: &Context<'_>, network_address: &NetworkAddress) -> Result<Option<VotePool>> {
        VotePool::load(ctx.store(), VoteKind::Kick, network_address)
    }

    /// Open unbonding entries of a node
    pub fn get_unbonding_node(
        &self,
        ctx: &Context<'_>,
        network_address: &NetworkAddress,
    ) -> Result<Option<UnbondingNode>> {
        UnbondingNode::load(ctx.store(), network_address)
    }

    /// All nodes with open unbonding entries
    pub fn get_all_unbonding_nodes(&self, ctx: &Context<'_>) -> Result<Vec<UnbondingNode>> {
        UnbondingNode::load_all(ctx.store())
    }

    /// Balances of the register pools
    pub fn pool_totals(&self, ctx: &Context<'_>) -> Result<PoolTotals> {
        let params = RegisterParams::load(ctx.store())?;
        Ok(self.deposits.pool_totals(&params.bond_denom))
    }

    /// Remaining ozone limit
    pub fn remaining_ozone_limit(&self, ctx: &Context<'_>) -> Result<u128> {
        self.deposits.get_remaining_ozone_limit(ctx.store())
    }

    /// Effective total deposit
    pub fn effective_total_deposit(&self, ctx: &Context<'_>) -> Result<u128> {
        self.deposits.get_effective_total_deposit(ctx.store())
    }

    /// Deposit to ozone conversion rate
    pub fn deposit_noz_rate(&self, ctx: &Context<'_>) -> Result<Decimal> {
        self.deposits.get_deposit_noz_rate(ctx.store())
    }

    /// Number of bonded nodes of a kind
    pub fn bonded_node_count(&self, ctx: &Context<'_>, kind: NodeKind) -> Result<u64> {
        self.deposits.get_bonded_count(ctx.store(), kind)
    }

    /// Outstanding slashing of an owner
    pub fn slashing_of(&self, ctx: &Context<'_>, owner: &AccountAddress) -> Result<u128> {
        self.slashing.get(ctx.store(), owner)
    }
}
