//! Meta node admission and kick votes
//!
//! This module implements the peer vote state machine:
//! - Registration vote pools opened when a meta node registers
//! - Kick vote pools opened on the first kick vote
//! - Voter eligibility re-checked on every vote
//! - A two-thirds majority of the current active meta node count
//! - Passed pools are sticky; later votes are recorded but change nothing

use crate::context::Context;
use crate::deposit::DepositEngine;
use crate::error::{RegisterError, Result};
use crate::events::RegisterEvent;
use crate::index_cache::MetaNodeIndexCache;
use crate::ledger;
use crate::node_store::NodeStore;
use crate::params::RegisterParams;
use crate::store::{self, keys, KvStore};
use crate::types::{
    AccountAddress, BondStatus, Coin, MetaNode, NetworkAddress, NodeKind, ServiceNode, VoteOpinion,
};
use crate::unbonding::{UnbondingNode, UnbondingScheduler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Kind of vote pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteKind {
    /// Admission of a newly registered meta node
    Registration,
    /// Removal of a bonded meta node
    Kick,
}

impl VoteKind {
    fn key(&self, addr: &NetworkAddress) -> Vec<u8> {
        match self {
            VoteKind::Registration => keys::registration_vote_key(addr),
            VoteKind::Kick => keys::kick_vote_key(addr),
        }
    }

    fn prefix(&self) -> u8 {
        match self {
            VoteKind::Registration => keys::REGISTRATION_VOTE_PREFIX,
            VoteKind::Kick => keys::KICK_VOTE_PREFIX,
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteKind::Registration => write!(f, "registration"),
            VoteKind::Kick => write!(f, "kick"),
        }
    }
}

/// Votes cast on one subject node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePool {
    /// Candidate or target meta node
    pub network_address: NetworkAddress,
    /// Pool kind
    pub kind: VoteKind,
    /// Voters in favour, in voting order
    pub approve_list: Vec<NetworkAddress>,
    /// Voters against, in voting order
    pub reject_list: Vec<NetworkAddress>,
    /// Votes after this time are rejected
    pub expire_time: DateTime<Utc>,
    /// Set once the majority was reached
    pub is_vote_passed: bool,
}

impl VotePool {
    /// Create an open pool
    pub fn new(network_address: NetworkAddress, kind: VoteKind, expire_time: DateTime<Utc>) -> Self {
        Self {
            network_address,
            kind,
            approve_list: Vec::new(),
            reject_list: Vec::new(),
            expire_time,
            is_vote_passed: false,
        }
    }

    /// Load the pool of `kind` for `addr`
    pub fn load(store: &dyn KvStore, kind: VoteKind, addr: &NetworkAddress) -> Result<Option<Self>> {
        store::get_record(store, &kind.key(addr))
    }

    /// All pools of `kind`, ascending by subject address
    pub fn load_all(store: &dyn KvStore, kind: VoteKind) -> Result<Vec<Self>> {
        store
            .prefix_scan(&[kind.prefix()])?
            .into_iter()
            .map(|(_, bytes)| store::decode(&bytes))
            .collect()
    }

    /// Persist the pool
    pub fn save(&self, store: &dyn KvStore) -> Result<()> {
        store::set_record(store, self.kind.key(&self.network_address), self)
    }

    /// Delete the pool of `kind` for `addr`
    pub fn remove(store: &dyn KvStore, kind: VoteKind, addr: &NetworkAddress) -> Result<()> {
        store.delete(&kind.key(addr))
    }

    /// Whether `voter` already voted
    pub fn has_voted(&self, voter: &NetworkAddress) -> bool {
        self.approve_list.contains(voter) || self.reject_list.contains(voter)
    }

    /// Whether votes are no longer accepted at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_time < now
    }

    /// Record a vote
    pub fn record(&mut self, voter: NetworkAddress, opinion: VoteOpinion) {
        match opinion {
            VoteOpinion::Approve => self.approve_list.push(voter),
            VoteOpinion::Reject => self.reject_list.push(voter),
        }
    }

    /// Number of approvals
    pub fn approvals(&self) -> usize {
        self.approve_list.len()
    }
}

/// Delete both vote pools of `addr`
pub fn remove_vote_pools(store: &dyn KvStore, addr: &NetworkAddress) -> Result<()> {
    store.delete(&keys::registration_vote_key(addr))?;
    store.delete(&keys::kick_vote_key(addr))
}

/// Approvals needed to pass with `active_count` active meta nodes
pub fn required_votes(active_count: usize) -> usize {
    active_count * 2 / 3 + 1
}

/// Vote engine for meta node admission and kicks
pub struct VoteEngine {
    /// Node records
    nodes: Arc<NodeStore>,

    /// Deposit and capacity engine
    deposits: Arc<DepositEngine>,

    /// Unbonding path taken by a passing kick
    scheduler: Arc<UnbondingScheduler>,

    /// Ordinal index of active meta nodes
    index_cache: Arc<MetaNodeIndexCache>,
}

impl VoteEngine {
    /// Create a vote engine
    pub fn new(
        nodes: Arc<NodeStore>,
        deposits: Arc<DepositEngine>,
        scheduler: Arc<UnbondingScheduler>,
        index_cache: Arc<MetaNodeIndexCache>,
    ) -> Self {
        Self {
            nodes,
            deposits,
            scheduler,
            index_cache,
        }
    }

    /// Open the registration pool of a newly registered meta node
    pub fn open_registration_pool(
        &self,
        ctx: &Context<'_>,
        params: &RegisterParams,
        candidate: NetworkAddress,
    ) -> Result<VotePool> {
        let pool = VotePool::new(
            candidate,
            VoteKind::Registration,
            ctx.block_time() + params.voting_period(),
        );
        pool.save(ctx.store())?;
        debug!(
            "Opened registration vote pool for {} (expires {})",
            candidate, pool.expire_time
        );
        Ok(pool)
    }

    /// Vote on the admission of `candidate`
    ///
    /// Returns the candidate's status after the vote.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_registration_vote(
        &self,
        ctx: &Context<'_>,
        params: &RegisterParams,
        candidate: &NetworkAddress,
        candidate_owner: &AccountAddress,
        opinion: VoteOpinion,
        voter: &NetworkAddress,
        voter_owner: &AccountAddress,
    ) -> Result<BondStatus> {
        let store = ctx.store();
        let mut pool = VotePool::load(store, VoteKind::Registration, candidate)?
            .ok_or_else(|| RegisterError::NoRegistrationVotePoolFound(candidate.to_string()))?;

        let node = self.check_vote(ctx, &pool, candidate, candidate_owner, voter, voter_owner)?;
        pool.record(*voter, opinion);

        let status = if pool.is_vote_passed {
            node.status
        } else {
            self.evaluate(ctx, params, &mut pool, node)?
        };
        pool.save(store)?;

        ctx.emit(RegisterEvent::RegistrationVote {
            voter: *voter,
            candidate: *candidate,
            candidate_status: status,
        });
        Ok(status)
    }

    /// Vote on the removal of `target`
    ///
    /// Returns the target's status after the vote.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_kick_vote(
        &self,
        ctx: &Context<'_>,
        params: &RegisterParams,
        target: &NetworkAddress,
        target_owner: &AccountAddress,
        opinion: VoteOpinion,
        voter: &NetworkAddress,
        voter_owner: &AccountAddress,
    ) -> Result<BondStatus> {
        let store = ctx.store();
        let now = ctx.block_time();
        let mut pool = match VotePool::load(store, VoteKind::Kick, target)? {
            Some(pool) if pool.is_vote_passed || !pool.is_expired(now) => pool,
            Some(_) => {
                debug!("Kick vote pool for {} expired without passing, opening a new round", target);
                VotePool::new(*target, VoteKind::Kick, now + params.voting_period())
            }
            None => {
                debug!("Opening kick vote pool for {}", target);
                VotePool::new(*target, VoteKind::Kick, now + params.voting_period())
            }
        };

        if voter == target {
            return Err(RegisterError::SameAddr(voter.to_string()));
        }
        let node = self.check_vote(ctx, &pool, target, target_owner, voter, voter_owner)?;
        pool.record(*voter, opinion);

        let status = if pool.is_vote_passed {
            node.status
        } else {
            self.evaluate(ctx, params, &mut pool, node)?
        };
        pool.save(store)?;

        ctx.emit(RegisterEvent::KickVote {
            voter: *voter,
            target: *target,
            target_status: status,
        });
        Ok(status)
    }

    /// Validate a vote before anything is recorded
    fn check_vote(
        &self,
        ctx: &Context<'_>,
        pool: &VotePool,
        subject: &NetworkAddress,
        subject_owner: &AccountAddress,
        voter: &NetworkAddress,
        voter_owner: &AccountAddress,
    ) -> Result<MetaNode> {
        let store = ctx.store();

        if pool.is_expired(ctx.block_time()) {
            return Err(RegisterError::VoteExpired(subject.to_string()));
        }
        if pool.has_voted(voter) {
            return Err(RegisterError::DuplicateVoting(voter.to_string()));
        }

        let node = self
            .nodes
            .get_meta_node(store, subject)?
            .ok_or_else(|| RegisterError::NoMetaNodeFound(subject.to_string()))?;
        if node.owner_address != *subject_owner {
            return Err(RegisterError::InvalidOwnerAddr(subject_owner.to_string()));
        }

        let voter_node = self
            .nodes
            .get_meta_node(store, voter)?
            .ok_or_else(|| RegisterError::NoMetaNodeFound(voter.to_string()))?;
        if voter_node.owner_address != *voter_owner {
            return Err(RegisterError::InvalidOwnerAddr(voter_owner.to_string()));
        }
        if voter_node.status != BondStatus::Bonded || voter_node.suspended {
            return Err(RegisterError::InvalidVoterStatus(voter.to_string()));
        }

        Ok(node)
    }

    /// Run the pool's action once approvals reach the current majority
    fn evaluate(
        &self,
        ctx: &Context<'_>,
        params: &RegisterParams,
        pool: &mut VotePool,
        node: MetaNode,
    ) -> Result<BondStatus> {
        let active = self.nodes.get_all_active_meta_nodes(ctx.store())?.len();
        let required = required_votes(active);
        debug!(
            "{} vote on {}: {} of {} approvals ({} active meta nodes)",
            pool.kind,
            pool.network_address,
            pool.approvals(),
            required,
            active
        );
        if pool.approvals() < required {
            return Ok(node.status);
        }

        let status = match pool.kind {
            VoteKind::Registration => self.admit(ctx, params, node)?,
            VoteKind::Kick => self.kick(ctx, params, node)?,
        };
        pool.is_vote_passed = true;
        Ok(status)
    }

    /// Bond an admitted meta node
    fn admit(&self, ctx: &Context<'_>, params: &RegisterParams, mut node: MetaNode) -> Result<BondStatus> {
        match node.status {
            BondStatus::Unbonded => {}
            BondStatus::Bonded => return Ok(node.status),
            BondStatus::Unbonding => {
                return Err(RegisterError::UnbondingNode(node.network_address.to_string()));
            }
        }

        let store = ctx.store();
        // A candidate withdrawing its registration deposit cannot be admitted
        if UnbondingNode::load(store, &node.network_address)?.is_some() {
            return Err(RegisterError::UnbondingNode(node.network_address.to_string()));
        }
        let available = self.deposits.available_deposit(store, &ServiceNode::from(node.clone()))?;
        if available == 0 {
            return Err(RegisterError::InsufficientBalance(format!(
                "meta node {} has no deposit to bond",
                node.network_address
            )));
        }
        self.deposits.ledger().send_pool_to_pool(
            ledger::not_bonded_pool(NodeKind::Meta),
            ledger::bonded_pool(NodeKind::Meta),
            &Coin::new(params.bond_denom.clone(), available),
        )?;

        node.status = BondStatus::Bonded;
        node.suspended = false;
        self.nodes.set_meta_node(store, &node)?;
        self.deposits.increment_bonded_count(store, NodeKind::Meta)?;
        self.index_cache.invalidate();
        let ozone = self.deposits.increase_ozone_limit_by_add_deposit(store, available)?;

        info!(
            "Meta node {} admitted by vote: bonded {} {}, ozone limit +{}",
            node.network_address, available, params.bond_denom, ozone
        );
        Ok(node.status)
    }

    /// Unbond the whole available deposit of a kicked meta node
    fn kick(&self, ctx: &Context<'_>, params: &RegisterParams, node: MetaNode) -> Result<BondStatus> {
        let addr = node.network_address;
        let service_node = ServiceNode::from(node);
        let available = self.deposits.available_deposit(ctx.store(), &service_node)?;
        if available == 0 {
            info!("Meta node {} kicked with no available deposit", addr);
            return Ok(service_node.status());
        }

        let outcome = self.scheduler.unbond(ctx, params, service_node, available)?;
        ctx.emit(RegisterEvent::UnbondingNode {
            kind: NodeKind::Meta,
            network_address: addr,
            deposit_to_remove: Coin::new(params.bond_denom.clone(), available),
            ozone_limit_change: -(outcome.ozone_limit_change as i128),
            unbonding_mature_time: outcome.mature_time,
        });

        info!("Meta node {} kicked by vote, unbonding {}", addr, available);
        Ok(outcome.node.status())
    }
}
