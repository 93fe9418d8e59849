//! Deposit and capacity accounting
//!
//! This module implements:
//! - Deposit top-ups and releases against the bonded / not-bonded pools
//! - The remaining ozone limit and effective total deposit scalars
//! - Deposit to ozone conversion at the stored rate
//! - The global solvency check evaluated before any unbonding starts
//! - Bonded node counters and pool totals

use crate::error::{RegisterError, Result};
use crate::ledger::{self, Ledger};
use crate::node_store::NodeStore;
use crate::params::RegisterParams;
use crate::slashing::SlashingLedger;
use crate::store::{self, keys, KvStore};
use crate::types::{BondStatus, Coin, NodeKind, ServiceNode};
use crate::unbonding::UnbondingNode;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a deposit top-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositChange {
    /// Ozone limit granted by the top-up (zero while suspended)
    pub ozone_limit_change: i128,
    /// Available deposit before the top-up
    pub available_before: u128,
    /// Available deposit after the top-up
    pub available_after: u128,
}

/// Balances of the register pools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTotals {
    /// Resource node bonded pool
    pub resource_node_bonded: u128,
    /// Resource node not-bonded pool
    pub resource_node_not_bonded: u128,
    /// Meta node bonded pool
    pub meta_node_bonded: u128,
    /// Meta node not-bonded pool
    pub meta_node_not_bonded: u128,
    /// Slashed funds sink
    pub total_slashed: u128,
}

impl PoolTotals {
    /// Whether the four deposit pools are empty
    pub fn deposit_pools_empty(&self) -> bool {
        self.resource_node_bonded == 0
            && self.resource_node_not_bonded == 0
            && self.meta_node_bonded == 0
            && self.meta_node_not_bonded == 0
    }
}

/// Deposit and capacity engine
pub struct DepositEngine {
    /// Wallet and pool balances
    ledger: Arc<dyn Ledger>,

    /// Node records
    nodes: Arc<NodeStore>,

    /// Outstanding penalties
    slashing: SlashingLedger,
}

impl DepositEngine {
    /// Create a deposit engine
    pub fn new(ledger: Arc<dyn Ledger>, nodes: Arc<NodeStore>) -> Self {
        Self {
            ledger,
            nodes,
            slashing: SlashingLedger::new(),
        }
    }

    /// Ledger gateway
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Remaining ozone limit
    pub fn get_remaining_ozone_limit(&self, store: &dyn KvStore) -> Result<u128> {
        Ok(store::get_record::<u128>(store, keys::REMAINING_OZONE_LIMIT)?.unwrap_or(0))
    }

    pub(crate) fn set_remaining_ozone_limit(&self, store: &dyn KvStore, value: u128) -> Result<()> {
        store::set_record(store, keys::REMAINING_OZONE_LIMIT.to_vec(), &value)
    }

    /// Effective total deposit
    pub fn get_effective_total_deposit(&self, store: &dyn KvStore) -> Result<u128> {
        Ok(store::get_record::<u128>(store, keys::EFFECTIVE_TOTAL_DEPOSIT)?.unwrap_or(0))
    }

    pub(crate) fn set_effective_total_deposit(&self, store: &dyn KvStore, value: u128) -> Result<()> {
        store::set_record(store, keys::EFFECTIVE_TOTAL_DEPOSIT.to_vec(), &value)
    }

    /// Deposit to ozone conversion rate
    pub fn get_deposit_noz_rate(&self, store: &dyn KvStore) -> Result<Decimal> {
        match store::get_record::<Decimal>(store, keys::DEPOSIT_NOZ_RATE)? {
            Some(rate) if rate > Decimal::ZERO => Ok(rate),
            _ => Err(RegisterError::InvalidDepositNozRate),
        }
    }

    /// Set the deposit to ozone conversion rate
    pub fn set_deposit_noz_rate(&self, store: &dyn KvStore, rate: Decimal) -> Result<()> {
        if rate <= Decimal::ZERO {
            return Err(RegisterError::InvalidDepositNozRate);
        }
        store::set_record(store, keys::DEPOSIT_NOZ_RATE.to_vec(), &rate)
    }

    /// Total deposit credited at genesis
    pub fn get_initial_genesis_deposit_total(&self, store: &dyn KvStore) -> Result<u128> {
        Ok(store::get_record::<u128>(store, keys::INITIAL_GENESIS_DEPOSIT_TOTAL)?.unwrap_or(0))
    }

    pub(crate) fn set_initial_genesis_deposit_total(&self, store: &dyn KvStore, value: u128) -> Result<()> {
        store::set_record(store, keys::INITIAL_GENESIS_DEPOSIT_TOTAL.to_vec(), &value)
    }

    fn bonded_count_key(kind: NodeKind) -> &'static [u8] {
        match kind {
            NodeKind::Resource => keys::BONDED_RESOURCE_NODE_COUNT,
            NodeKind::Meta => keys::BONDED_META_NODE_COUNT,
        }
    }

    /// Number of bonded nodes of a kind
    pub fn get_bonded_count(&self, store: &dyn KvStore, kind: NodeKind) -> Result<u64> {
        Ok(store::get_record::<u64>(store, Self::bonded_count_key(kind))?.unwrap_or(0))
    }

    pub(crate) fn set_bonded_count(&self, store: &dyn KvStore, kind: NodeKind, count: u64) -> Result<()> {
        store::set_record(store, Self::bonded_count_key(kind).to_vec(), &count)
    }

    pub(crate) fn increment_bonded_count(&self, store: &dyn KvStore, kind: NodeKind) -> Result<()> {
        let count = self.get_bonded_count(store, kind)?;
        self.set_bonded_count(store, kind, count + 1)
    }

    pub(crate) fn decrement_bonded_count(&self, store: &dyn KvStore, kind: NodeKind) -> Result<()> {
        let count = self.get_bonded_count(store, kind)?;
        self.set_bonded_count(store, kind, count.saturating_sub(1))
    }

    /// Ozone limit equivalent of `amount`, truncated
    pub fn ozone_for_deposit(&self, store: &dyn KvStore, amount: u128) -> Result<u128> {
        let rate = self.get_deposit_noz_rate(store)?;
        let amount = to_decimal(amount)?;
        amount
            .checked_div(rate)
            .and_then(|ozone| ozone.trunc().to_u128())
            .ok_or_else(|| RegisterError::InvalidAmount(format!("cannot convert {} at rate {}", amount, rate)))
    }

    /// Credit `amount` of deposit to the capacity market
    ///
    /// Returns the ozone limit granted.
    pub fn increase_ozone_limit_by_add_deposit(&self, store: &dyn KvStore, amount: u128) -> Result<u128> {
        let ozone = self.ozone_for_deposit(store, amount)?;
        let remaining = self.get_remaining_ozone_limit(store)?;
        let effective_total = self.get_effective_total_deposit(store)?;

        let new_remaining = remaining
            .checked_add(ozone)
            .ok_or_else(|| RegisterError::Invariant("remaining ozone limit overflow".to_string()))?;
        let new_effective_total = effective_total
            .checked_add(amount)
            .ok_or_else(|| RegisterError::Invariant("effective total deposit overflow".to_string()))?;

        self.set_remaining_ozone_limit(store, new_remaining)?;
        self.set_effective_total_deposit(store, new_effective_total)?;

        debug!(
            "Ozone limit increased by {} for deposit {} (remaining {}, effective total {})",
            ozone, amount, new_remaining, new_effective_total
        );
        Ok(ozone)
    }

    /// Withdraw the credit of `amount` of deposit from the capacity market
    ///
    /// Returns the ozone limit withdrawn.
    pub fn decrease_ozone_limit_by_subtract_deposit(&self, store: &dyn KvStore, amount: u128) -> Result<u128> {
        let ozone = self.ozone_for_deposit(store, amount)?;
        let remaining = self.get_remaining_ozone_limit(store)?;
        let effective_total = self.get_effective_total_deposit(store)?;

        let new_remaining = remaining
            .checked_sub(ozone)
            .ok_or(RegisterError::InsufficientOzoneLimit(remaining))?;
        let new_effective_total = effective_total.checked_sub(amount).ok_or_else(|| {
            RegisterError::Invariant(format!(
                "effective total deposit {} below withdrawn credit {}",
                effective_total, amount
            ))
        })?;

        self.set_remaining_ozone_limit(store, new_remaining)?;
        self.set_effective_total_deposit(store, new_effective_total)?;

        debug!(
            "Ozone limit decreased by {} for deposit {} (remaining {}, effective total {})",
            ozone, amount, new_remaining, new_effective_total
        );
        Ok(ozone)
    }

    /// Whether releasing `amount` keeps the remaining ozone limit non-negative
    pub fn is_unbondable(&self, store: &dyn KvStore, amount: u128) -> Result<bool> {
        let rate = self.get_deposit_noz_rate(store)?;
        let remaining = to_decimal(self.get_remaining_ozone_limit(store)?)?;
        let required = to_decimal(amount)?
            .checked_div(rate)
            .ok_or(RegisterError::InvalidDepositNozRate)?;
        Ok(remaining >= required)
    }

    /// Deposit not already being unbonded
    pub fn available_deposit(&self, store: &dyn KvStore, node: &ServiceNode) -> Result<u128> {
        let unbonding = UnbondingNode::load(store, &node.network_address())?
            .map(|ubd| ubd.balance())
            .unwrap_or(0);
        Ok(node.tokens().saturating_sub(unbonding))
    }

    /// Move `coin` from the owner into the node's deposit
    ///
    /// The node record is updated in place and persisted.
    pub fn add_deposit(
        &self,
        store: &dyn KvStore,
        params: &RegisterParams,
        node: &mut ServiceNode,
        coin: &Coin,
    ) -> Result<DepositChange> {
        validate_coin(params, coin)?;

        let owner = node.owner_address();
        if !self.ledger.has_balance(&owner, coin) {
            return Err(RegisterError::InsufficientBalance(format!(
                "owner {} does not hold {}",
                owner, coin
            )));
        }

        let kind = node.kind();
        let pool = match node.status() {
            BondStatus::Unbonded => ledger::not_bonded_pool(kind),
            BondStatus::Bonded => ledger::bonded_pool(kind),
            BondStatus::Unbonding => {
                return Err(RegisterError::UnbondingNode(node.network_address().to_string()));
            }
        };

        let available_before = self.available_deposit(store, node)?;
        let mut updated = node.clone();
        updated.add_tokens(coin.amount)?;

        self.ledger.send_account_to_pool(&owner, pool, coin)?;
        self.nodes.set_node(store, &updated)?;

        let ozone_limit_change = if updated.suspended() {
            debug!(
                "Node {} is suspended, ozone credit for {} deferred",
                updated.network_address(),
                coin
            );
            0
        } else {
            self.increase_ozone_limit_by_add_deposit(store, coin.amount)? as i128
        };

        info!(
            "Added deposit {} to {} node {} (tokens {})",
            coin,
            kind,
            updated.network_address(),
            updated.tokens()
        );

        *node = updated;
        Ok(DepositChange {
            ozone_limit_change,
            available_before,
            available_after: available_before + coin.amount,
        })
    }

    /// Release `coin` of a node's deposit from the not-bonded pool
    ///
    /// Outstanding slashing is netted first; the deducted part goes to the
    /// slashed-funds sink. Returns the node after the release, or `None` once
    /// its deposit reached zero and the record was deleted.
    pub fn subtract_deposit(
        &self,
        store: &dyn KvStore,
        node: ServiceNode,
        coin: &Coin,
    ) -> Result<Option<ServiceNode>> {
        if coin.amount == 0 {
            return Err(RegisterError::InvalidAmount("release amount must be positive".to_string()));
        }
        if node.tokens() < coin.amount {
            return Err(RegisterError::InsufficientBalance(format!(
                "node {} holds {} tokens, cannot release {}",
                node.network_address(),
                node.tokens(),
                coin.amount
            )));
        }

        let kind = node.kind();
        let pool = ledger::not_bonded_pool(kind);
        if self.ledger.pool_balance(pool, &coin.denom).amount < coin.amount {
            return Err(RegisterError::InsufficientBalanceOfNotBondedPool);
        }

        let owner = node.owner_address();
        let (remaining, deducted) = self.slashing.deduct(store, &owner, coin.amount)?;
        if deducted > 0 {
            self.ledger
                .fund_community_pool(pool, &Coin::new(coin.denom.clone(), deducted))?;
        }
        if remaining > 0 {
            self.ledger
                .send_pool_to_account(pool, &owner, &Coin::new(coin.denom.clone(), remaining))?;
        }

        let mut updated = node;
        updated.sub_tokens(coin.amount)?;

        info!(
            "Released {} from {} node {} to owner {} ({} slashed)",
            coin,
            kind,
            updated.network_address(),
            owner,
            deducted
        );

        if updated.tokens() == 0 {
            self.nodes.remove_node(store, kind, &updated.network_address())?;
            info!("Removed {} node {} with zero deposit", kind, updated.network_address());
            return Ok(None);
        }

        self.nodes.set_node(store, &updated)?;
        Ok(Some(updated))
    }

    /// Balances of the register pools in `denom`
    pub fn pool_totals(&self, denom: &str) -> PoolTotals {
        let balance = |pool: &str| self.ledger.pool_balance(pool, denom).amount;
        PoolTotals {
            resource_node_bonded: balance(ledger::RESOURCE_NODE_BONDED_POOL),
            resource_node_not_bonded: balance(ledger::RESOURCE_NODE_NOT_BONDED_POOL),
            meta_node_bonded: balance(ledger::META_NODE_BONDED_POOL),
            meta_node_not_bonded: balance(ledger::META_NODE_NOT_BONDED_POOL),
            total_slashed: balance(ledger::TOTAL_SLASHED_POOL),
        }
    }
}

/// Reject coins of the wrong denomination or with zero amount
pub fn validate_coin(params: &RegisterParams, coin: &Coin) -> Result<()> {
    if coin.denom != params.bond_denom {
        return Err(RegisterError::BadDenom {
            expected: params.bond_denom.clone(),
            got: coin.denom.clone(),
        });
    }
    if coin.is_zero() {
        return Err(RegisterError::InvalidAmount("amount must be positive".to_string()));
    }
    Ok(())
}

fn to_decimal(amount: u128) -> Result<Decimal> {
    Decimal::from_u128(amount)
        .ok_or_else(|| RegisterError::InvalidAmount(format!("amount {} out of range", amount)))
}
