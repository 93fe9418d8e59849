//! Ledger gateway
//!
//! The register module never holds balances itself. Token custody goes
//! through the `Ledger` trait supplied by the host:
//! - Owner wallets
//! - Module pool accounts (bonded / not-bonded per node kind)
//! - The slashed-funds sink
//!
//! `MemoryLedger` is a complete in-memory implementation used by tests and
//! embedders without a bank module.

use crate::error::{RegisterError, Result};
use crate::types::{AccountAddress, Coin, NodeKind};
use dashmap::DashMap;
use tracing::debug;

/// Bonded pool for resource nodes
pub const RESOURCE_NODE_BONDED_POOL: &str = "resource_node_bonded_pool";
/// Not-bonded pool for resource nodes
pub const RESOURCE_NODE_NOT_BONDED_POOL: &str = "resource_node_not_bonded_pool";
/// Bonded pool for meta nodes
pub const META_NODE_BONDED_POOL: &str = "meta_node_bonded_pool";
/// Not-bonded pool for meta nodes
pub const META_NODE_NOT_BONDED_POOL: &str = "meta_node_not_bonded_pool";
/// Sink for slashed funds
pub const TOTAL_SLASHED_POOL: &str = "total_slashed_pool";

/// Bonded pool name for a node kind
pub fn bonded_pool(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Resource => RESOURCE_NODE_BONDED_POOL,
        NodeKind::Meta => META_NODE_BONDED_POOL,
    }
}

/// Not-bonded pool name for a node kind
pub fn not_bonded_pool(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Resource => RESOURCE_NODE_NOT_BONDED_POOL,
        NodeKind::Meta => META_NODE_NOT_BONDED_POOL,
    }
}

/// Balance transfer interface consumed by the register module
pub trait Ledger: Send + Sync {
    /// Whether `owner` holds at least `coin`
    fn has_balance(&self, owner: &AccountAddress, coin: &Coin) -> bool;

    /// Balance of `owner` in `denom`
    fn get_balance(&self, owner: &AccountAddress, denom: &str) -> Coin;

    /// Balance of a module pool in `denom`
    fn pool_balance(&self, pool: &str, denom: &str) -> Coin;

    /// Move `coin` from a wallet into a pool
    fn send_account_to_pool(&self, owner: &AccountAddress, pool: &str, coin: &Coin) -> Result<()>;

    /// Move `coin` from a pool to a wallet
    fn send_pool_to_account(&self, pool: &str, owner: &AccountAddress, coin: &Coin) -> Result<()>;

    /// Move `coin` between pools
    fn send_pool_to_pool(&self, from_pool: &str, to_pool: &str, coin: &Coin) -> Result<()>;

    /// Move `coin` from a pool into the community / slashed sink
    fn fund_community_pool(&self, from_pool: &str, coin: &Coin) -> Result<()>;
}

/// Holder of a balance in the in-memory ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Holder {
    Account(AccountAddress),
    Pool(String),
}

/// In-memory ledger
#[derive(Default)]
pub struct MemoryLedger {
    balances: DashMap<(Holder, String), u128>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a wallet out of thin air (test and genesis funding)
    pub fn mint(&self, owner: &AccountAddress, coin: &Coin) {
        *self
            .balances
            .entry((Holder::Account(*owner), coin.denom.clone()))
            .or_insert(0) += coin.amount;
    }

    fn balance_of(&self, holder: &Holder, denom: &str) -> u128 {
        self.balances
            .get(&(holder.clone(), denom.to_string()))
            .map(|b| *b.value())
            .unwrap_or(0)
    }

    fn transfer(&self, from: Holder, to: Holder, coin: &Coin) -> Result<()> {
        if coin.amount == 0 {
            return Ok(());
        }
        let from_key = (from.clone(), coin.denom.clone());
        {
            let mut from_balance = self.balances.entry(from_key).or_insert(0);
            if *from_balance < coin.amount {
                return Err(RegisterError::Ledger(format!(
                    "{:?} holds {}{}, cannot send {}",
                    from, *from_balance, coin.denom, coin
                )));
            }
            *from_balance -= coin.amount;
        }
        *self
            .balances
            .entry((to.clone(), coin.denom.clone()))
            .or_insert(0) += coin.amount;

        debug!("Ledger transfer {} from {:?} to {:?}", coin, from, to);
        Ok(())
    }
}

impl Ledger for MemoryLedger {
    fn has_balance(&self, owner: &AccountAddress, coin: &Coin) -> bool {
        self.balance_of(&Holder::Account(*owner), &coin.denom) >= coin.amount
    }

    fn get_balance(&self, owner: &AccountAddress, denom: &str) -> Coin {
        Coin::new(denom, self.balance_of(&Holder::Account(*owner), denom))
    }

    fn pool_balance(&self, pool: &str, denom: &str) -> Coin {
        Coin::new(denom, self.balance_of(&Holder::Pool(pool.to_string()), denom))
    }

    fn send_account_to_pool(&self, owner: &AccountAddress, pool: &str, coin: &Coin) -> Result<()> {
        self.transfer(Holder::Account(*owner), Holder::Pool(pool.to_string()), coin)
    }

    fn send_pool_to_account(&self, pool: &str, owner: &AccountAddress, coin: &Coin) -> Result<()> {
        self.transfer(Holder::Pool(pool.to_string()), Holder::Account(*owner), coin)
    }

    fn send_pool_to_pool(&self, from_pool: &str, to_pool: &str, coin: &Coin) -> Result<()> {
        self.transfer(
            Holder::Pool(from_pool.to_string()),
            Holder::Pool(to_pool.to_string()),
            coin,
        )
    }

    fn fund_community_pool(&self, from_pool: &str, coin: &Coin) -> Result<()> {
        self.send_pool_to_pool(from_pool, TOTAL_SLASHED_POOL, coin)
    }
}
