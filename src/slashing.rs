//! Slashing ledger for node owners
//!
//! This module tracks outstanding penalties per owner wallet:
//! - Penalties accumulate per owner until funds are released
//! - Every release back to an owner is netted against the penalty first
//! - Deducted amounts go to the slashed-funds sink, never below zero on either side
//! - Full iteration for genesis export

use crate::error::{RegisterError, Result};
use crate::store::{self, keys, KvStore};
use crate::types::{AccountAddress, ADDRESS_LEN};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outstanding slashing of one wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingRecord {
    /// Owner wallet
    pub wallet_address: AccountAddress,
    /// Outstanding penalty
    pub value: u128,
}

/// Per-owner penalty ledger
#[derive(Debug, Default, Clone, Copy)]
pub struct SlashingLedger;

impl SlashingLedger {
    /// Create a slashing ledger
    pub fn new() -> Self {
        Self
    }

    /// Outstanding penalty of `owner`
    pub fn get(&self, store: &dyn KvStore, owner: &AccountAddress) -> Result<u128> {
        Ok(store::get_record::<u128>(store, &keys::slashing_key(owner))?.unwrap_or(0))
    }

    /// Overwrite the outstanding penalty of `owner`
    pub fn set(&self, store: &dyn KvStore, owner: &AccountAddress, amount: u128) -> Result<()> {
        let key = keys::slashing_key(owner);
        if amount == 0 {
            store.delete(&key)
        } else {
            store::set_record(store, key, &amount)
        }
    }

    /// Add `penalty` to the outstanding penalty of `owner`
    pub fn add(&self, store: &dyn KvStore, owner: &AccountAddress, penalty: u128) -> Result<u128> {
        let current = self.get(store, owner)?;
        let updated = current.checked_add(penalty).ok_or_else(|| {
            RegisterError::InvalidAmount(format!("slashing overflow for {}", owner))
        })?;
        self.set(store, owner, updated)?;

        info!(
            "Slashed owner {}: penalty {} added, outstanding {}",
            owner, penalty, updated
        );
        Ok(updated)
    }

    /// Net a release of `amount` against the penalty of `owner`
    ///
    /// Returns `(remaining, deducted)` with `remaining + deducted == amount`.
    pub fn deduct(
        &self,
        store: &dyn KvStore,
        owner: &AccountAddress,
        amount: u128,
    ) -> Result<(u128, u128)> {
        let outstanding = self.get(store, owner)?;
        if outstanding == 0 {
            return Ok((amount, 0));
        }

        let deducted = outstanding.min(amount);
        self.set(store, owner, outstanding - deducted)?;

        debug!(
            "Deducted {} from release of {} for owner {} (outstanding {} -> {})",
            deducted,
            amount,
            owner,
            outstanding,
            outstanding - deducted
        );
        Ok((amount - deducted, deducted))
    }

    /// All non-zero penalties, ascending by owner
    pub fn iterate(&self, store: &dyn KvStore) -> Result<Vec<SlashingRecord>> {
        let mut records = Vec::new();
        for (key, value) in store.prefix_scan(&[keys::SLASHING_PREFIX])? {
            let bytes = <[u8; ADDRESS_LEN]>::try_from(&key[1..]).map_err(|_| {
                RegisterError::Codec(format!("malformed slashing key of {} bytes", key.len()))
            })?;
            let value: u128 = store::decode(&value)?;
            if value > 0 {
                records.push(SlashingRecord {
                    wallet_address: AccountAddress::new(bytes),
                    value,
                });
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn create_test_owner(id: u8) -> AccountAddress {
        AccountAddress::new([id; ADDRESS_LEN])
    }

    #[test]
    fn test_deduct_without_penalty_passes_through() {
        let store = MemoryStore::new();
        let ledger = SlashingLedger::new();
        let owner = create_test_owner(1);

        assert_eq!(ledger.deduct(&store, &owner, 100).unwrap(), (100, 0));
        assert_eq!(ledger.get(&store, &owner).unwrap(), 0);
    }

    #[test]
    fn test_deduct_partial_penalty() {
        let store = MemoryStore::new();
        let ledger = SlashingLedger::new();
        let owner = create_test_owner(1);
        ledger.add(&store, &owner, 30).unwrap();

        // Release of 100 with 30 outstanding
        assert_eq!(ledger.deduct(&store, &owner, 100).unwrap(), (70, 30));
        assert_eq!(ledger.get(&store, &owner).unwrap(), 0);
    }

    #[test]
    fn test_deduct_clamped_to_release() {
        let store = MemoryStore::new();
        let ledger = SlashingLedger::new();
        let owner = create_test_owner(1);
        ledger.set(&store, &owner, 250).unwrap();

        // Penalty larger than the release consumes it entirely
        assert_eq!(ledger.deduct(&store, &owner, 100).unwrap(), (0, 100));
        assert_eq!(ledger.get(&store, &owner).unwrap(), 150);
    }

    #[test]
    fn test_iterate_skips_cleared() {
        let store = MemoryStore::new();
        let ledger = SlashingLedger::new();
        ledger.add(&store, &create_test_owner(2), 5).unwrap();
        ledger.add(&store, &create_test_owner(1), 7).unwrap();
        ledger.add(&store, &create_test_owner(3), 1).unwrap();
        ledger.deduct(&store, &create_test_owner(3), 10).unwrap();

        let records = ledger.iterate(&store).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].wallet_address, create_test_owner(1));
        assert_eq!(records[0].value, 7);
        assert_eq!(records[1].value, 5);
    }
}
