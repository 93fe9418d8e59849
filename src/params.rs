//! Register module parameters
//!
//! This module provides:
//! - Bond denomination and minimum resource node deposit
//! - Unbonding threshold and completion durations
//! - Unbonding entry cap
//! - Meta node vote validity period
//! - Decode cache sizing

use crate::error::{RegisterError, Result};
use crate::store::{self, keys, KvStore};
use crate::types::Coin;
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default bond denomination
pub const DEFAULT_BOND_DENOM: &str = "ustos";

/// Default unbonding threshold (180 days)
pub const DEFAULT_UNBONDING_THRESHOLD_SECS: i64 = 180 * 24 * 60 * 60;

/// Default unbonding completion time (14 days)
pub const DEFAULT_UNBONDING_COMPLETION_SECS: i64 = 14 * 24 * 60 * 60;

/// Default vote validity period (7 days)
pub const DEFAULT_VOTING_PERIOD_SECS: i64 = 7 * 24 * 60 * 60;

/// Default cap on unbonding entries per node
pub const DEFAULT_MAX_ENTRIES: u32 = 16;

/// Default deposit to ozone conversion rate for a fresh genesis
pub const DEFAULT_DEPOSIT_NOZ_RATE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Register module parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParams {
    /// Denomination accepted for deposits
    pub bond_denom: String,

    /// Seconds after registration during which unbonding waits for the threshold
    pub unbonding_threshold_secs: i64,

    /// Seconds an unbonding entry takes to mature
    pub unbonding_completion_secs: i64,

    /// Maximum unbonding entries per node
    pub max_entries: u32,

    /// Whether resource nodes may register
    pub resource_node_reg_enabled: bool,

    /// Minimum initial deposit for resource nodes
    pub resource_node_min_deposit: Coin,

    /// Seconds a vote pool stays open
    pub voting_period_secs: i64,
}

impl Default for RegisterParams {
    fn default() -> Self {
        Self {
            bond_denom: DEFAULT_BOND_DENOM.to_string(),
            unbonding_threshold_secs: DEFAULT_UNBONDING_THRESHOLD_SECS, // 180 days
            unbonding_completion_secs: DEFAULT_UNBONDING_COMPLETION_SECS, // 14 days
            max_entries: DEFAULT_MAX_ENTRIES,
            resource_node_reg_enabled: true,
            resource_node_min_deposit: Coin::new(DEFAULT_BOND_DENOM, 1),
            voting_period_secs: DEFAULT_VOTING_PERIOD_SECS, // 7 days
        }
    }
}

impl RegisterParams {
    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.bond_denom.trim().is_empty() {
            return Err(RegisterError::InvalidParams(
                "bond denom cannot be blank".to_string(),
            ));
        }
        if self.unbonding_threshold_secs < 0 {
            return Err(RegisterError::InvalidParams(format!(
                "unbonding threshold must not be negative: {}",
                self.unbonding_threshold_secs
            )));
        }
        if self.unbonding_completion_secs <= 0 {
            return Err(RegisterError::InvalidParams(format!(
                "unbonding completion time must be positive: {}",
                self.unbonding_completion_secs
            )));
        }
        if self.max_entries == 0 {
            return Err(RegisterError::InvalidParams(
                "max entries must be positive".to_string(),
            ));
        }
        if self.voting_period_secs <= 0 {
            return Err(RegisterError::InvalidParams(format!(
                "voting period must be positive: {}",
                self.voting_period_secs
            )));
        }
        if self.resource_node_min_deposit.denom != self.bond_denom {
            return Err(RegisterError::InvalidParams(format!(
                "minimum deposit denom {} does not match bond denom {}",
                self.resource_node_min_deposit.denom, self.bond_denom
            )));
        }
        Ok(())
    }

    /// Load persisted params, falling back to defaults before genesis
    pub fn load(store: &dyn KvStore) -> Result<Self> {
        Ok(store::get_record::<Self>(store, keys::PARAMS)?.unwrap_or_default())
    }

    /// Validate and persist params
    pub fn save(&self, store: &dyn KvStore) -> Result<()> {
        self.validate()?;
        debug!("Storing register params: {:?}", self);
        store::set_record(store, keys::PARAMS.to_vec(), self)
    }

    /// Unbonding threshold as a duration
    pub fn unbonding_threshold(&self) -> Duration {
        Duration::seconds(self.unbonding_threshold_secs)
    }

    /// Unbonding completion as a duration
    pub fn unbonding_completion(&self) -> Duration {
        Duration::seconds(self.unbonding_completion_secs)
    }

    /// Vote validity period as a duration
    pub fn voting_period(&self) -> Duration {
        Duration::seconds(self.voting_period_secs)
    }
}

/// Decode cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum decoded records kept per node kind
    pub node_cache_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            node_cache_size: 500,
        }
    }
}
