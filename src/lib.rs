//! # SDS Register
//!
//! Service node register for a decentralized storage network.
//!
//! This crate implements:
//! - Resource and meta node records with deposits held in module pools
//! - Deposit to ozone limit economics for the capacity market
//! - Peer admission and kick votes among active meta nodes
//! - Time-queued unbonding with delayed release of funds
//! - A dense ordinal index of active meta nodes
//! - A per-owner slashing ledger netted against every release

#![warn(missing_docs, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod context;
pub mod deposit;
pub mod error;
pub mod events;
pub mod genesis;
pub mod index_cache;
pub mod keeper;
pub mod ledger;
pub mod node_store;
pub mod params;
pub mod slashing;
pub mod store;
pub mod types;
pub mod unbonding;
pub mod voting;

pub use context::{BlockHeader, Context};
pub use deposit::{DepositChange, DepositEngine, PoolTotals};
pub use error::{RegisterError, Result};
pub use events::{EventManager, RegisterEvent};
pub use genesis::GenesisState;
pub use index_cache::MetaNodeIndexCache;
pub use keeper::{DepositUpdate, EffectiveDepositUpdate, RegisterKeeper, ValidatorUpdate};
pub use ledger::{Ledger, MemoryLedger};
pub use params::{CacheConfig, RegisterParams};
pub use slashing::{SlashingLedger, SlashingRecord};
pub use store::{KvStore, MemoryStore, StoreTransaction};
pub use types::{
    AccountAddress, BondStatus, Coin, Description, MetaNode, NetworkAddress, NodeKind, NodeType,
    ResourceNode, ServiceNode, VoteOpinion,
};
pub use unbonding::{UnbondOutcome, UnbondingEntry, UnbondingNode, UnbondingScheduler};
pub use voting::{VoteEngine, VoteKind, VotePool};
