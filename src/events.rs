//! Register events and structured audit logging
//!
//! Every state transition visible to callers emits a `RegisterEvent`:
//! - Node creation and description updates
//! - Deposit changes and unbonding start / completion
//! - Registration and kick votes
//! - Effective deposit reports and slashing
//!
//! Events are collected on the block context for the host and logged with
//! structured fields as they are emitted.

use crate::types::{AccountAddress, BondStatus, Coin, NetworkAddress, NodeKind};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Event emitted by the register module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegisterEvent {
    /// A node was registered
    CreateNode {
        /// Node kind
        kind: NodeKind,
        /// Node address
        network_address: NetworkAddress,
        /// Owner wallet
        owner: AccountAddress,
        /// Initial deposit
        initial_deposit: Coin,
        /// Ozone limit granted by the deposit
        ozone_limit_change: i128,
    },

    /// Description or node type changed
    UpdateNode {
        /// Node kind
        kind: NodeKind,
        /// Node address
        network_address: NetworkAddress,
    },

    /// Deposit changed
    UpdateDeposit {
        /// Node kind
        kind: NodeKind,
        /// Node address
        network_address: NetworkAddress,
        /// Signed change requested by the owner
        deposit_delta: i128,
        /// Deposit after the change
        current_deposit: u128,
        /// Available deposit before the change
        available_before: u128,
        /// Available deposit after the change
        available_after: u128,
        /// Ozone limit change
        ozone_limit_change: i128,
        /// Maturity time when the change started an unbonding
        unbonding_mature_time: Option<DateTime<Utc>>,
    },

    /// Unbonding started
    UnbondingNode {
        /// Node kind
        kind: NodeKind,
        /// Node address
        network_address: NetworkAddress,
        /// Amount being unbonded
        deposit_to_remove: Coin,
        /// Ozone limit change
        ozone_limit_change: i128,
        /// When the entry matures
        unbonding_mature_time: DateTime<Utc>,
    },

    /// Unbonding completed and funds were released
    CompleteUnbondingNode {
        /// Node address
        network_address: NetworkAddress,
        /// Released amount before slashing
        amount: Coin,
    },

    /// Registration vote recorded
    RegistrationVote {
        /// Voting meta node
        voter: NetworkAddress,
        /// Candidate meta node
        candidate: NetworkAddress,
        /// Candidate status after the vote
        candidate_status: BondStatus,
    },

    /// Kick vote recorded
    KickVote {
        /// Voting meta node
        voter: NetworkAddress,
        /// Target meta node
        target: NetworkAddress,
        /// Target status after the vote
        target_status: BondStatus,
    },

    /// Registration deposit withdrawal started for an unadmitted meta node
    WithdrawMetaNodeRegistrationDeposit {
        /// Node address
        network_address: NetworkAddress,
        /// When the withdrawal matures
        unbonding_mature_time: DateTime<Utc>,
    },

    /// Effective deposit reported for a resource node
    UpdateEffectiveDeposit {
        /// Node address
        network_address: NetworkAddress,
        /// Effective tokens after the update
        effective_deposit_after: u128,
        /// Whether the update lifted a suspension
        is_unsuspended: bool,
    },

    /// Resource node slashed
    SlashResourceNode {
        /// Node address
        network_address: NetworkAddress,
        /// Penalty added to the owner's outstanding slashing
        penalty: u128,
        /// Whether the node is suspended afterwards
        suspended: bool,
    },
}

impl RegisterEvent {
    /// Event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            RegisterEvent::CreateNode { kind: NodeKind::Resource, .. } => "create_resource_node",
            RegisterEvent::CreateNode { kind: NodeKind::Meta, .. } => "create_meta_node",
            RegisterEvent::UpdateNode { kind: NodeKind::Resource, .. } => "update_resource_node",
            RegisterEvent::UpdateNode { kind: NodeKind::Meta, .. } => "update_meta_node",
            RegisterEvent::UpdateDeposit { kind: NodeKind::Resource, .. } => {
                "update_resource_node_deposit"
            }
            RegisterEvent::UpdateDeposit { kind: NodeKind::Meta, .. } => "update_meta_node_deposit",
            RegisterEvent::UnbondingNode { kind: NodeKind::Resource, .. } => {
                "unbonding_resource_node"
            }
            RegisterEvent::UnbondingNode { kind: NodeKind::Meta, .. } => "unbonding_meta_node",
            RegisterEvent::CompleteUnbondingNode { .. } => "complete_unbonding_node",
            RegisterEvent::RegistrationVote { .. } => "meta_node_reg_vote",
            RegisterEvent::KickVote { .. } => "meta_node_kick_vote",
            RegisterEvent::WithdrawMetaNodeRegistrationDeposit { .. } => {
                "withdraw_meta_node_reg_deposit"
            }
            RegisterEvent::UpdateEffectiveDeposit { .. } => "update_effective_deposit",
            RegisterEvent::SlashResourceNode { .. } => "slash_resource_node",
        }
    }

    /// Network address the event refers to
    pub fn network_address(&self) -> NetworkAddress {
        match self {
            RegisterEvent::CreateNode { network_address, .. }
            | RegisterEvent::UpdateNode { network_address, .. }
            | RegisterEvent::UpdateDeposit { network_address, .. }
            | RegisterEvent::UnbondingNode { network_address, .. }
            | RegisterEvent::CompleteUnbondingNode { network_address, .. }
            | RegisterEvent::WithdrawMetaNodeRegistrationDeposit { network_address, .. }
            | RegisterEvent::UpdateEffectiveDeposit { network_address, .. }
            | RegisterEvent::SlashResourceNode { network_address, .. } => *network_address,
            RegisterEvent::RegistrationVote { candidate, .. } => *candidate,
            RegisterEvent::KickVote { target, .. } => *target,
        }
    }
}

impl fmt::Display for RegisterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} node={}", self.event_type(), self.network_address())
    }
}

/// Collects events emitted during one block
#[derive(Default)]
pub struct EventManager {
    events: Mutex<Vec<RegisterEvent>>,
}

impl EventManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log an event
    pub fn emit(&self, event: RegisterEvent) {
        info!(
            event_type = event.event_type(),
            network_address = %event.network_address(),
            "Register event emitted"
        );
        debug!("Register event detail: {:?}", event);

        self.events.lock().push(event);
    }

    /// Adopt events already emitted on another manager
    pub fn append(&self, events: Vec<RegisterEvent>) {
        self.events.lock().extend(events);
    }

    /// Snapshot of emitted events
    pub fn events(&self) -> Vec<RegisterEvent> {
        self.events.lock().clone()
    }

    /// Remove and return emitted events
    pub fn drain(&self) -> Vec<RegisterEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ADDRESS_LEN;

    #[test]
    fn test_event_manager_collects() {
        let manager = EventManager::new();
        let addr = NetworkAddress::new([5; ADDRESS_LEN]);
        manager.emit(RegisterEvent::CompleteUnbondingNode {
            network_address: addr,
            amount: Coin::new("ustos", 10),
        });
        manager.emit(RegisterEvent::UpdateNode {
            kind: NodeKind::Meta,
            network_address: addr,
        });

        let events = manager.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "complete_unbonding_node");
        assert_eq!(events[1].event_type(), "update_meta_node");

        assert_eq!(manager.drain().len(), 2);
        assert!(manager.events().is_empty());
    }
}
