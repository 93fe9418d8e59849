//! Core data types for service nodes
//!
//! This module defines:
//! - Network and account addresses
//! - Coins and bond status
//! - Resource node types and descriptions
//! - Resource and meta node records
//! - The `ServiceNode` variant shared by the deposit engine and scheduler

use crate::error::{RegisterError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length in bytes of network and account addresses
pub const ADDRESS_LEN: usize = 20;

/// Network address of a service node, derived from its public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkAddress([u8; ADDRESS_LEN]);

impl NetworkAddress {
    /// Create from raw bytes
    pub fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(parse_address_hex(s)?))
    }

    /// Raw address bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sds{}", hex::encode(self.0))
    }
}

/// Wallet address of a node owner or beneficiary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountAddress([u8; ADDRESS_LEN]);

impl AccountAddress {
    /// Create from raw bytes
    pub fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(parse_address_hex(s)?))
    }

    /// Raw address bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl AccountAddress {
    /// Whether every byte is zero
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "st{}", hex::encode(self.0))
    }
}

fn parse_address_hex(s: &str) -> Result<[u8; ADDRESS_LEN]> {
    let trimmed = s
        .strip_prefix("sds")
        .or_else(|| s.strip_prefix("st"))
        .unwrap_or(s);
    let bytes = hex::decode(trimmed)
        .map_err(|e| RegisterError::Codec(format!("invalid address hex {}: {}", s, e)))?;
    <[u8; ADDRESS_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        RegisterError::Codec(format!(
            "address must be {} bytes, got {}",
            ADDRESS_LEN,
            bytes.len()
        ))
    })
}

/// Token amount in a single denomination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Denomination
    pub denom: String,
    /// Amount in base units
    pub amount: u128,
}

impl Coin {
    /// Create a new coin
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    /// Whether the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Bond status of a service node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondStatus {
    /// Registered but not bonded, or fully unbonded
    Unbonded,
    /// Withdrawal in progress
    Unbonding,
    /// Active
    Bonded,
}

impl fmt::Display for BondStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BondStatus::Unbonded => write!(f, "Unbonded"),
            BondStatus::Unbonding => write!(f, "Unbonding"),
            BondStatus::Bonded => write!(f, "Bonded"),
        }
    }
}

/// Kind of service node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Storage, database or computation provider
    Resource,
    /// Indexing and coordination node
    Meta,
}

impl NodeKind {
    /// Whether admission to the bonded set requires a peer vote
    pub fn requires_admission_vote(&self) -> bool {
        matches!(self, NodeKind::Meta)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Resource => write!(f, "resource"),
            NodeKind::Meta => write!(f, "meta"),
        }
    }
}

/// Capability mask of a resource node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeType(u32);

impl NodeType {
    /// Computation capability
    pub const COMPUTATION: u32 = 1;
    /// Database capability
    pub const DATABASE: u32 = 2;
    /// Storage capability
    pub const STORAGE: u32 = 4;

    /// Create a node type, rejecting empty or unknown bits
    pub fn new(mask: u32) -> Result<Self> {
        if mask == 0 || mask > (Self::COMPUTATION | Self::DATABASE | Self::STORAGE) {
            return Err(RegisterError::InvalidNodeType(mask));
        }
        Ok(Self(mask))
    }

    /// Raw mask value
    pub fn mask(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            7 => "storage/database/computation",
            6 => "database/storage",
            5 => "computation/storage",
            4 => "storage",
            3 => "computation/database",
            2 => "database",
            1 => "computation",
            _ => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}

/// Free-form node description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// Display name
    pub moniker: String,
    /// Optional identity signature
    pub identity: String,
    /// Website
    pub website: String,
    /// Security contact
    pub security_contact: String,
    /// Details
    pub details: String,
}

impl Description {
    /// Create a description with only a moniker
    pub fn with_moniker(moniker: impl Into<String>) -> Self {
        Self {
            moniker: moniker.into(),
            ..Default::default()
        }
    }

    /// Reject empty monikers
    pub fn validate(&self) -> Result<()> {
        if self.moniker.trim().is_empty() {
            return Err(RegisterError::EmptyMoniker);
        }
        Ok(())
    }
}

/// Resource node record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Network address
    pub network_address: NetworkAddress,
    /// Public key bytes
    pub pubkey: Vec<u8>,
    /// Owner wallet
    pub owner_address: AccountAddress,
    /// Reward beneficiary wallet
    pub beneficiary_address: AccountAddress,
    /// Deposited tokens
    pub tokens: u128,
    /// Bond status
    pub status: BondStatus,
    /// Suspended from capacity credit
    pub suspended: bool,
    /// Registration time
    pub creation_time: DateTime<Utc>,
    /// Description
    pub description: Description,
    /// Capability mask
    pub node_type: NodeType,
    /// Deposit counted for capacity accounting
    pub effective_tokens: u128,
}

impl ResourceNode {
    /// Create a fresh, unbonded and suspended resource node
    pub fn new(
        network_address: NetworkAddress,
        pubkey: Vec<u8>,
        owner_address: AccountAddress,
        description: Description,
        node_type: NodeType,
        creation_time: DateTime<Utc>,
    ) -> Result<Self> {
        description.validate()?;
        Ok(Self {
            network_address,
            pubkey,
            owner_address,
            beneficiary_address: owner_address,
            tokens: 0,
            status: BondStatus::Unbonded,
            suspended: true,
            creation_time,
            description,
            node_type,
            effective_tokens: 0,
        })
    }
}

/// Meta node record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaNode {
    /// Network address
    pub network_address: NetworkAddress,
    /// Public key bytes
    pub pubkey: Vec<u8>,
    /// Owner wallet
    pub owner_address: AccountAddress,
    /// Reward beneficiary wallet, defaults to the owner
    pub beneficiary_address: AccountAddress,
    /// Deposited tokens
    pub tokens: u128,
    /// Bond status
    pub status: BondStatus,
    /// Suspended from capacity credit
    pub suspended: bool,
    /// Registration time
    pub creation_time: DateTime<Utc>,
    /// Description
    pub description: Description,
}

impl MetaNode {
    /// Create a fresh, unbonded and suspended meta node
    pub fn new(
        network_address: NetworkAddress,
        pubkey: Vec<u8>,
        owner_address: AccountAddress,
        beneficiary_address: Option<AccountAddress>,
        description: Description,
        creation_time: DateTime<Utc>,
    ) -> Result<Self> {
        description.validate()?;
        Ok(Self {
            network_address,
            pubkey,
            owner_address,
            beneficiary_address: beneficiary_address.unwrap_or(owner_address),
            tokens: 0,
            status: BondStatus::Unbonded,
            suspended: true,
            creation_time,
            description,
        })
    }
}

/// Either kind of service node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceNode {
    /// Resource node
    Resource(ResourceNode),
    /// Meta node
    Meta(MetaNode),
}

impl ServiceNode {
    /// Node kind
    pub fn kind(&self) -> NodeKind {
        match self {
            ServiceNode::Resource(_) => NodeKind::Resource,
            ServiceNode::Meta(_) => NodeKind::Meta,
        }
    }

    /// Network address
    pub fn network_address(&self) -> NetworkAddress {
        match self {
            ServiceNode::Resource(n) => n.network_address,
            ServiceNode::Meta(n) => n.network_address,
        }
    }

    /// Owner wallet
    pub fn owner_address(&self) -> AccountAddress {
        match self {
            ServiceNode::Resource(n) => n.owner_address,
            ServiceNode::Meta(n) => n.owner_address,
        }
    }

    /// Deposited tokens
    pub fn tokens(&self) -> u128 {
        match self {
            ServiceNode::Resource(n) => n.tokens,
            ServiceNode::Meta(n) => n.tokens,
        }
    }

    /// Bond status
    pub fn status(&self) -> BondStatus {
        match self {
            ServiceNode::Resource(n) => n.status,
            ServiceNode::Meta(n) => n.status,
        }
    }

    /// Suspension flag
    pub fn suspended(&self) -> bool {
        match self {
            ServiceNode::Resource(n) => n.suspended,
            ServiceNode::Meta(n) => n.suspended,
        }
    }

    /// Registration time
    pub fn creation_time(&self) -> DateTime<Utc> {
        match self {
            ServiceNode::Resource(n) => n.creation_time,
            ServiceNode::Meta(n) => n.creation_time,
        }
    }

    /// Tokens that currently earn capacity credit
    ///
    /// Resource nodes are credited for their effective tokens, meta nodes for
    /// their full deposit.
    pub fn credited_tokens(&self) -> u128 {
        match self {
            ServiceNode::Resource(n) => n.effective_tokens,
            ServiceNode::Meta(n) => n.tokens,
        }
    }

    /// Bonded and not suspended
    pub fn is_active(&self) -> bool {
        self.status() == BondStatus::Bonded && !self.suspended()
    }

    /// Set the bond status
    pub fn set_status(&mut self, status: BondStatus) {
        match self {
            ServiceNode::Resource(n) => n.status = status,
            ServiceNode::Meta(n) => n.status = status,
        }
    }

    /// Set the suspension flag
    pub fn set_suspended(&mut self, suspended: bool) {
        match self {
            ServiceNode::Resource(n) => n.suspended = suspended,
            ServiceNode::Meta(n) => n.suspended = suspended,
        }
    }

    /// Add tokens to the deposit; resource nodes also count them as effective
    pub fn add_tokens(&mut self, amount: u128) -> Result<()> {
        let overflow = || RegisterError::InvalidAmount(format!("deposit overflow adding {}", amount));
        match self {
            ServiceNode::Resource(n) => {
                n.tokens = n.tokens.checked_add(amount).ok_or_else(overflow)?;
                n.effective_tokens = n.effective_tokens.checked_add(amount).ok_or_else(overflow)?;
            }
            ServiceNode::Meta(n) => {
                n.tokens = n.tokens.checked_add(amount).ok_or_else(overflow)?;
            }
        }
        Ok(())
    }

    /// Remove tokens from the deposit
    pub fn sub_tokens(&mut self, amount: u128) -> Result<()> {
        let tokens = self.tokens();
        if tokens < amount {
            return Err(RegisterError::Invariant(format!(
                "node {} holds {} tokens, cannot remove {}",
                self.network_address(),
                tokens,
                amount
            )));
        }
        match self {
            ServiceNode::Resource(n) => {
                n.tokens -= amount;
                n.effective_tokens = n.effective_tokens.min(n.tokens);
            }
            ServiceNode::Meta(n) => n.tokens -= amount,
        }
        Ok(())
    }
}

impl From<ResourceNode> for ServiceNode {
    fn from(node: ResourceNode) -> Self {
        ServiceNode::Resource(node)
    }
}

impl From<MetaNode> for ServiceNode {
    fn from(node: MetaNode) -> Self {
        ServiceNode::Meta(node)
    }
}

/// Opinion carried by a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteOpinion {
    /// In favour
    Approve,
    /// Against
    Reject,
}

impl fmt::Display for VoteOpinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteOpinion::Approve => write!(f, "Approve"),
            VoteOpinion::Reject => write!(f, "Reject"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_names() {
        assert_eq!(NodeType::new(7).unwrap().to_string(), "storage/database/computation");
        assert_eq!(NodeType::new(4).unwrap().to_string(), "storage");

        // Empty and out of range masks are rejected
        assert_eq!(NodeType::new(0), Err(RegisterError::InvalidNodeType(0)));
        assert_eq!(NodeType::new(8), Err(RegisterError::InvalidNodeType(8)));
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = NetworkAddress::new([0xab; ADDRESS_LEN]);
        let parsed = NetworkAddress::from_hex(&addr.to_string()).unwrap();
        assert_eq!(addr, parsed);
        assert!(AccountAddress::from_hex("st00ff").is_err());
    }

    #[test]
    fn test_meta_node_defaults() {
        let owner = AccountAddress::new([1; ADDRESS_LEN]);
        let node = MetaNode::new(
            NetworkAddress::new([2; ADDRESS_LEN]),
            vec![],
            owner,
            None,
            Description::with_moniker("meta"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(node.beneficiary_address, owner);
        assert_eq!(node.status, BondStatus::Unbonded);
        assert!(node.suspended);
        assert_eq!(node.tokens, 0);
    }

    #[test]
    fn test_empty_moniker_rejected() {
        let result = MetaNode::new(
            NetworkAddress::new([2; ADDRESS_LEN]),
            vec![],
            AccountAddress::new([1; ADDRESS_LEN]),
            None,
            Description::with_moniker("  "),
            Utc::now(),
        );
        assert_eq!(result, Err(RegisterError::EmptyMoniker));
    }

    #[test]
    fn test_sub_tokens_clamps_effective() {
        let mut node = ServiceNode::Resource(
            ResourceNode::new(
                NetworkAddress::new([3; ADDRESS_LEN]),
                vec![],
                AccountAddress::new([1; ADDRESS_LEN]),
                Description::with_moniker("res"),
                NodeType::new(4).unwrap(),
                Utc::now(),
            )
            .unwrap(),
        );
        node.add_tokens(100).unwrap();
        node.sub_tokens(60).unwrap();
        assert_eq!(node.tokens(), 40);
        assert_eq!(node.credited_tokens(), 40);

        // Removing more than held is an invariant violation
        let err = node.sub_tokens(41).unwrap_err();
        assert!(err.is_fatal());
    }
}
