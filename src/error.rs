//! Error taxonomy for the register module
//!
//! Errors fall into four groups:
//! - Validation errors, raised before any state is touched
//! - Not-found errors for nodes, vote pools and unbonding records
//! - Conflict and policy errors (duplicate votes, expired pools, solvency)
//! - Invariant violations, which callers must treat as fatal

use thiserror::Error;

/// Result type used throughout the register module
pub type Result<T> = std::result::Result<T, RegisterError>;

/// Register module errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// Coin denomination does not match the bond denomination
    #[error("invalid coin denomination: expected {expected}, got {got}")]
    BadDenom {
        /// Configured bond denomination
        expected: String,
        /// Denomination supplied by the caller
        got: String,
    },

    /// Amount is zero or otherwise unusable
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Description moniker is empty
    #[error("moniker must not be empty")]
    EmptyMoniker,

    /// Resource node type outside the computation/database/storage mask
    #[error("invalid node type {0}")]
    InvalidNodeType(u32),

    /// Initial deposit below the configured minimum
    #[error("insufficient deposit: minimum {min}, got {got}")]
    InsufficientDeposit {
        /// Required minimum
        min: u128,
        /// Supplied amount
        got: u128,
    },

    /// Resource node registration is switched off by params
    #[error("resource node registration is disabled")]
    ResourceNodeRegDisabled,

    /// Effective tokens reported for a resource node are out of range
    #[error("invalid effective tokens: {0}")]
    InvalidEffectiveToken(String),

    /// Deposit change direction not allowed for this node kind
    #[error("invalid deposit change: {0}")]
    InvalidDepositChange(String),

    /// Deposit to ozone rate is missing or not positive
    #[error("deposit to ozone rate must be positive")]
    InvalidDepositNozRate,

    /// Parameter validation failure
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Resource node not found
    #[error("resource node {0} not found")]
    NoResourceNodeFound(String),

    /// Meta node not found
    #[error("meta node {0} not found")]
    NoMetaNodeFound(String),

    /// Registration vote pool not found
    #[error("registration vote pool for {0} not found")]
    NoRegistrationVotePoolFound(String),

    /// Unbonding record not found
    #[error("no unbonding record for node {0}")]
    NoUnbondingNode(String),

    /// Node already registered under this network address
    #[error("node {0} already exists")]
    NodeAlreadyExists(String),

    /// Voter already appears in the approve or reject list
    #[error("duplicate vote from {0}")]
    DuplicateVoting(String),

    /// Vote pool expired
    #[error("vote pool for {0} expired")]
    VoteExpired(String),

    /// Deposit changes are not allowed while the node is unbonding
    #[error("node {0} is unbonding")]
    UnbondingNode(String),

    /// Owner wallet or available deposit cannot cover the amount
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Not-bonded pool cannot cover the release
    #[error("insufficient balance in not-bonded pool")]
    InsufficientBalanceOfNotBondedPool,

    /// Releasing the amount would drive the remaining ozone limit negative
    #[error("insufficient remaining ozone limit to unbond {0}")]
    InsufficientOzoneLimit(u128),

    /// Unbonding entry cap reached
    #[error("too many unbonding entries for node {0}")]
    MaxUnbondingNodeEntries(String),

    /// Owner address does not match the node record
    #[error("owner address mismatch for node {0}")]
    InvalidOwnerAddr(String),

    /// Voter is not an active meta node
    #[error("voter {0} is not an active meta node")]
    InvalidVoterStatus(String),

    /// Two addresses that must differ are equal
    #[error("address {0} cannot act on itself")]
    SameAddr(String),

    /// Node status does not allow the requested transition
    #[error("invalid node status: {0}")]
    InvalidNodeStatus(String),

    /// No reporter owns an active meta node
    #[error("no valid reporter in effective deposit update")]
    NoValidReporter,

    /// Ledger transfer failed
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Record encoding or decoding failed
    #[error("codec error: {0}")]
    Codec(String),

    /// An upstream invariant was already broken
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl RegisterError {
    /// Whether the error signals a broken invariant that must abort processing
    pub fn is_fatal(&self) -> bool {
        matches!(self, RegisterError::Invariant(_))
    }
}

impl From<bincode::Error> for RegisterError {
    fn from(err: bincode::Error) -> Self {
        RegisterError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for RegisterError {
    fn from(err: serde_json::Error) -> Self {
        RegisterError::Codec(err.to_string())
    }
}
