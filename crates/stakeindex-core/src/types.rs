//! Shared small types for the indexing pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

// ─── BlockRef ─────────────────────────────────────────────────────────────────

/// The minimal block identity the resolver needs to follow the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block height.
    pub height: u64,
    /// State hash of the block.
    pub hash: String,
    /// State hash of the parent block.
    pub parent_hash: String,
}

impl BlockRef {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &BlockRef) -> bool {
        self.height == parent.height + 1 && self.parent_hash == parent.hash
    }
}

// ─── Canonicity ───────────────────────────────────────────────────────────────

/// Canonical state of a block or transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Canonicity {
    /// Inserted, not yet asserted either way.
    #[default]
    Pending,
    /// On the currently accepted chain.
    Canonical,
    /// Superseded by a reorg.
    Orphan,
}

impl Canonicity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Canonical => "canonical",
            Self::Orphan => "orphan",
        }
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, Self::Canonical)
    }
}

impl fmt::Display for Canonicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Canonicity {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "canonical" => Ok(Self::Canonical),
            "orphan" => Ok(Self::Orphan),
            other => Err(IndexerError::Validation(format!("unknown canonicity: {other}"))),
        }
    }
}

// ─── Transaction enums ────────────────────────────────────────────────────────

/// Kind of user command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Payment,
    Delegation,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Delegation => "delegation",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" => Ok(Self::Payment),
            "delegation" => Ok(Self::Delegation),
            other => Err(IndexerError::Validation(format!("unknown transaction type: {other}"))),
        }
    }
}

/// Whether the command was applied by the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Applied,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applied" => Ok(Self::Applied),
            "failed" => Ok(Self::Failed),
            other => Err(IndexerError::Validation(format!("unknown transaction status: {other}"))),
        }
    }
}

// ─── RewardOwnerType ──────────────────────────────────────────────────────────

/// Who a reward row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardOwnerType {
    Validator,
    Delegator,
}

impl RewardOwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validator => "validator",
            Self::Delegator => "delegator",
        }
    }
}

impl fmt::Display for RewardOwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardOwnerType {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validator" => Ok(Self::Validator),
            "delegator" => Ok(Self::Delegator),
            other => Err(IndexerError::InvalidRequest(format!("owner type is wrong: {other}"))),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
