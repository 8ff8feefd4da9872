//! Repository traits the pipeline runs against.
//!
//! Every backend (in-memory, PostgreSQL) implements the same typed methods,
//! so the core never builds queries itself. [`Store`] bundles them all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::amount::{Amount, Percentage};
use crate::bucket::Bucket;
use crate::checkpoint::CheckpointStore;
use crate::error::IndexerError;
use crate::import::BatchSink;
use crate::model::{
    Account, Block, ChainStat, FeeTransfer, Job, Reward, RewardSummary, Snarker, Transaction,
    Validator, ValidatorStat,
};
use crate::params::RewardsQuery;

#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, IndexerError>;

    /// The block currently canonical at `height`, if the height is resolved.
    async fn canonical_block_at(&self, height: u64) -> Result<Option<Block>, IndexerError>;

    /// Every stored block at `height`, canonical or not.
    async fn blocks_at(&self, height: u64) -> Result<Vec<Block>, IndexerError>;

    /// Highest height with a canonical block.
    async fn last_canonical_height(&self) -> Result<Option<u64>, IndexerError>;
}

/// Canonicity transitions. Only the resolver calls these.
#[async_trait]
pub trait CanonicalStore: Send + Sync {
    /// Orphan every block and transaction at `height`, in one statement.
    async fn mark_orphan(&self, height: u64) -> Result<u64, IndexerError>;

    /// Mark a block and all of its transactions canonical. Idempotent.
    async fn mark_canonical(&self, block_hash: &str) -> Result<u64, IndexerError>;

    /// `mark_orphan(height)` then `mark_canonical(block_hash)` atomically.
    async fn switch_canonical(&self, height: u64, block_hash: &str) -> Result<(), IndexerError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account(&self, public_key: &str) -> Result<Option<Account>, IndexerError>;

    /// Accounts whose delegate is `validator` (including a self-delegation).
    async fn delegators_of(&self, validator: &str) -> Result<Vec<Account>, IndexerError>;

    /// Write staking snapshot weights for the given accounts.
    async fn update_stake_weights(
        &self,
        weights: &[(String, Percentage)],
    ) -> Result<(), IndexerError>;
}

#[async_trait]
pub trait ValidatorStore: Send + Sync {
    async fn validator(&self, public_key: &str) -> Result<Option<Validator>, IndexerError>;

    /// Store the staking snapshot and recount produced canonical blocks.
    async fn update_validator_staking(
        &self,
        public_key: &str,
        stake: Amount,
        delegations_count: u64,
    ) -> Result<(), IndexerError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn transactions_by_block(&self, block_hash: &str)
        -> Result<Vec<Transaction>, IndexerError>;
}

#[async_trait]
pub trait SnarkerStore: Send + Sync {
    async fn snarker(&self, public_key: &str) -> Result<Option<Snarker>, IndexerError>;

    /// Recount jobs, works and fees over canonical blocks for every prover
    /// with a job in `block_hash`. Returns how many snarkers were updated.
    async fn refresh_snarkers(&self, block_hash: &str) -> Result<u64, IndexerError>;
}

#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Replace the chain-wide row of the `bucket` containing `time`.
    async fn create_chain_stats(
        &self,
        bucket: Bucket,
        time: DateTime<Utc>,
    ) -> Result<ChainStat, IndexerError>;

    /// Replace one validator's row of the `bucket` containing `time`.
    async fn create_validator_stats(
        &self,
        public_key: &str,
        bucket: Bucket,
        time: DateTime<Utc>,
    ) -> Result<ValidatorStat, IndexerError>;

    /// Validators with an earlier row of this bucket kind but none for the
    /// bucket containing `time`. `NotFound` when there are none.
    async fn find_validators_for_default_stats(
        &self,
        bucket: Bucket,
        time: DateTime<Utc>,
    ) -> Result<Vec<String>, IndexerError>;

    async fn chain_stats(
        &self,
        bucket: Bucket,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChainStat>, IndexerError>;

    async fn validator_stats(
        &self,
        public_key: &str,
        bucket: Bucket,
    ) -> Result<Vec<ValidatorStat>, IndexerError>;
}

#[async_trait]
pub trait RewardStore: Send + Sync {
    /// Replace every reward row of `block_hash` with `rewards`.
    async fn replace_rewards(&self, block_hash: &str, rewards: &[Reward])
        -> Result<(), IndexerError>;

    /// Reward totals per interval, over canonical blocks only.
    async fn rewards_summary(&self, query: &RewardsQuery)
        -> Result<Vec<RewardSummary>, IndexerError>;
}

/// Rows removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub blocks: u64,
    pub transactions: u64,
    pub jobs: u64,
    pub fee_transfers: u64,
    pub rewards: u64,
    pub stats: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.blocks + self.transactions + self.jobs + self.fee_transfers + self.rewards + self.stats
    }
}

#[async_trait]
pub trait CleanupStore: Send + Sync {
    /// Delete orphan rows below `tip − threshold` and hour-bucket stats older
    /// than the canonical block at that cutoff. `threshold = 0` is a no-op.
    async fn cleanup(&self, threshold: u64) -> Result<CleanupReport, IndexerError>;
}

/// Everything the pipeline needs from a backend.
pub trait Store:
    BlockStore
    + CanonicalStore
    + AccountStore
    + ValidatorStore
    + TransactionStore
    + SnarkerStore
    + StatsStore
    + RewardStore
    + CleanupStore
    + CheckpointStore
    + BatchSink<Block>
    + BatchSink<Account>
    + BatchSink<Validator>
    + BatchSink<Transaction>
    + BatchSink<Job>
    + BatchSink<FeeTransfer>
    + BatchSink<Snarker>
{
}

impl<T> Store for T where
    T: BlockStore
        + CanonicalStore
        + AccountStore
        + ValidatorStore
        + TransactionStore
        + SnarkerStore
        + StatsStore
        + RewardStore
        + CleanupStore
        + CheckpointStore
        + BatchSink<Block>
        + BatchSink<Account>
        + BatchSink<Validator>
        + BatchSink<Transaction>
        + BatchSink<Job>
        + BatchSink<FeeTransfer>
        + BatchSink<Snarker>
{
}
