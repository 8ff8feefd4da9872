//! In-memory storage backend.
//!
//! Keeps every table in RAM behind one lock, so each trait method is atomic
//! with respect to every other. Useful for tests and short-lived indexers
//! that don't need persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stakeindex_core::amount::{Amount, Percentage};
use stakeindex_core::bucket::Bucket;
use stakeindex_core::checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use stakeindex_core::error::IndexerError;
use stakeindex_core::import::BatchSink;
use stakeindex_core::model::{
    Account, Block, ChainStat, FeeTransfer, Job, Reward, RewardSummary, Snarker, Transaction,
    Validator, ValidatorStat,
};
use stakeindex_core::params::RewardsQuery;
use stakeindex_core::store::{
    AccountStore, BlockStore, CanonicalStore, CleanupReport, CleanupStore, RewardStore,
    SnarkerStore, StatsStore, TransactionStore, ValidatorStore,
};
use stakeindex_core::types::{Canonicity, TransactionType};

/// A stored row with its bookkeeping timestamps.
#[derive(Debug, Clone)]
struct Row<T> {
    value: T,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<T> Row<T> {
    fn new(value: T, stamp: DateTime<Utc>) -> Self {
        Self {
            value,
            created_at: stamp,
            updated_at: stamp,
        }
    }
}

type TxKey = (String, String);
type PositionKey = (String, u32);

#[derive(Default)]
struct Tables {
    blocks: HashMap<String, Row<Block>>,
    accounts: HashMap<String, Row<Account>>,
    validators: HashMap<String, Row<Validator>>,
    transactions: HashMap<TxKey, Row<Transaction>>,
    jobs: HashMap<PositionKey, Row<Job>>,
    fee_transfers: HashMap<PositionKey, Row<FeeTransfer>>,
    snarkers: HashMap<String, Row<Snarker>>,
    chain_stats: BTreeMap<(Bucket, DateTime<Utc>), ChainStat>,
    validator_stats: BTreeMap<(String, Bucket, DateTime<Utc>), ValidatorStat>,
    rewards: HashMap<String, Vec<Reward>>,
}

impl Tables {
    fn is_canonical(&self, block_hash: &str) -> bool {
        self.blocks
            .get(block_hash)
            .is_some_and(|b| b.value.canonicity.is_canonical())
    }

    fn canonical_at(&self, height: u64) -> Option<&Block> {
        self.blocks
            .values()
            .map(|r| &r.value)
            .find(|b| b.height == height && b.canonicity.is_canonical())
    }

    fn set_height(&mut self, height: u64, canonicity: Canonicity) -> u64 {
        let mut n = 0;
        for row in self.blocks.values_mut().filter(|r| r.value.height == height) {
            row.value.canonicity = canonicity;
            n += 1;
        }
        for row in self.transactions.values_mut().filter(|r| r.value.height == height) {
            row.value.canonicity = canonicity;
            n += 1;
        }
        n
    }

    fn set_block(&mut self, block_hash: &str, canonicity: Canonicity) -> Result<u64, IndexerError> {
        let block = self.blocks.get_mut(block_hash).ok_or(IndexerError::NotFound)?;
        block.value.canonicity = canonicity;
        let mut n = 1;
        for row in self
            .transactions
            .values_mut()
            .filter(|r| r.value.block_hash == block_hash)
        {
            row.value.canonicity = canonicity;
            n += 1;
        }
        Ok(n)
    }

    fn canonical_blocks_in(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> impl Iterator<Item = &Block> {
        self.blocks
            .values()
            .map(|r| &r.value)
            .filter(move |b| b.canonicity.is_canonical() && b.time >= start && b.time < end)
    }
}

/// In-memory indexer storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
    checkpoints: MemoryCheckpointStore,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, IndexerError> {
        self.tables
            .lock()
            .map_err(|_| IndexerError::Storage("memory store lock poisoned".into()))
    }

    /// Every stored transaction at `height`, across all blocks.
    pub fn transactions_at(&self, height: u64) -> Result<Vec<Transaction>, IndexerError> {
        let tables = self.lock()?;
        let mut txs: Vec<_> = tables
            .transactions
            .values()
            .filter(|r| r.value.height == height)
            .map(|r| r.value.clone())
            .collect();
        txs.sort_by(|a, b| (&a.block_hash, &a.hash).cmp(&(&b.block_hash, &b.hash)));
        Ok(txs)
    }

    pub fn transaction_count(&self) -> Result<usize, IndexerError> {
        Ok(self.lock()?.transactions.len())
    }

    pub fn block_count(&self) -> Result<usize, IndexerError> {
        Ok(self.lock()?.blocks.len())
    }

    /// `(created_at, updated_at)` of a transaction row.
    pub fn transaction_stamps(
        &self,
        hash: &str,
        block_hash: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, IndexerError> {
        Ok(self
            .lock()?
            .transactions
            .get(&(hash.to_string(), block_hash.to_string()))
            .map(|r| (r.created_at, r.updated_at)))
    }

    /// Reward rows stored for one block.
    pub fn rewards_of(&self, block_hash: &str) -> Result<Vec<Reward>, IndexerError> {
        Ok(self.lock()?.rewards.get(block_hash).cloned().unwrap_or_default())
    }
}

// ─── Bulk import ──────────────────────────────────────────────────────────────

fn upsert<K, T>(
    table: &mut HashMap<K, Row<T>>,
    key: K,
    value: T,
    stamp: DateTime<Utc>,
    merge: impl FnOnce(&T, &mut T),
) where
    K: std::hash::Hash + Eq,
{
    match table.get_mut(&key) {
        Some(row) => {
            let mut value = value;
            merge(&row.value, &mut value);
            row.value = value;
            row.updated_at = stamp;
        }
        None => {
            table.insert(key, Row::new(value, stamp));
        }
    }
}

#[async_trait]
impl BatchSink<Block> for InMemoryStorage {
    async fn write_batch(&self, rows: &[Block], stamp: DateTime<Utc>) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        for block in rows {
            upsert(&mut tables.blocks, block.hash.clone(), block.clone(), stamp, |old, new| {
                new.canonicity = old.canonicity;
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink<Account> for InMemoryStorage {
    async fn write_batch(&self, rows: &[Account], stamp: DateTime<Utc>) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        for account in rows {
            upsert(&mut tables.accounts, account.public_key.clone(), account.clone(), stamp, |old, new| {
                new.start_height = old.start_height.min(new.start_height);
                new.start_time = old.start_time.min(new.start_time);
                new.stake_weight = old.stake_weight;
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink<Validator> for InMemoryStorage {
    async fn write_batch(&self, rows: &[Validator], stamp: DateTime<Utc>) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        for validator in rows {
            upsert(&mut tables.validators, validator.public_key.clone(), validator.clone(), stamp, |old, new| {
                new.start_height = old.start_height.min(new.start_height);
                new.start_time = old.start_time.min(new.start_time);
                new.blocks_produced = old.blocks_produced;
                new.stake = old.stake;
                new.delegations_count = old.delegations_count;
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink<Transaction> for InMemoryStorage {
    async fn write_batch(&self, rows: &[Transaction], stamp: DateTime<Utc>) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        for tx in rows {
            let key = (tx.hash.clone(), tx.block_hash.clone());
            upsert(&mut tables.transactions, key, tx.clone(), stamp, |old, new| {
                new.canonicity = old.canonicity;
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink<Job> for InMemoryStorage {
    async fn write_batch(&self, rows: &[Job], stamp: DateTime<Utc>) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        for job in rows {
            let key = (job.block_hash.clone(), job.position);
            upsert(&mut tables.jobs, key, job.clone(), stamp, |_, _| {});
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink<FeeTransfer> for InMemoryStorage {
    async fn write_batch(&self, rows: &[FeeTransfer], stamp: DateTime<Utc>) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        for transfer in rows {
            let key = (transfer.block_hash.clone(), transfer.position);
            upsert(&mut tables.fee_transfers, key, transfer.clone(), stamp, |_, _| {});
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink<Snarker> for InMemoryStorage {
    async fn write_batch(&self, rows: &[Snarker], stamp: DateTime<Utc>) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        for snarker in rows {
            upsert(&mut tables.snarkers, snarker.public_key.clone(), snarker.clone(), stamp, |old, new| {
                new.start_height = old.start_height.min(new.start_height);
                new.start_time = old.start_time.min(new.start_time);
                new.jobs_count = old.jobs_count;
                new.works_count = old.works_count;
                new.fees = old.fees;
            });
        }
        Ok(())
    }
}

// ─── Blocks & canonicity ──────────────────────────────────────────────────────

#[async_trait]
impl BlockStore for InMemoryStorage {
    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, IndexerError> {
        Ok(self.lock()?.blocks.get(hash).map(|r| r.value.clone()))
    }

    async fn canonical_block_at(&self, height: u64) -> Result<Option<Block>, IndexerError> {
        Ok(self.lock()?.canonical_at(height).cloned())
    }

    async fn blocks_at(&self, height: u64) -> Result<Vec<Block>, IndexerError> {
        let tables = self.lock()?;
        let mut blocks: Vec<_> = tables
            .blocks
            .values()
            .filter(|r| r.value.height == height)
            .map(|r| r.value.clone())
            .collect();
        blocks.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(blocks)
    }

    async fn last_canonical_height(&self) -> Result<Option<u64>, IndexerError> {
        Ok(self
            .lock()?
            .blocks
            .values()
            .filter(|r| r.value.canonicity.is_canonical())
            .map(|r| r.value.height)
            .max())
    }
}

#[async_trait]
impl CanonicalStore for InMemoryStorage {
    async fn mark_orphan(&self, height: u64) -> Result<u64, IndexerError> {
        Ok(self.lock()?.set_height(height, Canonicity::Orphan))
    }

    async fn mark_canonical(&self, block_hash: &str) -> Result<u64, IndexerError> {
        self.lock()?.set_block(block_hash, Canonicity::Canonical)
    }

    async fn switch_canonical(&self, height: u64, block_hash: &str) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        if !tables.blocks.contains_key(block_hash) {
            return Err(IndexerError::NotFound);
        }
        tables.set_height(height, Canonicity::Orphan);
        tables.set_block(block_hash, Canonicity::Canonical)?;
        Ok(())
    }
}

// ─── Accounts, validators, transactions ───────────────────────────────────────

#[async_trait]
impl AccountStore for InMemoryStorage {
    async fn account(&self, public_key: &str) -> Result<Option<Account>, IndexerError> {
        Ok(self.lock()?.accounts.get(public_key).map(|r| r.value.clone()))
    }

    async fn delegators_of(&self, validator: &str) -> Result<Vec<Account>, IndexerError> {
        let tables = self.lock()?;
        let mut accounts: Vec<_> = tables
            .accounts
            .values()
            .filter(|r| r.value.delegates_to(validator))
            .map(|r| r.value.clone())
            .collect();
        accounts.sort_by(|a, b| a.public_key.cmp(&b.public_key));
        Ok(accounts)
    }

    async fn update_stake_weights(&self, weights: &[(String, Percentage)]) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        for (key, weight) in weights {
            if let Some(row) = tables.accounts.get_mut(key) {
                row.value.stake_weight = Some(*weight);
                row.updated_at = now;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ValidatorStore for InMemoryStorage {
    async fn validator(&self, public_key: &str) -> Result<Option<Validator>, IndexerError> {
        Ok(self.lock()?.validators.get(public_key).map(|r| r.value.clone()))
    }

    async fn update_validator_staking(
        &self,
        public_key: &str,
        stake: Amount,
        delegations_count: u64,
    ) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        let produced = tables
            .blocks
            .values()
            .filter(|r| r.value.creator == public_key && r.value.canonicity.is_canonical())
            .count() as u64;
        let row = tables
            .validators
            .get_mut(public_key)
            .ok_or(IndexerError::NotFound)?;
        row.value.stake = stake;
        row.value.delegations_count = delegations_count;
        row.value.blocks_produced = produced;
        row.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStorage {
    async fn transactions_by_block(&self, block_hash: &str) -> Result<Vec<Transaction>, IndexerError> {
        let tables = self.lock()?;
        let mut txs: Vec<_> = tables
            .transactions
            .values()
            .filter(|r| r.value.block_hash == block_hash)
            .map(|r| r.value.clone())
            .collect();
        txs.sort_by_key(|t| (t.sequence_number, t.hash.clone()));
        Ok(txs)
    }
}

#[async_trait]
impl SnarkerStore for InMemoryStorage {
    async fn snarker(&self, public_key: &str) -> Result<Option<Snarker>, IndexerError> {
        Ok(self.lock()?.snarkers.get(public_key).map(|r| r.value.clone()))
    }

    async fn refresh_snarkers(&self, block_hash: &str) -> Result<u64, IndexerError> {
        let mut tables = self.lock()?;
        let provers: BTreeSet<String> = tables
            .jobs
            .values()
            .filter(|r| r.value.block_hash == block_hash)
            .map(|r| r.value.prover.clone())
            .collect();

        let now = Utc::now();
        let mut updated = 0;
        for prover in provers {
            let jobs: Vec<&Job> = tables
                .jobs
                .values()
                .map(|r| &r.value)
                .filter(|j| j.prover == prover && tables.is_canonical(&j.block_hash))
                .collect();
            let jobs_count = jobs.len() as u64;
            let works_count = jobs.iter().map(|j| u64::from(j.works_count)).sum::<u64>();
            let fees = Amount::checked_sum(jobs.iter().map(|j| j.fee))?;

            if let Some(row) = tables.snarkers.get_mut(&prover) {
                row.value.jobs_count = jobs_count;
                row.value.works_count = works_count;
                row.value.fees = fees;
                row.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

// ─── Stats ────────────────────────────────────────────────────────────────────

#[async_trait]
impl StatsStore for InMemoryStorage {
    async fn create_chain_stats(&self, bucket: Bucket, time: DateTime<Utc>) -> Result<ChainStat, IndexerError> {
        let mut tables = self.lock()?;
        let (start, end) = bucket.range(time);

        let mut stat = ChainStat {
            bucket,
            time: start,
            blocks_count: 0,
            transactions_count: 0,
            payments_count: 0,
            delegations_count: 0,
            transactions_volume: Amount::ZERO,
            transactions_fees: Amount::ZERO,
            jobs_count: 0,
            jobs_fees: Amount::ZERO,
            validators_count: 0,
        };

        let mut creators = BTreeSet::new();
        for block in tables.canonical_blocks_in(start, end) {
            stat.blocks_count += 1;
            creators.insert(block.creator.as_str());
        }
        stat.validators_count = creators.len() as u64;

        for tx in tables.transactions.values().map(|r| &r.value).filter(|t| {
            t.canonicity.is_canonical() && t.time >= start && t.time < end
        }) {
            stat.transactions_count += 1;
            match tx.tx_type {
                TransactionType::Payment => stat.payments_count += 1,
                TransactionType::Delegation => stat.delegations_count += 1,
            }
            stat.transactions_volume = stat.transactions_volume.checked_add(tx.amount)?;
            stat.transactions_fees = stat.transactions_fees.checked_add(tx.fee)?;
        }

        for job in tables.jobs.values().map(|r| &r.value).filter(|j| {
            j.time >= start && j.time < end && tables.is_canonical(&j.block_hash)
        }) {
            stat.jobs_count += 1;
            stat.jobs_fees = stat.jobs_fees.checked_add(job.fee)?;
        }

        tables.chain_stats.insert((bucket, start), stat.clone());
        Ok(stat)
    }

    async fn create_validator_stats(
        &self,
        public_key: &str,
        bucket: Bucket,
        time: DateTime<Utc>,
    ) -> Result<ValidatorStat, IndexerError> {
        let mut tables = self.lock()?;
        let (start, end) = bucket.range(time);

        let produced = tables
            .canonical_blocks_in(start, end)
            .filter(|b| b.creator == public_key)
            .count() as u64;
        let (delegations_count, delegated_balance) = tables
            .validators
            .get(public_key)
            .map(|r| (r.value.delegations_count, r.value.stake))
            .unwrap_or((0, Amount::ZERO));

        let stat = ValidatorStat {
            bucket,
            time: start,
            public_key: public_key.to_string(),
            blocks_produced_count: produced,
            delegations_count,
            delegated_balance,
        };
        tables
            .validator_stats
            .insert((public_key.to_string(), bucket, start), stat.clone());
        Ok(stat)
    }

    async fn find_validators_for_default_stats(
        &self,
        bucket: Bucket,
        time: DateTime<Utc>,
    ) -> Result<Vec<String>, IndexerError> {
        let tables = self.lock()?;
        let start = bucket.floor(time);

        let with_history: BTreeSet<&str> = tables
            .validator_stats
            .keys()
            .filter(|(_, b, t)| *b == bucket && *t < start)
            .map(|(key, _, _)| key.as_str())
            .collect();
        let keys: Vec<String> = with_history
            .into_iter()
            .filter(|key| {
                !tables
                    .validator_stats
                    .contains_key(&(key.to_string(), bucket, start))
            })
            .map(str::to_string)
            .collect();

        if keys.is_empty() {
            return Err(IndexerError::NotFound);
        }
        Ok(keys)
    }

    async fn chain_stats(
        &self,
        bucket: Bucket,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChainStat>, IndexerError> {
        if from >= to {
            return Ok(Vec::new());
        }
        Ok(self
            .lock()?
            .chain_stats
            .range((bucket, from)..(bucket, to))
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn validator_stats(&self, public_key: &str, bucket: Bucket) -> Result<Vec<ValidatorStat>, IndexerError> {
        Ok(self
            .lock()?
            .validator_stats
            .iter()
            .filter(|((key, b, _), _)| key == public_key && *b == bucket)
            .map(|(_, s)| s.clone())
            .collect())
    }
}

// ─── Rewards ──────────────────────────────────────────────────────────────────

#[async_trait]
impl RewardStore for InMemoryStorage {
    async fn replace_rewards(&self, block_hash: &str, rewards: &[Reward]) -> Result<(), IndexerError> {
        self.lock()?
            .rewards
            .insert(block_hash.to_string(), rewards.to_vec());
        Ok(())
    }

    async fn rewards_summary(&self, query: &RewardsQuery) -> Result<Vec<RewardSummary>, IndexerError> {
        let tables = self.lock()?;
        let mut totals: BTreeMap<DateTime<Utc>, Amount> = BTreeMap::new();

        let rows = tables
            .rewards
            .iter()
            .filter(|(hash, _)| tables.is_canonical(hash))
            .flat_map(|(_, rows)| rows.iter())
            .filter(|r| r.owner_type == query.owner_type && query.contains(r.time))
            .filter(|r| query.account_id.as_deref().map_or(true, |a| r.owner_account == a));

        for reward in rows {
            let slot = totals.entry(query.interval.floor(reward.time)).or_default();
            *slot = slot.checked_add(reward.amount)?;
        }

        Ok(totals
            .into_iter()
            .map(|(interval_start, amount)| RewardSummary {
                interval_start,
                amount,
            })
            .collect())
    }
}

// ─── Cleanup ──────────────────────────────────────────────────────────────────

#[async_trait]
impl CleanupStore for InMemoryStorage {
    async fn cleanup(&self, threshold: u64) -> Result<CleanupReport, IndexerError> {
        let mut report = CleanupReport::default();
        if threshold == 0 {
            return Ok(report);
        }
        let mut tables = self.lock()?;
        let Some(tip) = tables
            .blocks
            .values()
            .filter(|r| r.value.canonicity.is_canonical())
            .map(|r| r.value.height)
            .max()
        else {
            return Ok(report);
        };
        let cutoff = tip.saturating_sub(threshold);
        let cutoff_time = tables.canonical_at(cutoff).map(|b| Bucket::Hour.floor(b.time));

        let stale: BTreeSet<String> = tables
            .blocks
            .values()
            .filter(|r| !r.value.canonicity.is_canonical() && r.value.height < cutoff)
            .map(|r| r.value.hash.clone())
            .collect();

        let before = tables.transactions.len();
        tables
            .transactions
            .retain(|_, r| r.value.canonicity.is_canonical() || r.value.height >= cutoff);
        report.transactions = (before - tables.transactions.len()) as u64;

        let before = tables.jobs.len();
        tables.jobs.retain(|(hash, _), _| !stale.contains(hash));
        report.jobs = (before - tables.jobs.len()) as u64;

        let before = tables.fee_transfers.len();
        tables.fee_transfers.retain(|(hash, _), _| !stale.contains(hash));
        report.fee_transfers = (before - tables.fee_transfers.len()) as u64;

        for hash in &stale {
            if let Some(rows) = tables.rewards.remove(hash) {
                report.rewards += rows.len() as u64;
            }
            tables.blocks.remove(hash);
        }
        report.blocks = stale.len() as u64;

        if let Some(cutoff_time) = cutoff_time {
            let before = tables.chain_stats.len() + tables.validator_stats.len();
            tables
                .chain_stats
                .retain(|(b, t), _| *b != Bucket::Hour || *t >= cutoff_time);
            tables
                .validator_stats
                .retain(|(_, b, t), _| *b != Bucket::Hour || *t >= cutoff_time);
            report.stats = (before - tables.chain_stats.len() - tables.validator_stats.len()) as u64;
        }

        Ok(report)
    }
}

// ─── CheckpointStore impl ─────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load_checkpoint(&self, indexer_id: &str) -> Result<Option<Checkpoint>, IndexerError> {
        self.checkpoints.load_checkpoint(indexer_id).await
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        self.checkpoints.save_checkpoint(checkpoint).await
    }

    async fn delete_checkpoint(&self, indexer_id: &str) -> Result<(), IndexerError> {
        self.checkpoints.delete_checkpoint(indexer_id).await
    }
}
