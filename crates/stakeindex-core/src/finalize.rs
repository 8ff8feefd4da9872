//! Post-import finalization: staking snapshots, rewards and bucket stats.

use chrono::{DateTime, Utc};

use crate::amount::{Amount, Percentage};
use crate::bucket::Bucket;
use crate::error::IndexerError;
use crate::model::{Block, Reward};
use crate::reward::{calculate_weight, Delegation, Distribution};
use crate::store::Store;
use crate::types::RewardOwnerType;

/// Counters from one `Finalizer::finalize` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalizeReport {
    pub delegators: usize,
    pub rewards: usize,
    pub dust: Amount,
    pub chain_stats: usize,
    pub validator_stats: usize,
    pub snarkers: u64,
}

/// Recomputes every derived row a canonical block affects.
///
/// Every step replaces rather than accumulates, so finalizing the same
/// height twice leaves identical rows.
#[derive(Debug, Clone)]
pub struct Finalizer {
    /// Fee used when the producer has no stored validator record.
    default_fee: Percentage,
}

impl Finalizer {
    pub fn new(default_fee: Percentage) -> Self {
        Self { default_fee }
    }

    /// Finalize `block`, which must already be canonical.
    ///
    /// `replaced` is the block it displaced in a reorg; its buckets are
    /// recomputed too since their rows may have counted it.
    pub async fn finalize<S>(
        &self,
        store: &S,
        block: &Block,
        replaced: Option<&Block>,
    ) -> Result<FinalizeReport, IndexerError>
    where
        S: Store + ?Sized,
    {
        let mut report = FinalizeReport::default();

        // staking snapshots first: stats and rewards read them
        let delegations = self.update_staking(store, &block.creator, &mut report).await?;
        self.replace_rewards(store, block, &delegations, &mut report).await?;

        report.snarkers = store.refresh_snarkers(&block.hash).await?;
        if let Some(old) = replaced {
            report.snarkers += store.refresh_snarkers(&old.hash).await?;
        }

        for bucket in Bucket::ALL {
            self.bucket_stats(store, bucket, &block.creator, block.time, &mut report)
                .await?;
            if let Some(old) = replaced {
                if bucket.floor(old.time) != bucket.floor(block.time) || old.creator != block.creator {
                    self.bucket_stats(store, bucket, &old.creator, old.time, &mut report)
                        .await?;
                }
            }
        }

        tracing::debug!(
            height = block.height,
            hash = %block.hash,
            rewards = report.rewards,
            dust = %report.dust,
            validator_stats = report.validator_stats,
            "finalized"
        );
        Ok(report)
    }

    /// Recompute what `block` fed into after it lost canonicity with no
    /// replacement at its height.
    pub async fn retract<S>(&self, store: &S, block: &Block) -> Result<FinalizeReport, IndexerError>
    where
        S: Store + ?Sized,
    {
        let mut report = FinalizeReport::default();
        self.update_staking(store, &block.creator, &mut report).await?;
        report.snarkers = store.refresh_snarkers(&block.hash).await?;
        for bucket in Bucket::ALL {
            self.bucket_stats(store, bucket, &block.creator, block.time, &mut report)
                .await?;
        }
        tracing::debug!(height = block.height, hash = %block.hash, "retracted");
        Ok(report)
    }

    async fn update_staking<S>(
        &self,
        store: &S,
        validator: &str,
        report: &mut FinalizeReport,
    ) -> Result<Vec<Delegation>, IndexerError>
    where
        S: Store + ?Sized,
    {
        let delegators = store.delegators_of(validator).await?;
        let stake = Amount::checked_sum(delegators.iter().map(|a| a.balance))?;
        let delegations_count = delegators
            .iter()
            .filter(|a| a.public_key != validator)
            .count() as u64;

        store
            .update_validator_staking(validator, stake, delegations_count)
            .await?;

        if !stake.is_zero() {
            let weights = delegators
                .iter()
                .map(|a| Ok((a.public_key.clone(), calculate_weight(a.balance, stake)?)))
                .collect::<Result<Vec<_>, IndexerError>>()?;
            store.update_stake_weights(&weights).await?;
        }

        report.delegators = delegators.len();
        Ok(delegators
            .into_iter()
            .filter(|a| !a.balance.is_zero())
            .map(|a| Delegation {
                account: a.public_key,
                balance: a.balance,
            })
            .collect())
    }

    async fn replace_rewards<S>(
        &self,
        store: &S,
        block: &Block,
        delegations: &[Delegation],
        report: &mut FinalizeReport,
    ) -> Result<(), IndexerError>
    where
        S: Store + ?Sized,
    {
        let fee = store
            .validator(&block.creator)
            .await?
            .map(|v| v.fee)
            .unwrap_or(self.default_fee);
        let dist = Distribution::compute(block.coinbase, &block.creator, fee, delegations)?;

        let row = |owner: &str, owner_type, amount| Reward {
            block_hash: block.hash.clone(),
            height: block.height,
            time: block.time,
            owner_account: owner.to_string(),
            owner_type,
            validator: block.creator.clone(),
            amount,
        };
        let mut rewards = Vec::with_capacity(dist.delegators.len() + 1);
        rewards.push(row(&block.creator, RewardOwnerType::Validator, dist.validator));
        rewards.extend(
            dist.delegators
                .iter()
                .filter(|d| !d.amount.is_zero())
                .map(|d| row(&d.account, RewardOwnerType::Delegator, d.amount)),
        );

        store.replace_rewards(&block.hash, &rewards).await?;
        report.rewards = rewards.len();
        report.dust = dist.dust;
        Ok(())
    }

    async fn bucket_stats<S>(
        &self,
        store: &S,
        bucket: Bucket,
        validator: &str,
        time: DateTime<Utc>,
        report: &mut FinalizeReport,
    ) -> Result<(), IndexerError>
    where
        S: Store + ?Sized,
    {
        store.create_chain_stats(bucket, time).await?;
        report.chain_stats += 1;

        store.create_validator_stats(validator, bucket, time).await?;
        report.validator_stats += 1;

        let defaults = match store.find_validators_for_default_stats(bucket, time).await {
            Ok(keys) => keys,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        for key in defaults.iter().filter(|k| k.as_str() != validator) {
            store.create_validator_stats(key, bucket, time).await?;
            report.validator_stats += 1;
        }
        Ok(())
    }
}

impl Default for Finalizer {
    fn default() -> Self {
        Self::new(Percentage::ZERO)
    }
}
