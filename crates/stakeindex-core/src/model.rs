//! Indexed entities.
//!
//! These are plain in-memory records. Table layout lives with each storage
//! backend, so nothing here is tied to a schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Percentage};
use crate::bucket::Bucket;
use crate::error::IndexerError;
use crate::types::{BlockRef, Canonicity, RewardOwnerType, TransactionStatus, TransactionType};

fn require(cond: bool, msg: &str) -> Result<(), IndexerError> {
    if cond {
        Ok(())
    } else {
        Err(IndexerError::Validation(msg.to_string()))
    }
}

fn is_set(time: &DateTime<Utc>) -> bool {
    time.timestamp_millis() > 0
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// One chain height's header and summary counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
    pub time: DateTime<Utc>,
    /// Public key of the block producer.
    pub creator: String,
    pub coinbase: Amount,
    pub total_currency: Amount,
    pub epoch: u64,
    pub slot: u64,
    pub ledger_hash: String,
    pub staged_ledger_hash: String,
    pub snarked_ledger_hash: String,
    pub transactions_count: u32,
    pub transactions_fees: Amount,
    pub snark_jobs_count: u32,
    pub snark_jobs_fees: Amount,
    pub canonicity: Canonicity,
}

impl Block {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            height: self.height,
            hash: self.hash.clone(),
            parent_hash: self.parent_hash.clone(),
        }
    }

    /// `first_height` is the lowest height this indexer ingests.
    pub fn validate(&self, first_height: u64) -> Result<(), IndexerError> {
        require(!self.hash.is_empty(), "block hash is required")?;
        require(self.height > 0, "block height is invalid")?;
        require(self.height >= first_height, "block height is below the first indexed height")?;
        require(is_set(&self.time), "block time is invalid")?;
        require(!self.creator.is_empty(), "block creator is required")
    }
}

// ─── Account ──────────────────────────────────────────────────────────────────

/// A ledger account as last observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub public_key: String,
    /// Public key the account delegates its stake to, if any.
    pub delegate: Option<String>,
    pub balance: Amount,
    pub balance_unknown: Amount,
    pub nonce: u64,
    /// Share of the delegate's stake, refreshed by the staking snapshot.
    pub stake_weight: Option<Percentage>,
    pub start_height: u64,
    pub start_time: DateTime<Utc>,
    pub last_height: u64,
    pub last_time: DateTime<Utc>,
}

impl Account {
    /// Whether this account's stake counts toward `validator`.
    pub fn delegates_to(&self, validator: &str) -> bool {
        self.delegate.as_deref() == Some(validator)
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        require(!self.public_key.is_empty(), "account public key is required")?;
        if let Some(delegate) = &self.delegate {
            require(!delegate.is_empty(), "account delegate is invalid")?;
        }
        Ok(())
    }
}

// ─── Validator ────────────────────────────────────────────────────────────────

/// An account that produces blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub public_key: String,
    pub blocks_produced: u64,
    /// Total balance delegated to this validator (staking snapshot).
    pub stake: Amount,
    pub delegations_count: u64,
    pub fee: Percentage,
    pub start_height: u64,
    pub start_time: DateTime<Utc>,
    pub last_height: u64,
    pub last_time: DateTime<Utc>,
}

impl Validator {
    pub fn validate(&self) -> Result<(), IndexerError> {
        require(!self.public_key.is_empty(), "validator public key is required")?;
        require(self.fee.is_valid_fee(), "validator fee must be within 0..=100")
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A user command included in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_type: TransactionType,
    pub hash: String,
    pub block_hash: String,
    pub height: u64,
    pub time: DateTime<Utc>,
    pub sender: String,
    pub receiver: String,
    pub amount: Amount,
    pub fee: Amount,
    pub nonce: u64,
    pub memo: String,
    pub status: TransactionStatus,
    pub canonicity: Canonicity,
    pub failure_reason: Option<String>,
    pub sequence_number: Option<u32>,
    pub secondary_sequence_number: Option<u32>,
}

impl Transaction {
    pub fn validate(&self) -> Result<(), IndexerError> {
        require(!self.block_hash.is_empty(), "block hash is required")?;
        require(!self.hash.is_empty(), "hash is required")?;
        require(self.height > 0, "height is invalid")?;
        require(is_set(&self.time), "time is invalid")?;
        require(!self.sender.is_empty(), "sender is required")?;
        require(!self.receiver.is_empty(), "receiver is required")
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type={} hash={} height={}", self.tx_type, self.hash, self.height)
    }
}

// ─── Job ──────────────────────────────────────────────────────────────────────

/// A completed snark work bundle included in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub block_hash: String,
    /// Index of the job within its block.
    pub position: u32,
    pub height: u64,
    pub time: DateTime<Utc>,
    pub prover: String,
    pub fee: Amount,
    pub works_count: u32,
}

impl Job {
    pub fn validate(&self) -> Result<(), IndexerError> {
        require(self.height > 0, "job height is invalid")?;
        require(is_set(&self.time), "job time is invalid")?;
        require(!self.prover.is_empty(), "job prover is required")
    }
}

// ─── Snarker ──────────────────────────────────────────────────────────────────

/// A snark worker and its completed work across canonical blocks.
///
/// Bundles carry the counts seen in one block; the store recounts them over
/// canonical blocks during finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snarker {
    pub public_key: String,
    /// Fee of the most recently observed job.
    pub fee: Amount,
    pub jobs_count: u64,
    pub works_count: u64,
    pub fees: Amount,
    pub start_height: u64,
    pub start_time: DateTime<Utc>,
    pub last_height: u64,
    pub last_time: DateTime<Utc>,
}

impl Snarker {
    /// Per-prover rows for one block's jobs, in first-seen order.
    pub fn from_jobs(jobs: &[Job]) -> Result<Vec<Snarker>, IndexerError> {
        let mut snarkers: Vec<Snarker> = Vec::new();
        for job in jobs {
            match snarkers.iter_mut().find(|s| s.public_key == job.prover) {
                Some(s) => {
                    s.fee = job.fee;
                    s.jobs_count += 1;
                    s.works_count += u64::from(job.works_count);
                    s.fees = s.fees.checked_add(job.fee)?;
                }
                None => snarkers.push(Snarker {
                    public_key: job.prover.clone(),
                    fee: job.fee,
                    jobs_count: 1,
                    works_count: u64::from(job.works_count),
                    fees: job.fee,
                    start_height: job.height,
                    start_time: job.time,
                    last_height: job.height,
                    last_time: job.time,
                }),
            }
        }
        Ok(snarkers)
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        require(!self.public_key.is_empty(), "snarker public key is required")?;
        require(self.start_height <= self.last_height, "snarker height range is invalid")
    }
}

// ─── FeeTransfer ──────────────────────────────────────────────────────────────

/// A fee payout bundled in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeTransfer {
    pub block_hash: String,
    pub position: u32,
    pub height: u64,
    pub time: DateTime<Utc>,
    pub recipient: String,
    pub fee: Amount,
}

impl FeeTransfer {
    pub fn validate(&self) -> Result<(), IndexerError> {
        require(!self.recipient.is_empty(), "fee transfer recipient is required")
    }
}

// ─── Derived rows ─────────────────────────────────────────────────────────────

/// Chain-wide aggregate for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStat {
    pub bucket: Bucket,
    pub time: DateTime<Utc>,
    pub blocks_count: u64,
    pub transactions_count: u64,
    pub payments_count: u64,
    pub delegations_count: u64,
    pub transactions_volume: Amount,
    pub transactions_fees: Amount,
    pub jobs_count: u64,
    pub jobs_fees: Amount,
    pub validators_count: u64,
}

/// Per-validator aggregate for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorStat {
    pub bucket: Bucket,
    pub time: DateTime<Utc>,
    pub public_key: String,
    pub blocks_produced_count: u64,
    pub delegations_count: u64,
    pub delegated_balance: Amount,
}

/// A reward earned by one account from one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub block_hash: String,
    pub height: u64,
    pub time: DateTime<Utc>,
    pub owner_account: String,
    pub owner_type: RewardOwnerType,
    /// Validator that produced the block.
    pub validator: String,
    pub amount: Amount,
}

/// Total rewards within one query interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardSummary {
    pub interval_start: DateTime<Utc>,
    pub amount: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tx() -> Transaction {
        Transaction {
            tx_type: TransactionType::Payment,
            hash: "CkpZ1".into(),
            block_hash: "3NKa".into(),
            height: 10,
            time: Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap(),
            sender: "B62qsender".into(),
            receiver: "B62qreceiver".into(),
            amount: Amount::from_units(1),
            fee: Amount::from_nanos(10_000_000),
            nonce: 1,
            memo: String::new(),
            status: TransactionStatus::Applied,
            canonicity: Canonicity::Pending,
            failure_reason: None,
            sequence_number: Some(0),
            secondary_sequence_number: None,
        }
    }

    #[test]
    fn valid_transaction() {
        assert!(tx().validate().is_ok());
    }

    #[test]
    fn transaction_requires_fields() {
        let cases: [(fn(&mut Transaction), &str); 6] = [
            (|t| t.hash.clear(), "hash is required"),
            (|t| t.block_hash.clear(), "block hash is required"),
            (|t| t.height = 0, "height is invalid"),
            (|t| t.time = Utc.timestamp_opt(0, 0).unwrap(), "time is invalid"),
            (|t| t.sender.clear(), "sender is required"),
            (|t| t.receiver.clear(), "receiver is required"),
        ];
        for (mutate, msg) in cases {
            let mut t = tx();
            mutate(&mut t);
            match t.validate() {
                Err(IndexerError::Validation(m)) => assert_eq!(m, msg),
                other => panic!("expected validation error '{msg}', got {other:?}"),
            }
        }
    }

    #[test]
    fn block_below_first_height_is_invalid() {
        let block = Block {
            height: 99,
            hash: "3NK99".into(),
            parent_hash: "3NK98".into(),
            time: Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap(),
            creator: "B62qcreator".into(),
            coinbase: Amount::from_units(720),
            total_currency: Amount::ZERO,
            epoch: 0,
            slot: 99,
            ledger_hash: String::new(),
            staged_ledger_hash: String::new(),
            snarked_ledger_hash: String::new(),
            transactions_count: 0,
            transactions_fees: Amount::ZERO,
            snark_jobs_count: 0,
            snark_jobs_fees: Amount::ZERO,
            canonicity: Canonicity::Pending,
        };
        assert!(block.validate(1).is_ok());
        assert!(block.validate(99).is_ok());
        match block.validate(100) {
            Err(IndexerError::Validation(m)) => assert!(m.contains("first indexed height")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn snarkers_group_jobs_by_prover() {
        let t = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
        let job = |position, prover: &str, fee| Job {
            block_hash: "3NKa".into(),
            position,
            height: 10,
            time: t,
            prover: prover.into(),
            fee: Amount::from_nanos(fee),
            works_count: 2,
        };
        let snarkers = Snarker::from_jobs(&[
            job(0, "B62qprover1", 10),
            job(1, "B62qprover2", 5),
            job(2, "B62qprover1", 30),
        ])
        .unwrap();

        assert_eq!(snarkers.len(), 2);
        assert_eq!(snarkers[0].public_key, "B62qprover1");
        assert_eq!(snarkers[0].jobs_count, 2);
        assert_eq!(snarkers[0].works_count, 4);
        assert_eq!(snarkers[0].fees, Amount::from_nanos(40));
        assert_eq!(snarkers[0].fee, Amount::from_nanos(30));
        assert_eq!(snarkers[1].jobs_count, 1);
        assert!(snarkers.iter().all(|s| s.validate().is_ok()));
    }

    #[test]
    fn validator_fee_bounds() {
        let t = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
        let mut v = Validator {
            public_key: "B62qvalidator".into(),
            blocks_produced: 0,
            stake: Amount::ZERO,
            delegations_count: 0,
            fee: "5".parse().unwrap(),
            start_height: 1,
            start_time: t,
            last_height: 1,
            last_time: t,
        };
        assert!(v.validate().is_ok());
        v.fee = "150".parse().unwrap();
        assert!(v.validate().is_err());
    }
}
