//! The ingestion bundle for one chain height.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::model::{Account, Block, FeeTransfer, Job, Snarker, Transaction, Validator};

/// Everything fetched for one height, ready to be persisted.
///
/// A bundle lives for exactly one ingestion cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub block: Block,
    /// The block producer.
    pub validator: Validator,
    /// Accounts touched by the block (creator, senders, receivers).
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub fee_transfers: Vec<FeeTransfer>,
    pub jobs: Vec<Job>,
    /// One row per prover with jobs in this block.
    #[serde(default)]
    pub snarkers: Vec<Snarker>,
}

/// How many records `Data::sanitize` dropped, per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rejected {
    pub accounts: usize,
    pub transactions: usize,
    pub fee_transfers: usize,
    pub jobs: usize,
    pub snarkers: usize,
}

impl Rejected {
    pub fn total(&self) -> usize {
        self.accounts + self.transactions + self.fee_transfers + self.jobs + self.snarkers
    }
}

impl Data {
    pub fn height(&self) -> u64 {
        self.block.height
    }

    /// Validate the bundle before it reaches storage.
    ///
    /// An invalid block or validator fails the whole bundle, as does a block
    /// below `first_height`. Malformed child records are dropped and counted;
    /// the rest of the bundle stays.
    pub fn sanitize(&mut self, first_height: u64) -> Result<Rejected, IndexerError> {
        self.block.validate(first_height)?;
        self.validator.validate()?;

        let hash = self.block.hash.clone();
        let height = self.block.height;
        let mut rejected = Rejected::default();

        rejected.accounts = retain_valid(&mut self.accounts, "account", |a| a.validate());
        rejected.transactions = retain_valid(&mut self.transactions, "transaction", |t| {
            t.validate()?;
            belongs_to(&t.block_hash, t.height, &hash, height)
        });
        rejected.fee_transfers = retain_valid(&mut self.fee_transfers, "fee transfer", |f| {
            f.validate()?;
            belongs_to(&f.block_hash, f.height, &hash, height)
        });
        rejected.jobs = retain_valid(&mut self.jobs, "job", |j| {
            j.validate()?;
            belongs_to(&j.block_hash, j.height, &hash, height)
        });
        rejected.snarkers = retain_valid(&mut self.snarkers, "snarker", |s| s.validate());

        Ok(rejected)
    }
}

fn belongs_to(
    block_hash: &str,
    height: u64,
    expected_hash: &str,
    expected_height: u64,
) -> Result<(), IndexerError> {
    if block_hash != expected_hash || height != expected_height {
        return Err(IndexerError::Validation(format!(
            "record belongs to block {block_hash} at {height}, bundle is {expected_hash} at {expected_height}"
        )));
    }
    Ok(())
}

fn retain_valid<T>(
    records: &mut Vec<T>,
    kind: &str,
    check: impl Fn(&T) -> Result<(), IndexerError>,
) -> usize {
    let before = records.len();
    records.retain(|r| match check(r) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(kind, error = %e, "dropping invalid record");
            false
        }
    });
    before - records.len()
}
