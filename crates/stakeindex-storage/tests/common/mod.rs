//! Fixtures shared by the storage integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use stakeindex_core::{
    Account, Amount, Block, BlockSource, Canonicity, Data, IndexerError, Job, Snarker,
    Transaction, TransactionStatus, TransactionType, Validator,
};

pub const CREATOR: &str = "B62qcreator";
pub const ALICE: &str = "B62qalice";
pub const BOB: &str = "B62qbob";
pub const PROVER: &str = "B62qprover";

// ─── Records ──────────────────────────────────────────────────────────────────

/// Three minutes per height from 2021-03-17T00:00Z, so heights 0..=19 share
/// the first hour bucket.
pub fn time(height: u64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 17, 0, 0, 0).unwrap() + Duration::minutes(3 * height as i64)
}

pub fn block(height: u64, hash: &str, parent: &str, creator: &str) -> Block {
    Block {
        height,
        hash: hash.into(),
        parent_hash: parent.into(),
        time: time(height),
        creator: creator.into(),
        coinbase: Amount::from_units(720),
        total_currency: Amount::from_units(805_385_692),
        epoch: 0,
        slot: height,
        ledger_hash: "jx7buQVWFLsXTtzRgSxbYcT8EYLS8KCZbLrfDcJxMtyy4thw2Ee".into(),
        staged_ledger_hash: String::new(),
        snarked_ledger_hash: String::new(),
        transactions_count: 1,
        transactions_fees: Amount::from_nanos(10_000_000),
        snark_jobs_count: 0,
        snark_jobs_fees: Amount::ZERO,
        canonicity: Canonicity::Pending,
    }
}

pub fn transaction(hash: &str, block: &Block) -> Transaction {
    Transaction {
        tx_type: TransactionType::Payment,
        hash: hash.into(),
        block_hash: block.hash.clone(),
        height: block.height,
        time: block.time,
        sender: ALICE.into(),
        receiver: BOB.into(),
        amount: Amount::from_units(5),
        fee: Amount::from_nanos(10_000_000),
        nonce: block.height,
        memo: String::new(),
        status: TransactionStatus::Applied,
        canonicity: Canonicity::Pending,
        failure_reason: None,
        sequence_number: Some(0),
        secondary_sequence_number: None,
    }
}

pub fn job(position: u32, prover: &str, fee: u64, block: &Block) -> Job {
    Job {
        block_hash: block.hash.clone(),
        position,
        height: block.height,
        time: block.time,
        prover: prover.into(),
        fee: Amount::from_nanos(fee),
        works_count: 2,
    }
}

/// `data` plus one snark job by [`PROVER`], with its snarker row.
pub fn data_with_job(height: u64, hash: &str, parent: &str, fee: u64) -> Data {
    let mut d = data(height, hash, parent);
    d.jobs = vec![job(0, PROVER, fee, &d.block)];
    d.snarkers = Snarker::from_jobs(&d.jobs).unwrap();
    d.block.snark_jobs_count = 1;
    d.block.snark_jobs_fees = Amount::from_nanos(fee);
    d
}

/// Producer record with a 5% fee.
pub fn validator(public_key: &str, block: &Block) -> Validator {
    Validator {
        public_key: public_key.into(),
        blocks_produced: 0,
        stake: Amount::ZERO,
        delegations_count: 0,
        fee: "5".parse().unwrap(),
        start_height: block.height,
        start_time: block.time,
        last_height: block.height,
        last_time: block.time,
    }
}

pub fn account(public_key: &str, delegate: &str, balance: u64, block: &Block) -> Account {
    Account {
        public_key: public_key.into(),
        delegate: Some(delegate.into()),
        balance: Amount::from_units(balance),
        balance_unknown: Amount::ZERO,
        nonce: 0,
        stake_weight: None,
        start_height: block.height,
        start_time: block.time,
        last_height: block.height,
        last_time: block.time,
    }
}

/// A bundle produced by [`CREATOR`] with self-stake 300 and delegators
/// alice (500) and bob (200), carrying one payment.
pub fn data(height: u64, hash: &str, parent: &str) -> Data {
    let block = block(height, hash, parent, CREATOR);
    Data {
        validator: validator(CREATOR, &block),
        accounts: vec![
            account(CREATOR, CREATOR, 300, &block),
            account(ALICE, CREATOR, 500, &block),
            account(BOB, CREATOR, 200, &block),
        ],
        transactions: vec![transaction(&format!("Ckp{hash}"), &block)],
        fee_transfers: vec![],
        jobs: vec![],
        snarkers: vec![],
        block,
    }
}

/// Hash of height `h` on branch `branch`.
pub fn hash(branch: &str, height: u64) -> String {
    format!("3NK{branch}{height:04}")
}

/// Heights `from..=to` of `branch`, each linked to the previous height of
/// the same branch except `from`, whose parent is `parent`.
pub fn chain(branch: &str, from: u64, to: u64, parent: &str) -> Vec<Data> {
    (from..=to)
        .map(|h| {
            let parent = if h == from { parent.to_string() } else { hash(branch, h - 1) };
            data(h, &hash(branch, h), &parent)
        })
        .collect()
}

// ─── Upstream ─────────────────────────────────────────────────────────────────

/// Scripted upstream: one best-chain bundle per height, replaceable between
/// cycles to simulate a fork.
#[derive(Default)]
pub struct ScriptedSource {
    heights: Mutex<BTreeMap<u64, Data>>,
}

impl ScriptedSource {
    pub fn new(bundles: Vec<Data>) -> Self {
        let source = Self::default();
        source.publish(bundles);
        source
    }

    pub fn publish(&self, bundles: Vec<Data>) {
        let mut heights = self.heights.lock().unwrap();
        for data in bundles {
            heights.insert(data.height(), data);
        }
    }

    /// Drop every height above `height`, shortening the best chain.
    pub fn truncate(&self, height: u64) {
        self.heights.lock().unwrap().retain(|&h, _| h <= height);
    }
}

#[async_trait]
impl BlockSource for ScriptedSource {
    async fn chain_height(&self) -> Result<u64, IndexerError> {
        Ok(self.heights.lock().unwrap().keys().next_back().copied().unwrap_or(0))
    }

    async fn data_at(&self, height: u64) -> Result<Option<Data>, IndexerError> {
        Ok(self.heights.lock().unwrap().get(&height).cloned())
    }
}
