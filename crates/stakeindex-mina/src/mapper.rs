//! Raw daemon blocks → ingestion bundles.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use stakeindex_core::amount::{Amount, Percentage};
use stakeindex_core::data::Data;
use stakeindex_core::model::{Account, Block, FeeTransfer, Job, Snarker, Transaction, Validator};
use stakeindex_core::types::{Canonicity, TransactionStatus, TransactionType};

use crate::error::ClientError;
use crate::types::{RawAccount, RawBlock, Scalar};

/// Base58check version byte of user command memos.
const MEMO_VERSION: u8 = 0x14;
/// Memo payload tag for UTF-8 bytes.
const MEMO_BYTES_TAG: u8 = 0x01;

fn parse_u64(field: &str, value: &Scalar) -> Result<u64, ClientError> {
    value
        .as_str()
        .parse()
        .map_err(|_| ClientError::Mapping(format!("{field} is not an integer: {:?}", value.as_str())))
}

fn nanos(field: &str, value: &Scalar) -> Result<Amount, ClientError> {
    parse_u64(field, value).map(Amount::from_nanos)
}

fn total_nanos<'a>(
    field: &str,
    values: impl Iterator<Item = &'a Scalar>,
) -> Result<Amount, ClientError> {
    let amounts = values
        .map(|v| nanos(field, v))
        .collect::<Result<Vec<_>, _>>()?;
    Amount::checked_sum(amounts).map_err(|e| ClientError::Mapping(format!("{field}: {e}")))
}

/// Block time from a millisecond timestamp.
fn millis(field: &str, value: &Scalar) -> Result<DateTime<Utc>, ClientError> {
    let ms = parse_u64(field, value)?;
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| ClientError::Mapping(format!("{field} is out of range: {ms}")))
}

/// Decode a base58check memo to its text. Memos that don't decode are kept
/// as received.
pub fn decode_memo(memo: &str) -> String {
    let Ok(bytes) = bs58::decode(memo).with_check(None).into_vec() else {
        return memo.to_string();
    };
    let payload = match bytes.split_first() {
        Some((&MEMO_VERSION, rest)) if rest.len() >= 2 => rest,
        _ => return memo.to_string(),
    };
    if payload[0] != MEMO_BYTES_TAG {
        return memo.to_string();
    }
    let len = usize::from(payload[1]).min(payload.len() - 2);
    String::from_utf8_lossy(&payload[2..2 + len])
        .trim_matches(char::from(0))
        .trim()
        .to_string()
}

/// Converts daemon blocks into [`Data`] bundles.
#[derive(Debug, Clone)]
pub struct BlockMapper {
    /// Fee recorded for producers; the chain does not publish one.
    validator_fee: Percentage,
}

impl BlockMapper {
    pub fn new(validator_fee: Percentage) -> Self {
        Self { validator_fee }
    }

    pub fn height(raw: &RawBlock) -> Result<u64, ClientError> {
        let consensus = &raw.protocol_state.consensus_state;
        let value = consensus
            .block_height
            .as_ref()
            .or(consensus.blockchain_length.as_ref())
            .ok_or_else(|| ClientError::Mapping(format!("block {} has no height", raw.state_hash)))?;
        parse_u64("blockHeight", value)
    }

    pub fn block(&self, raw: &RawBlock) -> Result<Block, ClientError> {
        let state = &raw.protocol_state;
        let consensus = &state.consensus_state;
        let chain = &state.blockchain_state;
        let time = millis("date", chain.utc_date.as_ref().unwrap_or(&chain.date))?;

        let commands = &raw.transactions.user_commands;
        let transactions_fees = total_nanos("fee", commands.iter().map(|c| &c.fee))?;
        let snark_jobs_fees = total_nanos("snarkJobs.fee", raw.snark_jobs.iter().map(|j| &j.fee))?;

        Ok(Block {
            height: Self::height(raw)?,
            hash: raw.state_hash.clone(),
            parent_hash: state.previous_state_hash.clone(),
            time,
            creator: raw.creator.clone(),
            coinbase: nanos("coinbase", &raw.transactions.coinbase)?,
            total_currency: nanos("totalCurrency", &consensus.total_currency)?,
            epoch: parse_u64("epoch", &consensus.epoch)?,
            slot: parse_u64("slot", &consensus.slot)?,
            ledger_hash: consensus
                .staking_epoch_data
                .as_ref()
                .and_then(|e| e.ledger.as_ref())
                .map(|l| l.hash.clone())
                .unwrap_or_default(),
            staged_ledger_hash: chain.staged_ledger_hash.clone(),
            snarked_ledger_hash: chain.snarked_ledger_hash.clone(),
            transactions_count: commands.len() as u32,
            transactions_fees,
            snark_jobs_count: raw.snark_jobs.len() as u32,
            snark_jobs_fees,
            canonicity: Canonicity::Pending,
        })
    }

    fn account(raw: &RawAccount, block: &Block) -> Result<Account, ClientError> {
        Ok(Account {
            public_key: raw.public_key.clone(),
            delegate: raw.delegate.clone().filter(|d| !d.is_empty()),
            balance: nanos("balance.total", &raw.balance.total)?,
            balance_unknown: raw
                .balance
                .unknown
                .as_ref()
                .map(|u| nanos("balance.unknown", u))
                .transpose()?
                .unwrap_or(Amount::ZERO),
            nonce: raw
                .nonce
                .as_ref()
                .map(|n| parse_u64("nonce", n))
                .transpose()?
                .unwrap_or(0),
            stake_weight: None,
            start_height: block.height,
            start_time: block.time,
            last_height: block.height,
            last_time: block.time,
        })
    }

    /// Map one daemon block into an ingestion bundle.
    ///
    /// Every account snapshot the block carries is kept once, keyed by
    /// public key; a later snapshot of the same key wins.
    pub fn map(&self, raw: &RawBlock) -> Result<Data, ClientError> {
        let block = self.block(raw)?;

        let validator = Validator {
            public_key: block.creator.clone(),
            blocks_produced: 0,
            stake: Amount::ZERO,
            delegations_count: 0,
            fee: self.validator_fee,
            start_height: block.height,
            start_time: block.time,
            last_height: block.height,
            last_time: block.time,
        };

        let mut order: Vec<String> = Vec::new();
        let mut accounts: HashMap<String, Account> = HashMap::new();
        let snapshots = raw.creator_account.iter().chain(
            raw.transactions
                .user_commands
                .iter()
                .flat_map(|c| c.from_account.iter().chain(c.to_account.iter())),
        );
        for snapshot in snapshots {
            let account = Self::account(snapshot, &block)?;
            if !accounts.contains_key(&account.public_key) {
                order.push(account.public_key.clone());
            }
            accounts.insert(account.public_key.clone(), account);
        }
        let accounts = order
            .into_iter()
            .filter_map(|key| accounts.remove(&key))
            .collect();

        let transactions = raw
            .transactions
            .user_commands
            .iter()
            .enumerate()
            .map(|(i, c)| -> Result<Transaction, ClientError> {
                Ok(Transaction {
                    tx_type: if c.is_delegation {
                        TransactionType::Delegation
                    } else {
                        TransactionType::Payment
                    },
                    hash: c.id.clone(),
                    block_hash: block.hash.clone(),
                    height: block.height,
                    time: block.time,
                    sender: c.from.clone(),
                    receiver: c.to.clone(),
                    amount: nanos("amount", &c.amount)?,
                    fee: nanos("fee", &c.fee)?,
                    nonce: parse_u64("nonce", &c.nonce)?,
                    memo: decode_memo(&c.memo),
                    status: if c.failure_reason.is_some() {
                        TransactionStatus::Failed
                    } else {
                        TransactionStatus::Applied
                    },
                    canonicity: Canonicity::Pending,
                    failure_reason: c.failure_reason.clone(),
                    sequence_number: Some(i as u32),
                    secondary_sequence_number: None,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fee_transfers = raw
            .transactions
            .fee_transfer
            .iter()
            .enumerate()
            .map(|(i, f)| -> Result<FeeTransfer, ClientError> {
                Ok(FeeTransfer {
                    block_hash: block.hash.clone(),
                    position: i as u32,
                    height: block.height,
                    time: block.time,
                    recipient: f.recipient.clone(),
                    fee: nanos("feeTransfer.fee", &f.fee)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let jobs = raw
            .snark_jobs
            .iter()
            .enumerate()
            .map(|(i, j)| -> Result<Job, ClientError> {
                Ok(Job {
                    block_hash: block.hash.clone(),
                    position: i as u32,
                    height: block.height,
                    time: block.time,
                    prover: j.prover.clone(),
                    fee: nanos("snarkJobs.fee", &j.fee)?,
                    works_count: j.work_ids.len() as u32,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let snarkers =
            Snarker::from_jobs(&jobs).map_err(|e| ClientError::Mapping(format!("snarkJobs: {e}")))?;

        Ok(Data {
            block,
            validator,
            accounts,
            transactions,
            fee_transfers,
            jobs,
            snarkers,
        })
    }
}
