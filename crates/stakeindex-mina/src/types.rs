//! Raw GraphQL response shapes, as the daemon sends them.
//!
//! Currency and height scalars arrive as decimal strings (sometimes as
//! numbers); they stay raw here and are parsed by the mapper.

use serde::{Deserialize, Deserializer};

/// A scalar the daemon may encode either as a JSON string or a number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scalar(pub String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        Ok(match Raw::deserialize(d)? {
            Raw::Text(s) => Scalar(s),
            Raw::Number(n) => Scalar(n.to_string()),
        })
    }
}

impl Scalar {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ─── Envelope ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

// ─── Daemon status ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatusData {
    pub daemon_status: DaemonStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub sync_status: String,
    pub uptime_secs: Option<Scalar>,
    pub state_hash: Option<String>,
    pub commit_id: Option<String>,
    #[serde(default)]
    pub peers: Vec<serde_json::Value>,
    pub highest_block_length_received: Option<Scalar>,
    pub blockchain_length: Option<Scalar>,
    pub num_accounts: Option<Scalar>,
}

impl DaemonStatus {
    pub fn is_synced(&self) -> bool {
        self.sync_status.eq_ignore_ascii_case("synced")
    }
}

// ─── Blocks ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestChainData {
    #[serde(default)]
    pub best_chain: Vec<RawBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub state_hash: String,
    pub creator: String,
    pub creator_account: Option<RawAccount>,
    pub protocol_state: ProtocolState,
    #[serde(default)]
    pub snark_jobs: Vec<SnarkJob>,
    pub transactions: BlockTransactions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolState {
    pub previous_state_hash: String,
    pub blockchain_state: BlockchainState,
    pub consensus_state: ConsensusState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainState {
    /// Milliseconds since the Unix epoch.
    pub date: Scalar,
    pub utc_date: Option<Scalar>,
    #[serde(default)]
    pub staged_ledger_hash: String,
    #[serde(default)]
    pub snarked_ledger_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusState {
    pub block_height: Option<Scalar>,
    pub blockchain_length: Option<Scalar>,
    pub epoch: Scalar,
    pub slot: Scalar,
    pub total_currency: Scalar,
    pub staking_epoch_data: Option<EpochData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpochData {
    pub ledger: Option<EpochLedger>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpochLedger {
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnarkJob {
    pub fee: Scalar,
    pub prover: String,
    #[serde(default)]
    pub work_ids: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTransactions {
    pub coinbase: Scalar,
    #[serde(default)]
    pub fee_transfer: Vec<RawFeeTransfer>,
    #[serde(default)]
    pub user_commands: Vec<UserCommand>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFeeTransfer {
    pub recipient: String,
    pub fee: Scalar,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCommand {
    pub id: String,
    #[serde(default)]
    pub is_delegation: bool,
    pub from: String,
    pub to: String,
    pub amount: Scalar,
    pub fee: Scalar,
    pub nonce: Scalar,
    #[serde(default)]
    pub memo: String,
    pub failure_reason: Option<String>,
    pub from_account: Option<RawAccount>,
    pub to_account: Option<RawAccount>,
}

// ─── Accounts ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AccountData {
    pub account: Option<RawAccount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    pub public_key: String,
    pub delegate: Option<String>,
    pub nonce: Option<Scalar>,
    pub inferred_nonce: Option<Scalar>,
    pub receipt_chain_hash: Option<String>,
    pub voting_for: Option<String>,
    pub locked: Option<bool>,
    pub balance: Balance,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub block_height: Option<Scalar>,
    pub total: Scalar,
    pub unknown: Option<Scalar>,
}
