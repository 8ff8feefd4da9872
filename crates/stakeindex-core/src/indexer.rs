//! Indexer configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::amount::Percentage;
use crate::import::DEFAULT_BATCH_SIZE;
use crate::tracker::DEFAULT_WINDOW;

/// Configuration for an indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used for checkpoint keys).
    pub id: String,
    /// First height to index.
    pub first_height: u64,
    /// Rows per bulk upsert statement.
    pub batch_size: usize,
    /// Upper bound of heights ingested per sync tick.
    pub max_heights_per_cycle: u64,
    /// How often to save a checkpoint (every N heights).
    pub checkpoint_interval: u64,
    /// Canonical refs kept in memory by the resolver.
    pub tracker_window: usize,
    /// Fee applied to producers without a stored validator fee.
    pub default_validator_fee: Percentage,
    /// Interval between sync ticks.
    #[serde(with = "millis")]
    pub sync_interval: Duration,
    /// Interval between cleanup passes.
    #[serde(with = "millis")]
    pub cleanup_interval: Duration,
    /// Heights below the tip whose orphan rows are kept. `0` disables cleanup.
    pub cleanup_threshold: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "mina".into(),
            first_height: 1,
            batch_size: DEFAULT_BATCH_SIZE,
            max_heights_per_cycle: 100,
            checkpoint_interval: 1,
            tracker_window: DEFAULT_WINDOW,
            default_validator_fee: Percentage::ZERO,
            sync_interval: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(600),
            cleanup_threshold: 0,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Runtime state of the sync pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// More than one cycle behind the chain tip.
    Backfilling,
    /// Following the chain tip.
    Live,
    /// Revisiting heights after a parent mismatch.
    ReorgRecovery,
    /// Shutting down gracefully.
    Stopping,
    /// Terminated.
    Stopped,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Backfilling => write!(f, "backfilling"),
            Self::Live => write!(f, "live"),
            Self::ReorgRecovery => write!(f, "reorg-recovery"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
