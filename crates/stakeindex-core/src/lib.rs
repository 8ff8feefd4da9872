//! stakeindex-core: reorg-consistent indexing pipeline for a proof-of-stake chain.
//!
//! # Architecture
//!
//! ```text
//! SyncDriver → SyncPipeline (per height)
//!                  ├── BlockSource        (upstream Data bundles)
//!                  ├── BulkImporter       (batched upserts)
//!                  ├── CanonicalResolver  (HeadTracker + canonical flags)
//!                  ├── Finalizer          (staking, rewards, bucket stats)
//!                  ├── CheckpointManager  (crash recovery)
//!                  └── Store backend      (memory / Postgres)
//! CleanupDriver → CleanupStore
//! ```

pub mod amount;
pub mod bucket;
pub mod canonical;
pub mod checkpoint;
pub mod data;
pub mod error;
pub mod finalize;
pub mod import;
pub mod indexer;
pub mod model;
pub mod params;
pub mod pipeline;
pub mod reward;
pub mod scheduler;
pub mod store;
pub mod tracker;
pub mod types;

pub use amount::{Amount, Percentage};
pub use bucket::Bucket;
pub use canonical::{CanonicalResolver, Resolution};
pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore, MemoryCheckpointStore};
pub use data::{Data, Rejected};
pub use error::IndexerError;
pub use finalize::{FinalizeReport, Finalizer};
pub use import::{BatchSink, BulkImporter, ImportReport, ImportRow};
pub use indexer::{IndexerConfig, IndexerState};
pub use model::{
    Account, Block, ChainStat, FeeTransfer, Job, Reward, RewardSummary, Snarker, Transaction,
    Validator, ValidatorStat,
};
pub use params::{RewardInterval, RewardsParams, RewardsQuery};
pub use pipeline::{BlockSource, CycleReport, HeightOutcome, SyncPipeline};
pub use reward::{
    calculate_delegator_reward, calculate_validator_reward, calculate_weight, Delegation,
    DelegatorShare, Distribution,
};
pub use scheduler::{CleanupDriver, SyncDriver, SyncOutcome};
pub use store::{
    AccountStore, BlockStore, CanonicalStore, CleanupReport, CleanupStore, RewardStore,
    SnarkerStore, StatsStore, Store, TransactionStore, ValidatorStore,
};
pub use tracker::HeadTracker;
pub use types::{BlockRef, Canonicity, RewardOwnerType, TransactionStatus, TransactionType};
