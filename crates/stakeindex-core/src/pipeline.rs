//! The sync pipeline. Ingests heights in order and keeps derived state
//! consistent across reorgs.
//!
//! Per height: fetch → sanitize → import → resolve → finalize → checkpoint.
//! A parent mismatch rewinds the cursor to the parent height, which is then
//! re-ingested from upstream and settles the fork before moving forward again.
//!
//! Each cycle starts by reconciling already-synced heights with upstream's
//! best chain, so a fork that is not longer than the synced chain is caught
//! too.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::canonical::{CanonicalResolver, Resolution};
use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::data::Data;
use crate::error::IndexerError;
use crate::finalize::Finalizer;
use crate::import::BulkImporter;
use crate::indexer::{IndexerConfig, IndexerState};
use crate::store::Store;

/// Upstream chain data, one height at a time.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Current best-chain tip height.
    async fn chain_height(&self) -> Result<u64, IndexerError>;

    /// The best-chain bundle at `height`, or `None` if upstream lacks it.
    async fn data_at(&self, height: u64) -> Result<Option<Data>, IndexerError>;

    /// Hash of the best-chain block at `height`.
    async fn block_hash_at(&self, height: u64) -> Result<Option<String>, IndexerError> {
        Ok(self.data_at(height).await?.map(|d| d.block.hash))
    }

    /// Lowest height upstream can serve, when its history is bounded.
    async fn lowest_height(&self) -> Result<Option<u64>, IndexerError> {
        Ok(None)
    }
}

/// Result of ingesting one height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeightOutcome {
    Synced { height: u64, hash: String, resolution: Resolution },
    /// Upstream has nothing at this height yet.
    NotAvailable,
}

/// Summary of one `SyncPipeline::run_cycle` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub synced: u64,
    pub reorgs: u64,
    pub rewinds: u64,
    /// Last height finalized in this cycle.
    pub last_height: Option<u64>,
    pub tip: u64,
}

pub struct SyncPipeline<S, B> {
    store: Arc<S>,
    source: Arc<B>,
    config: IndexerConfig,
    importer: BulkImporter,
    resolver: CanonicalResolver,
    finalizer: Finalizer,
    checkpoint: CheckpointManager,
    next_height: Option<u64>,
    last_synced: Option<(u64, String)>,
    state: IndexerState,
}

impl<S, B> SyncPipeline<S, B>
where
    S: Store + 'static,
    B: BlockSource,
{
    pub fn new(store: Arc<S>, source: Arc<B>, config: IndexerConfig) -> Self {
        let checkpoint_store: Arc<dyn CheckpointStore> = store.clone();
        Self {
            importer: BulkImporter::new(config.batch_size),
            resolver: CanonicalResolver::new(config.first_height, config.tracker_window),
            finalizer: Finalizer::new(config.default_validator_fee),
            checkpoint: CheckpointManager::new(
                checkpoint_store,
                &config.id,
                config.checkpoint_interval,
            ),
            store,
            source,
            config,
            next_height: None,
            last_synced: None,
            state: IndexerState::Idle,
        }
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: IndexerState) {
        self.state = state;
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Next height the pipeline will ingest, resolved from the checkpoint on
    /// first use.
    pub async fn next_height(&mut self) -> Result<u64, IndexerError> {
        if let Some(next) = self.next_height {
            return Ok(next);
        }
        let next = self.checkpoint.resume_height(self.config.first_height).await?;
        if next > self.config.first_height {
            tracing::info!(indexer = %self.config.id, height = next, "Resuming from checkpoint");
        }
        self.next_height = Some(next);
        Ok(next)
    }

    /// Ingest heights up to the tip, at most `max_heights_per_cycle` of them.
    ///
    /// `cancel` is checked between heights only, so a started height always
    /// finishes. On error the cursor stays at the failed height.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<CycleReport, IndexerError> {
        let tip = self.source.chain_height().await?;
        let mut report = CycleReport {
            tip,
            ..Default::default()
        };
        let revisiting = self.reconcile(tip, &mut report).await?;
        let mut height = self.next_height().await?;
        self.state = if revisiting {
            IndexerState::ReorgRecovery
        } else if tip.saturating_sub(height) > self.config.max_heights_per_cycle {
            IndexerState::Backfilling
        } else {
            IndexerState::Live
        };

        let mut steps = 0;
        while height <= tip && steps < self.config.max_heights_per_cycle {
            if cancel.is_cancelled() {
                self.state = IndexerState::Stopping;
                break;
            }
            steps += 1;

            match self.sync_height(height).await {
                Ok(HeightOutcome::Synced { resolution: Resolution::ParentMismatch { height: parent }, .. }) => {
                    self.state = IndexerState::ReorgRecovery;
                    report.rewinds += 1;
                    height = parent.max(self.config.first_height);
                }
                Ok(HeightOutcome::Synced { height: h, resolution, .. }) => {
                    if resolution.is_reorg() {
                        report.reorgs += 1;
                    }
                    report.synced += 1;
                    report.last_height = Some(h);
                    height = h + 1;
                }
                Ok(HeightOutcome::NotAvailable) => {
                    if let Some(lowest) = self.source.lowest_height().await? {
                        if height < lowest {
                            self.next_height = Some(height);
                            self.flush_checkpoint().await?;
                            return Err(IndexerError::Aborted {
                                reason: format!(
                                    "height {height} is older than the upstream window [{lowest}, {tip}]"
                                ),
                            });
                        }
                    }
                    break;
                }
                Err(e) => {
                    self.next_height = Some(height);
                    self.flush_checkpoint().await?;
                    return Err(e);
                }
            }
            self.next_height = Some(height);
        }

        self.flush_checkpoint().await?;
        if self.state == IndexerState::ReorgRecovery {
            self.state = IndexerState::Live;
        }
        tracing::info!(
            synced = report.synced,
            reorgs = report.reorgs,
            rewinds = report.rewinds,
            next = height,
            tip,
            state = %self.state,
            "sync cycle complete"
        );
        Ok(report)
    }

    /// Compare synced heights with upstream's current best chain.
    ///
    /// Canonical blocks above upstream's tip are orphaned. Below it, the walk
    /// goes down from the last synced height until upstream's hash matches
    /// the stored canonical one, at most `tracker_window` heights, and the
    /// cursor moves to the lowest height that differs. Returns whether the
    /// cursor moved back.
    async fn reconcile(&mut self, tip: u64, report: &mut CycleReport) -> Result<bool, IndexerError> {
        let first = self.config.first_height;
        let next = self.next_height().await?;
        if next <= first {
            return Ok(false);
        }
        let last = next - 1;
        let window = (self.config.tracker_window as u64).max(1);
        if tip < first || last.saturating_sub(tip) > window {
            if last > tip {
                tracing::warn!(tip, last, "upstream tip is far behind the synced height");
            }
            return Ok(false);
        }

        let top = last.min(tip);
        let lowest = top.saturating_sub(window - 1).max(first);
        let mut top_hash = None;
        let mut diverged = None;
        let mut height = top;
        loop {
            let Some(upstream) = self.source.block_hash_at(height).await? else {
                break;
            };
            if height == top {
                top_hash = Some(upstream.clone());
            }
            let stored = self.store.canonical_block_at(height).await?;
            if stored.is_some_and(|b| b.hash == upstream) {
                break;
            }
            diverged = Some(height);
            if height == lowest {
                break;
            }
            height -= 1;
        }
        let Some(top_hash) = top_hash else {
            return Ok(false);
        };

        let mut dropped = 0;
        for height in (top + 1..=last).rev() {
            let Some(block) = self.store.canonical_block_at(height).await? else {
                continue;
            };
            self.store.mark_orphan(height).await?;
            self.finalizer.retract(self.store.as_ref(), &block).await?;
            tracing::warn!(height, hash = %block.hash, tip, "upstream dropped canonical block");
            dropped += 1;
        }
        report.reorgs += dropped;

        let resume = match diverged {
            Some(height) => height,
            None if dropped > 0 => {
                self.checkpoint.force_save(top, &top_hash).await?;
                top + 1
            }
            None => return Ok(false),
        };
        tracing::warn!(from = resume, last, tip, "upstream best chain diverged, revisiting heights");
        self.resolver.rewind_to(resume - 1);
        self.next_height = Some(resume);
        report.rewinds += 1;
        Ok(true)
    }

    /// Ingest one height.
    ///
    /// A `ParentMismatch` resolution means the rows were imported but left
    /// pending; the caller should revisit the parent height.
    pub async fn sync_height(&mut self, height: u64) -> Result<HeightOutcome, IndexerError> {
        let Some(mut data) = self.source.data_at(height).await? else {
            tracing::debug!(height, "height not available upstream");
            return Ok(HeightOutcome::NotAvailable);
        };
        if data.height() != height {
            return Err(IndexerError::Rpc(format!(
                "asked for height {height}, upstream returned {}",
                data.height()
            )));
        }

        let rejected = data.sanitize(self.config.first_height)?;
        if rejected.total() > 0 {
            tracing::warn!(height, rejected = rejected.total(), "dropped invalid records");
        }

        self.import(&data).await?;

        let block_ref = data.block.block_ref();
        let resolution = self.resolver.resolve(self.store.as_ref(), &block_ref).await?;

        if let Resolution::ParentMismatch { .. } = resolution {
            return Ok(HeightOutcome::Synced {
                height,
                hash: block_ref.hash,
                resolution,
            });
        }

        let replaced = match &resolution {
            Resolution::Reorganized { replaced, .. } => self.store.block_by_hash(replaced).await?,
            _ => None,
        };
        self.finalizer
            .finalize(self.store.as_ref(), &data.block, replaced.as_ref())
            .await?;

        if resolution.is_reorg() {
            self.checkpoint.force_save(height, &block_ref.hash).await?;
        } else {
            self.checkpoint.maybe_save(height, &block_ref.hash).await?;
        }
        self.last_synced = Some((height, block_ref.hash.clone()));

        tracing::info!(
            height,
            hash = %block_ref.hash,
            transactions = data.transactions.len(),
            resolution = ?resolution,
            "height synced"
        );
        Ok(HeightOutcome::Synced {
            height,
            hash: block_ref.hash,
            resolution,
        })
    }

    async fn import(&self, data: &Data) -> Result<(), IndexerError> {
        let store = self.store.as_ref();
        self.importer
            .import(store, std::slice::from_ref(&data.block))
            .await?;
        self.importer
            .import(store, std::slice::from_ref(&data.validator))
            .await?;
        self.importer.import(store, &data.accounts).await?;
        self.importer.import(store, &data.transactions).await?;
        self.importer.import(store, &data.jobs).await?;
        self.importer.import(store, &data.fee_transfers).await?;
        self.importer.import(store, &data.snarkers).await?;
        Ok(())
    }

    async fn flush_checkpoint(&mut self) -> Result<(), IndexerError> {
        if let Some((height, hash)) = self.last_synced.take() {
            self.checkpoint.force_save(height, &hash).await?;
        }
        Ok(())
    }
}
