//! Periodic drivers for ingestion and retention cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::IndexerError;
use crate::indexer::IndexerState;
use crate::pipeline::{BlockSource, CycleReport, SyncPipeline};
use crate::store::{CleanupReport, CleanupStore, Store};

/// Result of one sync trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(CycleReport),
    /// Another cycle was already in flight; nothing ran.
    Busy,
}

/// Runs the sync pipeline on a fixed interval.
///
/// Cloning yields another handle to the same pipeline; at most one cycle
/// runs at a time across all handles.
pub struct SyncDriver<S, B> {
    pipeline: Arc<Mutex<SyncPipeline<S, B>>>,
    interval: Duration,
}

impl<S, B> Clone for SyncDriver<S, B> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            interval: self.interval,
        }
    }
}

impl<S, B> SyncDriver<S, B>
where
    S: Store + 'static,
    B: BlockSource,
{
    pub fn new(pipeline: SyncPipeline<S, B>, interval: Duration) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            interval,
        }
    }

    /// Pipeline state; waits for an in-flight cycle to finish.
    pub async fn state(&self) -> IndexerState {
        self.pipeline.lock().await.state()
    }

    /// Run one cycle unless one is already running.
    pub async fn trigger(&self, cancel: &CancellationToken) -> Result<SyncOutcome, IndexerError> {
        let Ok(mut pipeline) = self.pipeline.try_lock() else {
            tracing::debug!("sync cycle already in flight");
            return Ok(SyncOutcome::Busy);
        };
        pipeline.run_cycle(cancel).await.map(SyncOutcome::Completed)
    }

    /// Tick until `cancel` fires. Failed cycles are logged and retried on
    /// the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "sync driver started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.trigger(&cancel).await {
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    tracing::warn!(error = %e, "sync cycle failed, retrying next tick");
                }
                Err(e) => {
                    tracing::error!(error = %e, "sync cycle failed");
                }
            }
        }
        self.pipeline.lock().await.set_state(IndexerState::Stopped);
        tracing::info!("sync driver stopped");
    }
}

/// Prunes orphan rows and old hourly stats on a fixed interval.
pub struct CleanupDriver<S: ?Sized> {
    store: Arc<S>,
    interval: Duration,
    threshold: u64,
}

impl<S> CleanupDriver<S>
where
    S: CleanupStore + ?Sized,
{
    pub fn new(store: Arc<S>, interval: Duration, threshold: u64) -> Self {
        Self {
            store,
            interval,
            threshold,
        }
    }

    pub async fn run_once(&self) -> Result<CleanupReport, IndexerError> {
        let report = self.store.cleanup(self.threshold).await?;
        if report.total() > 0 {
            tracing::info!(
                blocks = report.blocks,
                transactions = report.transactions,
                stats = report.stats,
                "cleanup removed rows"
            );
        }
        Ok(report)
    }

    pub async fn run(self, cancel: CancellationToken) {
        if self.threshold == 0 {
            tracing::info!("cleanup disabled");
            return;
        }
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately; skip it so cleanup waits one interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.run_once().await {
                tracing::warn!(error = %e, "cleanup failed");
            }
        }
        tracing::info!("cleanup driver stopped");
    }
}
