//! [`BlockSource`] over a Mina daemon.
//!
//! The daemon has no block-by-height query. Heights are served from a
//! snapshot of the node's best chain (the last `window` blocks), taken
//! lazily after each tip poll. Heights older than the window are reported
//! as missing, and [`BlockSource::lowest_height`] names the window's floor
//! so the pipeline can tell a gap from a height it will never get.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use stakeindex_core::amount::Percentage;
use stakeindex_core::data::Data;
use stakeindex_core::error::IndexerError;
use stakeindex_core::pipeline::BlockSource;

use crate::client::MinaClient;
use crate::error::ClientError;
use crate::mapper::BlockMapper;
use crate::types::RawBlock;

/// Best-chain blocks a stock daemon keeps (k).
pub const DEFAULT_WINDOW: u32 = 290;

#[derive(Default)]
struct Snapshot {
    loaded: bool,
    blocks: BTreeMap<u64, RawBlock>,
}

pub struct MinaSource<C> {
    client: C,
    mapper: BlockMapper,
    window: u32,
    snapshot: Mutex<Snapshot>,
}

impl<C: MinaClient> MinaSource<C> {
    pub fn new(client: C, default_validator_fee: Percentage) -> Self {
        Self::with_window(client, default_validator_fee, DEFAULT_WINDOW)
    }

    pub fn with_window(client: C, default_validator_fee: Percentage, window: u32) -> Self {
        Self {
            client,
            mapper: BlockMapper::new(default_validator_fee),
            window: window.max(1),
            snapshot: Mutex::new(Snapshot::default()),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    async fn refresh(&self, snapshot: &mut Snapshot) -> Result<(), ClientError> {
        let chain = self.client.best_chain(self.window).await?;
        let mut blocks = BTreeMap::new();
        for raw in chain {
            blocks.insert(BlockMapper::height(&raw)?, raw);
        }
        tracing::debug!(
            blocks = blocks.len(),
            lowest = blocks.keys().next().copied(),
            highest = blocks.keys().next_back().copied(),
            "best chain snapshot"
        );
        snapshot.blocks = blocks;
        snapshot.loaded = true;
        Ok(())
    }
}

#[async_trait]
impl<C: MinaClient> BlockSource for MinaSource<C> {
    async fn chain_height(&self) -> Result<u64, IndexerError> {
        let status = self.client.daemon_status().await?;
        if !status.is_synced() {
            tracing::warn!(sync_status = %status.sync_status, "daemon is not synced");
        }
        let length = status
            .blockchain_length
            .ok_or_else(|| IndexerError::Rpc("daemon did not report a blockchain length".into()))?;
        let height = length
            .as_str()
            .parse()
            .map_err(|_| IndexerError::Rpc(format!("invalid blockchain length: {}", length.as_str())))?;

        // the tip moved on; the next lookup takes a fresh snapshot
        *self.snapshot.lock().await = Snapshot::default();
        Ok(height)
    }

    async fn data_at(&self, height: u64) -> Result<Option<Data>, IndexerError> {
        let mut snapshot = self.snapshot.lock().await;
        if !snapshot.loaded {
            self.refresh(&mut snapshot).await?;
        }
        let Some(raw) = snapshot.blocks.get(&height) else {
            if snapshot.blocks.keys().next().is_some_and(|&lowest| height < lowest) {
                tracing::warn!(height, "height is older than the daemon's best chain window");
            }
            return Ok(None);
        };
        Ok(Some(self.mapper.map(raw)?))
    }

    async fn block_hash_at(&self, height: u64) -> Result<Option<String>, IndexerError> {
        let mut snapshot = self.snapshot.lock().await;
        if !snapshot.loaded {
            self.refresh(&mut snapshot).await?;
        }
        Ok(snapshot.blocks.get(&height).map(|raw| raw.state_hash.clone()))
    }

    async fn lowest_height(&self) -> Result<Option<u64>, IndexerError> {
        let mut snapshot = self.snapshot.lock().await;
        if !snapshot.loaded {
            self.refresh(&mut snapshot).await?;
        }
        Ok(snapshot.blocks.keys().next().copied())
    }
}
