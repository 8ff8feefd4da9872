//! Canonical/reorg resolution.
//!
//! After a height's rows are imported, the resolver decides whether the new
//! block extends the canonical chain, repeats it, or replaces a competing
//! block at the same height. All flag flips go through [`CanonicalStore`].

use crate::error::IndexerError;
use crate::store::{BlockStore, CanonicalStore};
use crate::tracker::HeadTracker;
use crate::types::BlockRef;

/// What `CanonicalResolver::resolve` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// First canonical block at this height.
    Extended,
    /// The block was already canonical; flags re-asserted.
    Unchanged,
    /// A competing block was canonical and is now orphan.
    Reorganized {
        /// Hash of the block that lost.
        replaced: String,
        /// Tracked heights at or above the replaced one.
        depth: u64,
    },
    /// The block's parent is not canonical at `height`; nothing was written.
    ParentMismatch { height: u64 },
}

impl Resolution {
    pub fn is_reorg(&self) -> bool {
        matches!(self, Self::Reorganized { .. })
    }
}

pub struct CanonicalResolver {
    tracker: HeadTracker,
    /// Lowest indexed height; its parent is never checked.
    first_height: u64,
}

impl CanonicalResolver {
    pub fn new(first_height: u64, window: usize) -> Self {
        Self {
            tracker: HeadTracker::new(window),
            first_height,
        }
    }

    pub fn tracker(&self) -> &HeadTracker {
        &self.tracker
    }

    /// Forget tracked refs above `height`.
    pub fn rewind_to(&mut self, height: u64) {
        self.tracker.rewind_to(height);
    }

    /// Make `block` canonical at its height if its parent allows it.
    pub async fn resolve<S>(&mut self, store: &S, block: &BlockRef) -> Result<Resolution, IndexerError>
    where
        S: BlockStore + CanonicalStore + ?Sized,
    {
        if block.height > self.first_height {
            let parent_height = block.height - 1;
            match self.canonical_at(store, parent_height).await? {
                Some(parent) if block.extends(&parent) => {}
                parent => {
                    tracing::warn!(
                        height = block.height,
                        hash = %block.hash,
                        expected_parent = %block.parent_hash,
                        canonical_parent = parent.as_ref().map(|p| p.hash.as_str()).unwrap_or("<none>"),
                        "parent mismatch, revisiting parent height"
                    );
                    self.tracker.rewind_to(parent_height.saturating_sub(1));
                    return Ok(Resolution::ParentMismatch {
                        height: parent_height,
                    });
                }
            }
        }

        let resolution = match self.canonical_at(store, block.height).await? {
            None => {
                store.mark_canonical(&block.hash).await?;
                Resolution::Extended
            }
            Some(current) if current.hash == block.hash => {
                store.mark_canonical(&block.hash).await?;
                Resolution::Unchanged
            }
            Some(current) => {
                let depth = self.tracker.depth_from(block.height).max(1);
                store.switch_canonical(block.height, &block.hash).await?;
                tracing::warn!(
                    depth,
                    height = block.height,
                    replaced = %current.hash,
                    canonical = %block.hash,
                    "Reorg detected"
                );
                Resolution::Reorganized {
                    replaced: current.hash,
                    depth,
                }
            }
        };

        self.tracker.insert(block.clone());
        Ok(resolution)
    }

    /// Canonical ref at `height`, from the window or else the store.
    async fn canonical_at<S>(&self, store: &S, height: u64) -> Result<Option<BlockRef>, IndexerError>
    where
        S: BlockStore + ?Sized,
    {
        if let Some(tracked) = self.tracker.get(height) {
            return Ok(Some(tracked.clone()));
        }
        Ok(store
            .canonical_block_at(height)
            .await?
            .map(|b| b.block_ref()))
    }
}
