//! Head tracker: a sliding window of the most recent canonical block refs.
//!
//! The resolver consults it before hitting the store. It holds at most one
//! ref per height, ordered by height, oldest first.

use std::collections::VecDeque;

use crate::types::BlockRef;

/// Default number of heights kept in memory.
pub const DEFAULT_WINDOW: usize = 290;

/// Tracks the last N canonical block refs.
pub struct HeadTracker {
    window: VecDeque<BlockRef>,
    window_size: usize,
}

impl HeadTracker {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
        }
    }

    /// Record `block` as canonical at its height.
    ///
    /// A ref above the current head is appended. A ref at or below it
    /// replaces that height and drops every ref above, since those heights
    /// must be resolved again on the new branch.
    pub fn insert(&mut self, block: BlockRef) {
        self.rewind_to(block.height.saturating_sub(1));
        if let Some(head) = self.window.back() {
            if head.height + 1 != block.height {
                // gap: older refs no longer form a contiguous chain
                self.window.clear();
            }
        }
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(block);
    }

    /// The highest tracked ref.
    pub fn head(&self) -> Option<&BlockRef> {
        self.window.back()
    }

    pub fn get(&self, height: u64) -> Option<&BlockRef> {
        let first = self.window.front()?.height;
        let index = usize::try_from(height.checked_sub(first)?).ok()?;
        self.window.get(index)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Discard every ref above `height`.
    pub fn rewind_to(&mut self, height: u64) {
        while let Some(back) = self.window.back() {
            if back.height > height {
                self.window.pop_back();
            } else {
                break;
            }
        }
    }

    /// Number of tracked heights at or above `height` (how many heights a
    /// replacement at `height` invalidates).
    pub fn depth_from(&self, height: u64) -> u64 {
        self.window.iter().filter(|b| b.height >= height).count() as u64
    }
}

impl Default for HeadTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
