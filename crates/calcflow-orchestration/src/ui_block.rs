//! Reference-counted UI block.

use std::sync::atomic::{AtomicUsize, Ordering};

/// UI is blocked while any guard is alive; nested blocks compose.
#[derive(Debug, Default)]
pub struct UiBlock {
    depth: AtomicUsize,
}

impl UiBlock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the returned guard drops.
    #[must_use = "the block is released when the guard drops"]
    pub fn block(&self) -> UiBlockGuard<'_> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        UiBlockGuard { block: self }
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.depth() > 0
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Releases one level of [`UiBlock`] on drop.
#[derive(Debug)]
pub struct UiBlockGuard<'a> {
    block: &'a UiBlock,
}

impl Drop for UiBlockGuard<'_> {
    fn drop(&mut self) {
        self.block.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
