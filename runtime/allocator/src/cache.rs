//! Recency cache - a bounded list of recently freed blocks
//!
//! Consulted before any chain scan so that memory freed a moment ago is the
//! first memory handed back out, favoring temporal and spatial locality.
//! Entries must always reference currently-free blocks; whoever hands a
//! cached block out (through the cache or around it) removes the entry.

use crate::block::BlockRef;

/// Capacity of the recency cache
pub const RECENT_FREE_SLOTS: usize = 5;

/// Fixed-size FIFO of the most recently freed blocks
#[derive(Default)]
pub struct RecentFreed {
    slots: [Option<BlockRef>; RECENT_FREE_SLOTS],
}

impl RecentFreed {
    /// Record a freshly freed block at the front, evicting the oldest entry
    pub fn push(&mut self, block: BlockRef) {
        for i in (1..RECENT_FREE_SLOTS).rev() {
            self.slots[i] = self.slots[i - 1];
        }
        self.slots[0] = Some(block);
    }

    /// Remove and return the most recent entry able to hold `aligned_size`
    /// data bytes.
    ///
    /// # Safety
    /// Every cached block must still lie within the live heap chain.
    pub unsafe fn take_fit(&mut self, aligned_size: usize) -> Option<BlockRef> {
        for slot in self.slots.iter_mut() {
            if let Some(block) = *slot {
                if block.capacity() >= aligned_size {
                    *slot = None;
                    return Some(block);
                }
            }
        }
        None
    }

    /// Drop the entry for `block` if present.
    ///
    /// Used when a cached block is consumed through the chain scan instead of
    /// through the cache, so no entry outlives the block's free state.
    pub fn forget(&mut self, block: BlockRef) {
        for slot in self.slots.iter_mut() {
            if *slot == Some(block) {
                *slot = None;
            }
        }
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
