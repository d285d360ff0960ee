//! Run-lifetime staging memory
//!
//! Everything the generator writes into is allocated here once, before the
//! first pass, and reused cyclically until the run ends. The staging arrays
//! are shared with the disk queue through `Arc`s, so they stay alive until
//! both the arena and every queued write referencing them are gone.

use super::layout::F1Layout;
use crate::queue::ElementCounts;
use crate::util::buffer::AlignedBuffer;
use std::sync::Arc;

/// One half of the double buffer
pub struct StagingSlot {
    /// Labels, `num_buckets` regions of `slice_capacity` entries
    pub y: Arc<AlignedBuffer>,
    /// Generation indices, same layout as `y`
    pub x: Arc<AlignedBuffer>,
    /// Per-bucket entry counts of the pass occupying this slot
    pub counts: Arc<ElementCounts>,
}

impl StagingSlot {
    fn new(layout: &F1Layout) -> Self {
        let len = layout.slot_capacity as usize;
        Self {
            y: Arc::new(AlignedBuffer::new(len, layout.io_block_size)),
            x: Arc::new(AlignedBuffer::new(len, layout.io_block_size)),
            counts: Arc::new(ElementCounts::new(layout.num_buckets as usize)),
        }
    }
}

/// Caller-owned memory for one generation run
pub struct F1Arena {
    /// Keystream output, one `thread_input_words` chunk per worker
    input: Vec<u32>,
    thread_input_words: usize,
    slots: [StagingSlot; 2],
}

impl F1Arena {
    pub fn new(layout: &F1Layout) -> Self {
        log::debug!(
            "reserving {} bytes of staging memory ({} entries per slot)",
            layout.required_memory(),
            layout.slot_capacity
        );

        Self {
            input: vec![0u32; layout.input_words()],
            thread_input_words: layout.thread_input_words(),
            slots: [StagingSlot::new(layout), StagingSlot::new(layout)],
        }
    }

    pub fn slots(&self) -> &[StagingSlot; 2] {
        &self.slots
    }

    /// Hand out each worker's input chunk together with the shared slots
    pub fn split(&mut self) -> (Vec<&mut [u32]>, &[StagingSlot; 2]) {
        let chunks = self.input.chunks_mut(self.thread_input_words).collect();
        (chunks, &self.slots)
    }
}
