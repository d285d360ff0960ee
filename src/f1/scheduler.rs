//! Double-buffered write scheduling
//!
//! Pass `p` stages its entries in slot `p % 2`. Issuing pass `p` queues the
//! slot's two arrays and then a signal of the write fence to `p + 1`, so the
//! fence value counts fully written passes. Before pass `p >= 2` reuses a
//! slot, its previous occupant (pass `p - 2`) must be on disk, that is the
//! write fence must have reached `p - 1`.
//!
//! Both rendezvous points are lock blocks: every worker enters, one leader
//! does the work, and every worker leaves together.

use super::arena::{F1Arena, StagingSlot};
use crate::engine::FileId;
use crate::queue::{DiskQueue, Fence};
use crate::stats::{GenerationStats, SlotAcquire, TableCounts};
use crate::worker::Job;
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Owns the two staging slots' write cycle for one run
pub struct WriteScheduler<'a> {
    queue: &'a DiskQueue,
    slots: &'a [StagingSlot; 2],
    /// Entries per bucket region
    stride: usize,
    write_fence: Arc<Fence>,
    finish_fence: Arc<Fence>,
    /// Diagnostic limit on a slot-reuse wait
    fence_timeout: Option<Duration>,
    stats: Mutex<GenerationStats>,
}

impl<'a> WriteScheduler<'a> {
    pub fn new(
        queue: &'a DiskQueue,
        slots: &'a [StagingSlot; 2],
        stride: usize,
        fence_timeout: Option<Duration>,
    ) -> Self {
        Self {
            queue,
            slots,
            stride,
            write_fence: Arc::new(Fence::new()),
            finish_fence: Arc::new(Fence::new()),
            fence_timeout,
            stats: Mutex::new(GenerationStats::new()),
        }
    }

    pub fn for_arena(
        queue: &'a DiskQueue,
        arena: &'a F1Arena,
        stride: usize,
        fence_timeout: Option<Duration>,
    ) -> Self {
        Self::new(queue, arena.slots(), stride, fence_timeout)
    }

    /// Slot used by `pass`
    #[inline]
    pub fn slot(&self, pass: u32) -> &StagingSlot {
        &self.slots[pass as usize % 2]
    }

    /// Passes fully written so far
    pub fn completed_passes(&self) -> u64 {
        self.write_fence.value()
    }

    /// Block every worker until `pass` may overwrite its slot
    ///
    /// Passes 0 and 1 use fresh slots and return immediately without a
    /// rendezvous; every worker makes the same decision.
    pub fn acquire_slot(&self, job: &Job<'_>, pass: u32) -> Result<()> {
        if pass < 2 {
            return Ok(());
        }

        job.lock_block(|| {
            let target = pass as u64 - 1;
            let started = Instant::now();
            let fence_before = self.write_fence.value();

            self.write_fence.wait(target, self.fence_timeout)?;

            let acquire = SlotAcquire {
                pass,
                fence_before,
                fence_after: self.write_fence.value(),
            };
            let waited = started.elapsed();
            if fence_before < target {
                log::debug!("pass {} waited {:?} for slot {}", pass, waited, pass % 2);
            }
            self.stats.lock().record_acquire(acquire, waited);
            Ok(())
        })
    }

    /// Hand the finished `pass` to the disk queue
    ///
    /// The leader snapshots `totals` into the slot's counts, queues both
    /// arrays and the fence signal, commits, and adds the totals to
    /// `table_counts`.
    pub fn issue(
        &self,
        job: &Job<'_>,
        pass: u32,
        totals: &[u32],
        table_counts: &TableCounts,
    ) -> Result<()> {
        job.lock_block(|| {
            let started = Instant::now();
            let slot = self.slot(pass);

            slot.counts.store(totals);
            self.queue
                .write_bucket_elements(FileId::Y, &slot.y, &slot.counts, self.stride);
            self.queue
                .write_bucket_elements(FileId::X, &slot.x, &slot.counts, self.stride);
            self.queue.signal_fence(&self.write_fence, pass as u64 + 1);
            self.queue.commit_commands()?;

            table_counts.add(totals);
            self.stats.lock().record_issue(started.elapsed());
            Ok(())
        })
    }

    /// Record the wall time of one pass
    pub fn record_pass(&self, elapsed: Duration) {
        self.stats.lock().record_pass(elapsed);
    }

    /// Wait until everything queued so far has been written
    ///
    /// Called once after the job, on success and on failure alike, so that
    /// no staged buffer is still being read when the run returns.
    pub fn finish(&self) -> Result<()> {
        self.queue.signal_fence(&self.finish_fence, 1);
        self.queue.commit_commands()?;
        self.finish_fence.wait(1, None)?;
        Ok(())
    }

    pub fn into_stats(self) -> GenerationStats {
        self.stats.into_inner()
    }
}
