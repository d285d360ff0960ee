//! Parallel job substrate
//!
//! A generation run is one long-lived parallel job: `thread_count` scoped
//! workers each execute the same body once and are joined at the end. The
//! workers coordinate through a [`JobGroup`] that provides the three
//! primitives the distribution pipeline needs:
//!
//! - **Barrier** (`sync_threads`): every worker waits for every other worker
//! - **Prefix sum** (`prefix_sum`): merge per-worker bucket counts into
//!   disjoint per-worker write cursors plus per-bucket totals
//! - **Lock block** (`lock_block`): a barrier with a designated leader; the
//!   leader runs a critical section while the others wait, then everyone
//!   leaves together
//!
//! # Failure model
//!
//! A failure inside a lock block, including a panic of the leader, is
//! recorded in the group; every worker then returns [`F1Error::JobAborted`]
//! from the same lock block and [`run_job`] reports the recorded error. A
//! worker whose body fails or panics anywhere else aborts the group's
//! barrier, so workers waiting at it (or arriving later) return
//! `JobAborted` instead of waiting forever.
//!
//! # Example
//!
//! ```
//! use f1plot::worker::run_job;
//!
//! let inputs = vec![vec![0u32, 1, 1], vec![1, 1, 0]];
//! run_job(2, inputs, |job, words| {
//!     let mut counts = [0u32; 2];
//!     for w in &words {
//!         counts[*w as usize] += 1;
//!     }
//!
//!     let mut cursors = [0usize; 2];
//!     let mut totals = [0u32; 2];
//!     job.prefix_sum(&counts, 8, &mut cursors, &mut totals)?;
//!
//!     assert_eq!(totals, [2, 4]);
//!     Ok(())
//! })?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod affinity;
pub mod partition;

use crate::error::F1Error;
use crate::Result;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

/// Reusable barrier that can be broken
///
/// Once aborted, every current and future `wait` fails with `JobAborted`.
#[derive(Debug)]
struct JobBarrier {
    thread_count: usize,
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl JobBarrier {
    fn new(thread_count: usize) -> Self {
        Self {
            thread_count,
            state: Mutex::new(BarrierState::default()),
            cond: Condvar::new(),
        }
    }

    /// Wait for every worker; exactly one caller per round gets `true`
    fn wait(&self) -> std::result::Result<bool, F1Error> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(F1Error::JobAborted);
        }

        state.arrived += 1;
        if state.arrived == self.thread_count {
            state.arrived = 0;
            state.generation += 1;
            self.cond.notify_all();
            return Ok(true);
        }

        let generation = state.generation;
        while state.generation == generation && !state.aborted {
            self.cond.wait(&mut state);
        }

        if state.generation == generation {
            return Err(F1Error::JobAborted);
        }
        Ok(false)
    }

    fn abort(&self) {
        self.state.lock().aborted = true;
        self.cond.notify_all();
    }
}

/// Shared coordination state for one parallel job
pub struct JobGroup {
    thread_count: usize,
    bucket_count: usize,
    barrier: JobBarrier,
    /// Published per-worker counts, `thread_count * bucket_count`, row per worker
    counts: Vec<AtomicU32>,
    /// First failure raised inside a lock block
    failure: Mutex<Option<anyhow::Error>>,
}

impl JobGroup {
    fn new(thread_count: usize, bucket_count: usize) -> Self {
        Self {
            thread_count,
            bucket_count,
            barrier: JobBarrier::new(thread_count),
            counts: (0..thread_count * bucket_count)
                .map(|_| AtomicU32::new(0))
                .collect(),
            failure: Mutex::new(None),
        }
    }

    fn record_failure(&self, err: anyhow::Error) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(err);
        }
    }

    fn has_failed(&self) -> bool {
        self.failure.lock().is_some()
    }

    /// Record `err` and release every worker blocked at the barrier
    fn abort(&self, err: anyhow::Error) {
        self.record_failure(err);
        self.barrier.abort();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One worker's handle on the job
pub struct Job<'g> {
    id: usize,
    group: &'g JobGroup,
}

impl<'g> Job<'g> {
    /// Worker index in `0..thread_count`
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.group.thread_count
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.group.bucket_count
    }

    /// Worker 0
    #[inline]
    pub fn is_control_thread(&self) -> bool {
        self.id == 0
    }

    /// Wait until every worker reaches this point
    pub fn sync_threads(&self) -> Result<()> {
        self.group.barrier.wait()?;
        Ok(())
    }

    /// Merge every worker's bucket counts into write cursors and totals
    ///
    /// Bucket `b` owns the region starting at `b * bucket_stride`; inside a
    /// region, workers are packed in worker order. On return `cursors[b]` is
    /// the *end* of this worker's range in bucket `b` (consume it by
    /// pre-decrementing) and `totals[b]` is the bucket's count across all
    /// workers. The stride is expected to be a multiple of the storage block
    /// size, which keeps every region block-aligned.
    ///
    /// This is a barrier: it returns only after every worker has published
    /// its counts and every worker has read them back.
    pub fn prefix_sum(
        &self,
        counts: &[u32],
        bucket_stride: usize,
        cursors: &mut [usize],
        totals: &mut [u32],
    ) -> Result<()> {
        let buckets = self.group.bucket_count;
        assert_eq!(counts.len(), buckets, "counts length must equal bucket count");
        assert_eq!(cursors.len(), buckets, "cursors length must equal bucket count");
        assert_eq!(totals.len(), buckets, "totals length must equal bucket count");

        let row = &self.group.counts[self.id * buckets..(self.id + 1) * buckets];
        for (slot, &count) in row.iter().zip(counts) {
            slot.store(count, Ordering::Relaxed);
        }

        self.group.barrier.wait()?;

        for bucket in 0..buckets {
            let mut through_self = 0u64;
            let mut total = 0u64;

            for thread in 0..self.group.thread_count {
                let count = self.group.counts[thread * buckets + bucket].load(Ordering::Relaxed) as u64;
                if thread <= self.id {
                    through_self += count;
                }
                total += count;
            }

            cursors[bucket] = bucket * bucket_stride + through_self as usize;
            totals[bucket] = total as u32;
        }

        // Nobody may republish counts until everyone has read this round
        self.group.barrier.wait()?;
        Ok(())
    }

    /// Run `f` on exactly one worker while the others wait
    ///
    /// Every worker must call this at the same point. If `f` fails or
    /// panics, or a previous lock block failed, every worker gets
    /// `JobAborted`.
    pub fn lock_block<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        if self.group.barrier.wait()? {
            let outcome = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
                Err(anyhow::anyhow!(
                    "critical section panicked: {}",
                    panic_message(payload.as_ref())
                ))
            });
            if let Err(err) = outcome {
                log::error!("worker {} failed in critical section: {:#}", self.id, err);
                self.group.record_failure(err);
            }
        }

        self.group.barrier.wait()?;

        if self.group.has_failed() {
            return Err(F1Error::JobAborted.into());
        }

        Ok(())
    }
}

/// Run `body` once on each of `inputs.len()` scoped workers and join them
///
/// Worker `i` receives `inputs[i]` by value, which is how each worker gets
/// exclusive ownership of its own slice of a shared buffer.
pub fn run_job<S, F>(bucket_count: usize, inputs: Vec<S>, body: F) -> Result<()>
where
    S: Send,
    F: Fn(&Job<'_>, S) -> Result<()> + Sync,
{
    let thread_count = inputs.len();
    if thread_count == 0 {
        anyhow::bail!("a job needs at least one worker");
    }

    let group = JobGroup::new(thread_count, bucket_count);

    let results: Vec<Result<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(id, input)| {
                let group = &group;
                let body = &body;
                scope.spawn(move || {
                    let job = Job { id, group };
                    let result = catch_unwind(AssertUnwindSafe(|| body(&job, input)))
                        .unwrap_or_else(|payload| {
                            Err(anyhow::anyhow!(
                                "worker {} panicked: {}",
                                id,
                                panic_message(payload.as_ref())
                            ))
                        });

                    match result {
                        Err(err) if !matches!(err.downcast_ref::<F1Error>(), Some(F1Error::JobAborted)) => {
                            group.abort(err);
                            Err(F1Error::JobAborted.into())
                        }
                        other => other,
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("worker thread panicked")))
            })
            .collect()
    });

    if let Some(err) = group.failure.lock().take() {
        return Err(err);
    }

    for result in results {
        result?;
    }

    Ok(())
}
