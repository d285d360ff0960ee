//! First-table generation
//!
//! The generator derives one entry `(y, x)` for every index `x < 2^k` from the
//! ChaCha8 keystream and routes it to one of `num_buckets` destination
//! buckets by the top bits of its raw keystream word. The index space is
//! processed in `num_buckets` passes; each pass covers one contiguous keystream
//! segment, split between the workers.
//!
//! # Pass pipeline
//!
//! ```text
//! every worker                       leader only
//! ───────────────────────────────    ─────────────────────────────
//! generate keystream segment
//! count entries per bucket
//! prefix sum (barrier)
//! check region capacity
//! acquire slot p % 2          ─────▶ wait write fence >= p - 1
//! scatter into slot
//! issue                       ─────▶ queue y/x writes, signal p + 1
//! ```
//!
//! At most two passes are in flight: one being written by the disk queue and
//! one being computed.
//!
//! # Example
//!
//! ```no_run
//! use f1plot::engine::file::FileEngine;
//! use f1plot::engine::FileId;
//! use f1plot::f1::{F1Arena, F1Generator, F1Layout, F1Params};
//! use f1plot::keystream::PlotId;
//! use f1plot::queue::DiskQueue;
//!
//! let params = F1Params { k: 20, num_buckets: 16, thread_count: 4, ..F1Params::default() };
//! let queue = DiskQueue::new(Box::new(FileEngine::new("/tmp/f1")), params.num_buckets)?;
//! let layout = F1Layout::new(&params, queue.block_size(FileId::Y))?;
//! let mut arena = F1Arena::new(&layout);
//!
//! let report = F1Generator::new(&layout, PlotId::random()).run(&queue, &mut arena)?;
//! println!("{} entries", report.total_entries);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod arena;
pub mod distribute;
pub mod layout;
pub mod scheduler;

pub use arena::{F1Arena, StagingSlot};
pub use distribute::LabelTransform;
pub use layout::{F1Layout, F1Params};
pub use scheduler::WriteScheduler;

use crate::engine::FileId;
use crate::error::F1Error;
use crate::keystream::{KeystreamGenerator, PlotId, TABLE1_DOMAIN, WORDS_PER_BLOCK};
use crate::queue::DiskQueue;
use crate::stats::{GenerationStats, TableCounts};
use crate::worker::affinity::{core_for_worker, set_cpu_affinity};
use crate::worker::partition::thread_offsets;
use crate::worker::{run_job, Job};
use crate::Result;
use anyhow::Context;
use distribute::{check_capacity, count_buckets, scatter};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Run-time knobs that do not affect the layout
#[derive(Debug, Clone, Default)]
pub struct F1Options {
    /// Give up on a slot-reuse wait after this long
    pub fence_timeout: Option<Duration>,
    /// Pin worker `i` to `cpu_list[i % len]`
    pub cpu_list: Option<Vec<usize>>,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct F1Report {
    pub plot_id: PlotId,
    pub engine: &'static str,
    pub layout: F1Layout,
    /// Entries written to each bucket over the whole run
    pub bucket_counts: Vec<u64>,
    /// Entries distributed by each pass
    pub pass_totals: Vec<u64>,
    pub total_entries: u64,
    pub bytes_written: u64,
    pub elapsed: Duration,
    pub stats: GenerationStats,
}

/// Shared per-run state handed to every worker
struct RunContext<'a> {
    scheduler: WriteScheduler<'a>,
    transform: LabelTransform,
    table_counts: TableCounts,
    pass_totals: Mutex<Vec<u64>>,
}

/// Drives one first-table generation run
pub struct F1Generator<'a> {
    layout: &'a F1Layout,
    plot_id: PlotId,
    options: F1Options,
}

impl<'a> F1Generator<'a> {
    pub fn new(layout: &'a F1Layout, plot_id: PlotId) -> Self {
        Self {
            layout,
            plot_id,
            options: F1Options::default(),
        }
    }

    pub fn with_options(mut self, options: F1Options) -> Self {
        self.options = options;
        self
    }

    /// Generate the whole table through `queue`, staging in `arena`
    ///
    /// Returns only once every queued write has completed, whether the run
    /// succeeded or not.
    pub fn run(&self, queue: &DiskQueue, arena: &mut F1Arena) -> Result<F1Report> {
        let layout = self.layout;

        if matches!(&self.options.cpu_list, Some(cores) if cores.is_empty()) {
            return Err(F1Error::InvalidLayout("cpu list selects no cores".to_string()).into());
        }

        for file in FileId::ALL {
            if queue.block_size(file) != layout.io_block_size {
                return Err(F1Error::InvalidLayout(format!(
                    "layout uses {}-byte blocks but the {} file has {}-byte blocks",
                    layout.io_block_size,
                    file,
                    queue.block_size(file)
                ))
                .into());
            }
        }

        if !layout.slot_holds_pass() {
            log::warn!(
                "staging slot ({} entries) is smaller than a pass ({} entries)",
                layout.slot_capacity,
                layout.entries_per_pass
            );
        }

        log::info!(
            "generating table 1: k={}, {} buckets, {} threads, {} entries per pass",
            layout.k,
            layout.num_buckets,
            layout.thread_count,
            layout.entries_per_pass
        );

        let started = Instant::now();
        let (inputs, slots) = arena.split();
        let stride = layout.slice_capacity as usize;

        let ctx = RunContext {
            scheduler: WriteScheduler::new(queue, slots, stride, self.options.fence_timeout),
            transform: LabelTransform::from_layout(layout),
            table_counts: TableCounts::new(layout.num_buckets as usize),
            pass_totals: Mutex::new(Vec::with_capacity(layout.num_buckets as usize)),
        };

        let job_result = run_job(layout.num_buckets as usize, inputs, |job, input| {
            self.run_worker(job, input, &ctx)
        });
        let drain_result = ctx.scheduler.finish();

        match (job_result, drain_result) {
            (Err(err), Err(drain_err)) => {
                log::warn!("draining the disk queue after a failed run also failed: {:#}", drain_err);
                return Err(err);
            }
            (Err(err), Ok(())) => return Err(err),
            (Ok(()), Err(drain_err)) => return Err(drain_err.context("Failed to drain disk queue")),
            (Ok(()), Ok(())) => {}
        }

        let elapsed = started.elapsed();
        let bucket_counts = ctx.table_counts.snapshot();
        let total_entries = ctx.table_counts.total();
        let pass_totals = ctx.pass_totals.into_inner();

        log::info!(
            "table 1 complete: {} entries in {:?} ({} passes)",
            total_entries,
            elapsed,
            pass_totals.len()
        );

        Ok(F1Report {
            plot_id: self.plot_id,
            engine: queue.engine_name(),
            layout: layout.clone(),
            bucket_counts,
            pass_totals,
            total_entries,
            bytes_written: queue.bytes_written(),
            elapsed,
            stats: ctx.scheduler.into_stats(),
        })
    }

    fn run_worker(&self, job: &Job<'_>, input: &mut [u32], ctx: &RunContext<'_>) -> Result<()> {
        let layout = self.layout;

        let pinned = self.options.cpu_list.as_deref().and_then(|cores| core_for_worker(cores, job.id()));
        if let Some(core) = pinned {
            if let Err(err) = set_cpu_affinity(core) {
                log::warn!("worker {}: could not pin to core {}: {:#}", job.id(), core, err);
            }
        }

        let (blocks, block_offset) = thread_offsets(job.id(), job.thread_count(), layout.blocks_per_pass);
        let words = &mut input[..blocks as usize * WORDS_PER_BLOCK];

        let num_buckets = layout.num_buckets as usize;
        let stride = layout.slice_capacity as usize;
        let mut keystream = KeystreamGenerator::new(TABLE1_DOMAIN, &self.plot_id);
        let mut counts = vec![0u32; num_buckets];
        let mut cursors = vec![0usize; num_buckets];
        let mut totals = vec![0u32; num_buckets];

        for pass in 0..layout.num_buckets {
            let pass_started = Instant::now();
            let first_block = pass as u64 * layout.blocks_per_pass + block_offset;

            keystream.generate(first_block, words);
            count_buckets(words, &ctx.transform, &mut counts);
            job.prefix_sum(&counts, stride, &mut cursors, &mut totals)?;
            check_capacity(&totals, layout.slice_capacity)
                .with_context(|| format!("pass {} overflowed its staging region", pass))?;

            ctx.scheduler.acquire_slot(job, pass)?;
            scatter(
                words,
                first_block * WORDS_PER_BLOCK as u64,
                &ctx.transform,
                &mut cursors,
                ctx.scheduler.slot(pass),
            );
            ctx.scheduler.issue(job, pass, &totals, &ctx.table_counts)?;

            if job.is_control_thread() {
                let pass_total: u64 = totals.iter().map(|&t| t as u64).sum();
                let elapsed = pass_started.elapsed();
                log::debug!("pass {}/{}: {} entries in {:?}", pass + 1, layout.num_buckets, pass_total, elapsed);
                ctx.scheduler.record_pass(elapsed);
                ctx.pass_totals.lock().push(pass_total);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::file::{read_bucket, FileEngine};
    use crate::engine::mock::MockEngine;
    use rand::{RngCore, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use tempfile::TempDir;

    fn plot_id(seed: u8) -> PlotId {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(7).wrapping_add(seed);
        }
        PlotId::from_bytes(bytes)
    }

    fn params(k: u32, num_buckets: u32, threads: usize) -> F1Params {
        F1Params {
            k,
            num_buckets,
            thread_count: threads,
            ..F1Params::default()
        }
    }

    /// Run on a mock engine, returning the report and the engine recorder
    fn run_mock(p: &F1Params, id: PlotId, engine: MockEngine) -> (Result<F1Report>, MockEngine) {
        let recorder = engine.clone();
        let queue = DiskQueue::new(Box::new(engine), p.num_buckets).unwrap();
        let layout = F1Layout::new(p, queue.block_size(FileId::Y)).unwrap();
        let mut arena = F1Arena::new(&layout);
        let result = F1Generator::new(&layout, id).run(&queue, &mut arena);
        queue.shutdown().ok();
        (result, recorder)
    }

    /// Check completeness and bucket/label correctness of every bucket
    fn assert_table_valid(p: &F1Params, id: &PlotId, buckets: &[(Vec<u32>, Vec<u32>)]) {
        let layout = F1Layout::new(p, 64).unwrap();
        let transform = LabelTransform::from_layout(&layout);
        let mut keystream = KeystreamGenerator::new(TABLE1_DOMAIN, id);
        let mut seen = vec![false; 1 << p.k];

        for (bucket, (ys, xs)) in buckets.iter().enumerate() {
            assert_eq!(ys.len(), xs.len());
            for (&y, &x) in ys.iter().zip(xs) {
                assert!(!seen[x as usize], "x={} emitted twice", x);
                seen[x as usize] = true;

                let raw = transform.narrow(keystream.word_at(x as u64));
                assert_eq!(transform.bucket(raw), bucket, "x={} in wrong bucket", x);
                assert_eq!(transform.label(raw, x as u64), y, "x={} has wrong label", x);
            }
        }

        assert!(seen.iter().all(|&s| s), "some indices were never emitted");
    }

    fn mock_buckets(recorder: &MockEngine, num_buckets: u32) -> Vec<(Vec<u32>, Vec<u32>)> {
        (0..num_buckets)
            .map(|b| (recorder.bucket_words(FileId::Y, b), recorder.bucket_words(FileId::X, b)))
            .collect()
    }

    #[test]
    fn test_scenario_first_entry_at_k32() {
        // 4 buckets, k = 32, extra bits 6: computed directly, a full run
        // would need 2^30 entries per pass
        let id = plot_id(0);
        let transform = LabelTransform::new(32, 2, 6);
        let mut keystream = KeystreamGenerator::new(TABLE1_DOMAIN, &id);

        let mut block = vec![0u32; WORDS_PER_BLOCK];
        keystream.generate(0, &mut block);
        let raw = transform.raw(block[0]);
        assert_eq!(raw, 0x8c2dbde0);
        assert_eq!(keystream.word_at(0), raw);

        assert_eq!(transform.bucket(raw), 2);
        assert_eq!(transform.label(raw, 0), 0x0b6f7800);

        let raw = transform.raw(block[1]);
        assert_eq!(raw, 0xa0171c51);
        assert_eq!(transform.bucket(raw), 2);
        assert_eq!(transform.label(raw, 1), 0x05c71440);
    }

    #[test]
    fn test_complete_and_correct_single_thread() {
        let p = params(16, 4, 1);
        let id = plot_id(1);
        let (result, recorder) = run_mock(&p, id, MockEngine::new().with_block_size(64));
        let report = result.unwrap();

        assert_eq!(report.total_entries, 1 << 16);
        assert_table_valid(&p, &id, &mock_buckets(&recorder, 4));
        assert!(recorder.is_flushed());
    }

    #[test]
    fn test_complete_and_correct_multi_thread() {
        let p = params(18, 16, 5);
        let id = plot_id(2);
        let (result, recorder) = run_mock(&p, id, MockEngine::new().with_block_size(256));
        let report = result.unwrap();

        assert_table_valid(&p, &id, &mock_buckets(&recorder, 16));
        let written: Vec<u64> = (0..16)
            .map(|b| recorder.bucket_words(FileId::X, b).len() as u64)
            .collect();
        assert_eq!(report.bucket_counts, written);
        assert_eq!(report.bytes_written, 2 * 4 * (1 << 18));
    }

    #[test]
    fn test_pass_totals_conserve_counts() {
        let p = params(17, 8, 3);
        let (result, _recorder) = run_mock(&p, plot_id(3), MockEngine::new());
        let report = result.unwrap();

        assert_eq!(report.pass_totals.len(), 8);
        for total in &report.pass_totals {
            assert_eq!(*total, report.layout.entries_per_pass);
        }
        assert_eq!(report.bucket_counts.iter().sum::<u64>(), 1 << 17);
        assert_eq!(report.stats.passes(), 8);
    }

    #[test]
    fn test_within_thread_order_is_reversed() {
        let p = params(16, 2, 1);
        let id = plot_id(4);
        let (result, recorder) = run_mock(&p, id, MockEngine::new().with_block_size(64));
        result.unwrap();

        // One thread: inside each pass, a bucket's x values are descending
        let layout = F1Layout::new(&p, 64).unwrap();
        for b in 0..2 {
            let writes: Vec<_> = recorder
                .writes()
                .into_iter()
                .filter(|w| w.file == FileId::X && w.bucket == b)
                .collect();
            let xs = recorder.bucket_words(FileId::X, b);
            let mut offset = 0;
            for write in writes {
                let chunk = &xs[offset..offset + write.words];
                let pass = chunk[0] as u64 / layout.entries_per_pass;
                assert!(chunk.windows(2).all(|w| w[0] > w[1]));
                assert!(chunk.iter().all(|&x| x as u64 / layout.entries_per_pass == pass));
                offset += write.words;
            }
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let p = params(16, 8, 3);
        let id = plot_id(5);

        let run_to_dir = |dir: &TempDir| {
            let queue = DiskQueue::new(Box::new(FileEngine::new(dir.path()).with_block_size(Some(512))), 8).unwrap();
            let layout = F1Layout::new(&p, 512).unwrap();
            let mut arena = F1Arena::new(&layout);
            let report = F1Generator::new(&layout, id).run(&queue, &mut arena).unwrap();
            queue.shutdown().unwrap();
            report
        };

        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let a = run_to_dir(&first);
        let b = run_to_dir(&second);
        assert_eq!(a.bucket_counts, b.bucket_counts);

        for file in FileId::ALL {
            for bucket in 0..8 {
                let left = read_bucket(first.path(), file, bucket).unwrap();
                let right = read_bucket(second.path(), file, bucket).unwrap();
                assert_eq!(left, right, "bucket {} of {} differs", bucket, file);
                assert_eq!(left.len() as u64, a.bucket_counts[bucket as usize]);
            }
        }
    }

    #[test]
    fn test_random_plot_ids_fit_default_capacity() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x5eed);
        let p = params(18, 8, 2);

        for _ in 0..4 {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            let (result, _recorder) = run_mock(&p, PlotId::from_bytes(bytes), MockEngine::new());
            assert_eq!(result.unwrap().total_entries, 1 << 18);
        }
    }

    #[test]
    fn test_undersized_multiplier_overflows() {
        // 2064 entries per region, 4 regions, 16384 entries per pass
        let mut p = params(16, 4, 2);
        p.slice_multiplier = 0.5;
        let (result, recorder) = run_mock(&p, plot_id(6), MockEngine::new().with_block_size(64));

        let err = result.unwrap_err();
        match err.downcast_ref::<F1Error>() {
            Some(F1Error::CapacityExceeded { position, capacity, .. }) => {
                assert_eq!(*capacity, 2064);
                assert!(*position >= 2064);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(recorder.write_count(), 0);
    }

    #[test]
    fn test_slow_engine_keeps_pipeline_safe() {
        let p = params(16, 8, 3);
        let id = plot_id(7);
        let engine = MockEngine::new().with_delay(Duration::from_millis(2));
        let (result, recorder) = run_mock(&p, id, engine);
        let report = result.unwrap();

        assert_table_valid(&p, &id, &mock_buckets(&recorder, 8));

        let acquires = report.stats.acquires();
        assert_eq!(acquires.len(), 6);
        for acquire in acquires {
            assert!(acquire.fence_after >= acquire.pass as u64 - 1);
        }
    }

    #[test]
    fn test_io_failure_fails_run() {
        let engine = MockEngine::new();
        engine.fail_after(3);
        let (result, recorder) = run_mock(&params(16, 8, 2), plot_id(8), engine);

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Mock IO error"));
        assert_eq!(recorder.write_count(), 3);
    }

    #[test]
    fn test_block_size_mismatch_is_rejected() {
        let p = params(16, 4, 1);
        let queue = DiskQueue::new(Box::new(MockEngine::new().with_block_size(4096)), 4).unwrap();
        let layout = F1Layout::new(&p, 64).unwrap();
        let mut arena = F1Arena::new(&layout);

        let err = F1Generator::new(&layout, plot_id(9)).run(&queue, &mut arena).unwrap_err();
        assert!(matches!(err.downcast_ref::<F1Error>(), Some(F1Error::InvalidLayout(_))));
    }

    #[test]
    fn test_empty_cpu_list_is_rejected() {
        let p = params(16, 4, 2);
        let engine = MockEngine::new().with_block_size(64);
        let recorder = engine.clone();
        let queue = DiskQueue::new(Box::new(engine), 4).unwrap();
        let layout = F1Layout::new(&p, 64).unwrap();
        let mut arena = F1Arena::new(&layout);

        let options = F1Options {
            cpu_list: Some(Vec::new()),
            ..F1Options::default()
        };
        let err = F1Generator::new(&layout, plot_id(10))
            .with_options(options)
            .run(&queue, &mut arena)
            .unwrap_err();

        assert!(matches!(err.downcast_ref::<F1Error>(), Some(F1Error::InvalidLayout(_))));
        assert_eq!(recorder.write_count(), 0);
        queue.shutdown().unwrap();
    }

    #[test]
    fn test_bucket_sizes_are_balanced() {
        let p = params(18, 4, 2);
        let (result, _recorder) = run_mock(&p, plot_id(10), MockEngine::new());
        let report = result.unwrap();

        let mean = (1u64 << 18) / 4;
        assert_eq!(report.bucket_counts.len(), 4);
        for &count in &report.bucket_counts {
            // Binomial spread is ~0.4%; 5% means something is misrouted
            assert!(count > mean * 95 / 100 && count < mean * 105 / 100);
        }
    }
}
