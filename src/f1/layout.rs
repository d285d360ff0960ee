//! Pass and staging geometry
//!
//! Every size the generator allocates or indexes with is derived here, once,
//! from the generation parameters and the storage block size reported by the
//! disk queue.
//!
//! ```text
//! staging slot (one array, y or x)
//! ┌──────────── bucket 0 ────────────┬──────────── bucket 1 ────────────┬─ ...
//! │ t0 | t1 | ... | tN |   unused    │ t0 | t1 | ... | tN |   unused    │
//! └──────────── slice_capacity ──────┴──────────── slice_capacity ──────┴─ ...
//! ```
//!
//! `slice_capacity` is a multiple of the block size in entries, so every
//! bucket region starts on a block boundary.

use crate::error::F1Error;
use crate::keystream::WORDS_PER_BLOCK;
use crate::util::buffer::round_up;
use crate::worker::partition::max_thread_units;
use serde::Serialize;

/// Label width used by production plots
pub const DEFAULT_K: u32 = 32;

/// Smallest label width accepted (test plots)
pub const MIN_K: u32 = 16;

/// Default number of low index bits mixed into each label
pub const DEFAULT_EXTRA_BITS: u32 = 6;

/// Default headroom over the mean bucket size per pass
pub const DEFAULT_SLICE_MULTIPLIER: f64 = 1.07;

/// Largest supported bucket count
pub const MAX_BUCKETS: u32 = 1024;

/// Largest supported storage block size
pub const MAX_IO_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// Generation parameters that determine the layout
#[derive(Debug, Clone, PartialEq)]
pub struct F1Params {
    pub k: u32,
    pub num_buckets: u32,
    pub extra_bits: u32,
    pub thread_count: usize,
    pub slice_multiplier: f64,
}

impl Default for F1Params {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            num_buckets: 256,
            extra_bits: DEFAULT_EXTRA_BITS,
            thread_count: 1,
            slice_multiplier: DEFAULT_SLICE_MULTIPLIER,
        }
    }
}

/// Derived sizes for one generation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct F1Layout {
    pub k: u32,
    pub num_buckets: u32,
    pub bucket_bits: u32,
    pub extra_bits: u32,
    pub thread_count: usize,
    /// Storage block size in bytes
    pub io_block_size: usize,
    /// Entries generated per pass (`2^k / num_buckets`)
    pub entries_per_pass: u64,
    /// Keystream blocks per pass
    pub blocks_per_pass: u64,
    /// Expected worst-case entries of one bucket in one pass
    pub max_entries_per_slice: u64,
    /// Entries reserved per bucket region in a staging array
    pub slice_capacity: u64,
    /// Entries in one staging array (`num_buckets * slice_capacity`)
    pub slot_capacity: u64,
    /// Keystream blocks of the largest per-worker share
    pub max_thread_blocks: u64,
}

impl F1Layout {
    /// Derive the layout, rejecting parameters that cannot be staged
    pub fn new(params: &F1Params, io_block_size: usize) -> Result<Self, F1Error> {
        let F1Params {
            k,
            num_buckets,
            extra_bits,
            thread_count,
            slice_multiplier,
        } = *params;

        if !(MIN_K..=DEFAULT_K).contains(&k) {
            return Err(F1Error::InvalidLayout(format!(
                "k must be between {} and {}, got {}",
                MIN_K, DEFAULT_K, k
            )));
        }

        if !num_buckets.is_power_of_two() || !(2..=MAX_BUCKETS).contains(&num_buckets) {
            return Err(F1Error::InvalidLayout(format!(
                "bucket count must be a power of two between 2 and {}, got {}",
                MAX_BUCKETS, num_buckets
            )));
        }

        let bucket_bits = num_buckets.trailing_zeros();
        if k - bucket_bits < WORDS_PER_BLOCK.trailing_zeros() {
            return Err(F1Error::InvalidLayout(format!(
                "{} buckets leave less than one keystream block per pass at k={}",
                num_buckets, k
            )));
        }

        if extra_bits > k {
            return Err(F1Error::InvalidLayout(format!(
                "extra bits ({}) cannot exceed k ({})",
                extra_bits, k
            )));
        }

        if thread_count == 0 {
            return Err(F1Error::InvalidLayout("thread count must be at least 1".to_string()));
        }

        if !(slice_multiplier.is_finite() && slice_multiplier > 0.0) {
            return Err(F1Error::InvalidLayout(format!(
                "slice multiplier must be positive, got {}",
                slice_multiplier
            )));
        }

        if !io_block_size.is_power_of_two()
            || io_block_size < std::mem::size_of::<u32>()
            || io_block_size > MAX_IO_BLOCK_SIZE
        {
            return Err(F1Error::InvalidLayout(format!(
                "block size must be a power of two between 4 and {}, got {}",
                MAX_IO_BLOCK_SIZE, io_block_size
            )));
        }

        let entries_per_pass = (1u64 << k) / num_buckets as u64;
        let blocks_per_pass = entries_per_pass / WORDS_PER_BLOCK as u64;

        let max_entries_per_slice =
            (entries_per_pass as f64 / num_buckets as f64 * slice_multiplier) as u64;
        let block_entries = (io_block_size / std::mem::size_of::<u32>()) as u64;
        let slice_capacity = round_up(max_entries_per_slice, block_entries) + block_entries;
        let slot_capacity = slice_capacity * num_buckets as u64;

        let max_thread_blocks = max_thread_units(thread_count, blocks_per_pass);

        Ok(Self {
            k,
            num_buckets,
            bucket_bits,
            extra_bits,
            thread_count,
            io_block_size,
            entries_per_pass,
            blocks_per_pass,
            max_entries_per_slice,
            slice_capacity,
            slot_capacity,
            max_thread_blocks,
        })
    }

    /// Whether a staging slot can hold a whole pass at all
    ///
    /// A layout failing this is guaranteed to overflow some bucket region on
    /// the first pass.
    pub fn slot_holds_pass(&self) -> bool {
        self.slot_capacity >= self.entries_per_pass
    }

    /// Total entries in the table (`2^k`)
    pub fn total_entries(&self) -> u64 {
        1u64 << self.k
    }

    /// Width of a stored label before truncation to 32 bits
    pub fn y_bits(&self) -> u32 {
        self.k + self.extra_bits - self.bucket_bits
    }

    /// Words in one worker's share of the generation-input buffer
    pub fn thread_input_words(&self) -> usize {
        self.max_thread_blocks as usize * WORDS_PER_BLOCK
    }

    /// Words in the whole generation-input buffer
    pub fn input_words(&self) -> usize {
        self.thread_input_words() * self.thread_count
    }

    /// Bytes the arena reserves for this layout
    pub fn required_memory(&self) -> u64 {
        let word = std::mem::size_of::<u32>() as u64;
        let input = self.input_words() as u64 * word;
        // Two slots, each with a label array and an index array
        let staging = 4 * self.slot_capacity * word;
        let counts = 2 * self.num_buckets as u64 * word;
        input + staging + counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(k: u32, num_buckets: u32, threads: usize) -> F1Params {
        F1Params {
            k,
            num_buckets,
            thread_count: threads,
            ..F1Params::default()
        }
    }

    #[test]
    fn test_production_layout() {
        let layout = F1Layout::new(&params(32, 256, 8), 4096).unwrap();

        assert_eq!(layout.bucket_bits, 8);
        assert_eq!(layout.entries_per_pass, 1 << 24);
        assert_eq!(layout.blocks_per_pass, 1 << 20);
        // 65536 * 1.07
        assert_eq!(layout.max_entries_per_slice, 70123);
        // round_up(70123, 1024) + 1024
        assert_eq!(layout.slice_capacity, 70656 + 1024);
        assert_eq!(layout.slot_capacity, 256 * 71680);
        assert_eq!(layout.max_thread_blocks, 1 << 17);
        assert_eq!(layout.y_bits(), 30);
    }

    #[test]
    fn test_slice_capacity_is_block_aligned() {
        for block_size in [4usize, 64, 512, 4096, 65536] {
            let layout = F1Layout::new(&params(20, 16, 3), block_size).unwrap();
            let block_entries = (block_size / 4) as u64;
            assert_eq!(layout.slice_capacity % block_entries, 0);
            assert!(layout.slice_capacity > layout.max_entries_per_slice);
        }
    }

    #[test]
    fn test_last_thread_gets_largest_share() {
        let layout = F1Layout::new(&params(16, 4, 3), 64).unwrap();
        // 16384 entries per pass -> 1024 blocks -> 341, 341, 342
        assert_eq!(layout.blocks_per_pass, 1024);
        assert_eq!(layout.max_thread_blocks, 342);
        assert_eq!(layout.input_words(), 342 * 16 * 3);
    }

    #[test]
    fn test_required_memory_counts_both_slots() {
        let layout = F1Layout::new(&params(16, 4, 1), 64).unwrap();
        let expected = layout.input_words() as u64 * 4 + 4 * layout.slot_capacity * 4 + 2 * 4 * 4;
        assert_eq!(layout.required_memory(), expected);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(F1Layout::new(&params(15, 4, 1), 4096).is_err());
        assert!(F1Layout::new(&params(33, 4, 1), 4096).is_err());
        assert!(F1Layout::new(&params(20, 3, 1), 4096).is_err());
        assert!(F1Layout::new(&params(20, 1, 1), 4096).is_err());
        assert!(F1Layout::new(&params(20, 2048, 1), 4096).is_err());
        assert!(F1Layout::new(&params(20, 4, 0), 4096).is_err());
        assert!(F1Layout::new(&params(20, 4, 1), 3000).is_err());
        assert!(F1Layout::new(&params(20, 4, 1), 2).is_err());
        // 2^16 / 1024 = 64 entries per pass -> still 4 blocks, accepted
        assert!(F1Layout::new(&params(16, 1024, 1), 4).is_ok());
    }

    #[test]
    fn test_rejects_bad_multiplier_and_extra_bits() {
        let mut p = params(20, 4, 1);
        p.slice_multiplier = 0.0;
        assert!(F1Layout::new(&p, 4096).is_err());
        p.slice_multiplier = f64::NAN;
        assert!(F1Layout::new(&p, 4096).is_err());

        let mut p = params(20, 4, 1);
        p.extra_bits = 21;
        assert!(F1Layout::new(&p, 4096).is_err());
    }

    #[test]
    fn test_undersized_slot_is_detected() {
        let mut p = params(16, 4, 1);
        p.slice_multiplier = 0.5;
        // 4096 * 0.5 = 2048 -> 2048 + 16 per bucket, 8256 < 16384
        let layout = F1Layout::new(&p, 64).unwrap();
        assert_eq!(layout.slice_capacity, 2064);
        assert!(!layout.slot_holds_pass());

        assert!(F1Layout::new(&params(16, 4, 1), 64).unwrap().slot_holds_pass());
    }
}
