//! Bucket classification and scatter
//!
//! A pass is distributed in two scans over each worker's keystream segment:
//! the first counts entries per destination bucket, the second (after the
//! prefix sum has handed every worker its own end cursors) writes each entry
//! at a unique position of the staging slot. Because cursors are consumed by
//! pre-decrementing, entries of one bucket land in reverse encounter order
//! inside a worker's range.

use super::arena::StagingSlot;
use super::layout::F1Layout;
use crate::error::F1Error;
use crate::keystream::raw_word;

/// Raw word, bucket and label arithmetic for one layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTransform {
    k: u32,
    extra_bits: u32,
    bucket_shift: u32,
    label_mask: u64,
}

impl LabelTransform {
    pub fn new(k: u32, bucket_bits: u32, extra_bits: u32) -> Self {
        debug_assert!(bucket_bits <= k && extra_bits <= k && k <= 32);

        let y_bits = k + extra_bits - bucket_bits;
        Self {
            k,
            extra_bits,
            bucket_shift: k - bucket_bits,
            label_mask: (1u64 << y_bits) - 1,
        }
    }

    pub fn from_layout(layout: &F1Layout) -> Self {
        Self::new(layout.k, layout.bucket_bits, layout.extra_bits)
    }

    /// `k`-bit raw value of a keystream word in memory order
    #[inline(always)]
    pub fn raw(&self, word: u32) -> u32 {
        self.narrow(raw_word(word))
    }

    /// `k`-bit raw value of an already byte-swapped keystream word
    #[inline(always)]
    pub fn narrow(&self, value: u32) -> u32 {
        ((value as u64) >> (32 - self.k)) as u32
    }

    /// Destination bucket of a raw value (its top `bucket_bits` bits)
    #[inline(always)]
    pub fn bucket(&self, raw: u32) -> usize {
        ((raw as u64) >> self.bucket_shift) as usize
    }

    /// Stored label of raw value `raw` at generation index `x`
    #[inline(always)]
    pub fn label(&self, raw: u32, x: u64) -> u32 {
        let y = ((raw as u64) << self.extra_bits) | (x >> (self.k - self.extra_bits));
        (y & self.label_mask) as u32
    }
}

/// Count `words` per destination bucket into `counts`
pub fn count_buckets(words: &[u32], transform: &LabelTransform, counts: &mut [u32]) {
    counts.fill(0);
    for &word in words {
        counts[transform.bucket(transform.raw(word))] += 1;
    }
}

/// Fail if any bucket's pass total would not fit its region
///
/// Every worker evaluates the same shared totals, so every worker reaches
/// the same verdict.
pub fn check_capacity(totals: &[u32], slice_capacity: u64) -> Result<(), F1Error> {
    for (bucket, &total) in totals.iter().enumerate() {
        if total as u64 > slice_capacity {
            return Err(F1Error::CapacityExceeded {
                bucket: bucket as u32,
                position: total as u64 - 1,
                capacity: slice_capacity,
            });
        }
    }
    Ok(())
}

/// Write every entry of `words` into `slot`
///
/// `first_x` is the generation index of `words[0]`. `cursors` are this
/// worker's end cursors from the prefix sum and must have passed
/// [`check_capacity`]; they are consumed.
pub fn scatter(
    words: &[u32],
    first_x: u64,
    transform: &LabelTransform,
    cursors: &mut [usize],
    slot: &StagingSlot,
) {
    for (i, &word) in words.iter().enumerate() {
        let x = first_x + i as u64;
        let raw = transform.raw(word);
        let bucket = transform.bucket(raw);

        cursors[bucket] -= 1;
        let position = cursors[bucket];

        // SAFETY: the prefix sum gives each worker a disjoint position range
        // per bucket and the capacity check keeps it inside the slot.
        unsafe {
            slot.y.write(position, transform.label(raw, x));
            slot.x.write(position, x as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::f1::arena::F1Arena;
    use crate::f1::layout::F1Params;

    /// Memory-order word whose big-endian value is `value`
    fn word(value: u32) -> u32 {
        value.to_be()
    }

    #[test]
    fn test_raw_bucket_and_label_at_k32() {
        let t = LabelTransform::new(32, 2, 6);
        let raw = t.raw(word(0xC000_0001));
        assert_eq!(raw, 0xC000_0001);
        assert_eq!(t.bucket(raw), 3);

        // 36-bit label truncated to its low 32 bits
        let expected = (((0xC000_0001u64) << 6) & ((1u64 << 36) - 1)) as u32;
        assert_eq!(t.label(raw, 0), expected);
        // Top 6 bits of x fill the low label bits
        assert_eq!(t.label(raw, 0xFC00_0000) & 0x3F, 0x3F);
    }

    #[test]
    fn test_reduced_k_uses_top_bits() {
        let t = LabelTransform::new(16, 2, 6);
        let raw = t.raw(word(0xABCD_1234));
        assert_eq!(raw, 0xABCD);
        assert_eq!(t.bucket(raw), 0b10);

        // y_bits = 20; x = 0x8000 contributes its top 6 of 16 bits (0b100000)
        let label = t.label(raw, 0x8000);
        assert_eq!(label, ((0xABCDu32 << 6) | 0b100000) & 0xF_FFFF);
    }

    #[test]
    fn test_zero_extra_bits() {
        let t = LabelTransform::new(20, 4, 0);
        let raw = t.raw(word(0xFFFF_FFFF));
        assert_eq!(raw, 0xF_FFFF);
        assert_eq!(t.label(raw, 0xF_FFFF), 0xFFFF);
    }

    #[test]
    fn test_count_conserves_words() {
        let t = LabelTransform::new(16, 2, 6);
        let words: Vec<u32> = [0x0000_0000u32, 0x4000_0000, 0x4100_0000, 0xC000_0000, 0xFFFF_FFFF]
            .iter()
            .map(|&v| word(v))
            .collect();

        let mut counts = vec![99u32; 4];
        count_buckets(&words, &t, &mut counts);
        assert_eq!(counts, vec![1, 2, 0, 2]);
        assert_eq!(counts.iter().sum::<u32>() as usize, words.len());
    }

    #[test]
    fn test_check_capacity() {
        assert!(check_capacity(&[10, 16, 0], 16).is_ok());

        match check_capacity(&[10, 17, 40], 16).unwrap_err() {
            F1Error::CapacityExceeded { bucket, position, capacity } => {
                assert_eq!(bucket, 1);
                assert_eq!(position, 16);
                assert_eq!(capacity, 16);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scatter_fills_regions_in_reverse_order() {
        let params = F1Params {
            k: 16,
            num_buckets: 4,
            ..F1Params::default()
        };
        let layout = F1Layout::new(&params, 64).unwrap();
        let arena = F1Arena::new(&layout);
        let slot = &arena.slots()[0];
        let t = LabelTransform::from_layout(&layout);
        let stride = layout.slice_capacity as usize;

        // Buckets 1, 3, 1
        let words: Vec<u32> = [0x4000_0000u32, 0xC000_0000, 0x7FFF_0000].iter().map(|&v| word(v)).collect();
        let mut cursors = vec![0, stride + 2, 2 * stride, 3 * stride + 1];
        scatter(&words, 100, &t, &mut cursors, slot);

        assert_eq!(cursors, vec![0, stride, 2 * stride, 3 * stride]);
        unsafe {
            // Last encountered bucket-1 entry sits first
            assert_eq!(slot.x.read(stride), 102);
            assert_eq!(slot.x.read(stride + 1), 100);
            assert_eq!(slot.x.read(3 * stride), 101);
            assert_eq!(slot.y.read(stride + 1), t.label(0x4000, 100));
            assert_eq!(slot.y.read(3 * stride), t.label(0xC000, 101));
        }
    }
}
