//! Per-thread work ranges

/// Split `total_units` contiguous units across `thread_count` workers
///
/// Returns `(unit_count, unit_offset)` for `thread_index`. Every worker gets
/// `total_units / thread_count` units in index order; the last worker also
/// takes the remainder, so the ranges tile `0..total_units` with no gaps.
///
/// # Example
///
/// ```
/// use f1plot::worker::partition::thread_offsets;
///
/// assert_eq!(thread_offsets(0, 3, 10), (3, 0));
/// assert_eq!(thread_offsets(1, 3, 10), (3, 3));
/// assert_eq!(thread_offsets(2, 3, 10), (4, 6));
/// ```
pub fn thread_offsets(thread_index: usize, thread_count: usize, total_units: u64) -> (u64, u64) {
    assert!(thread_count > 0, "thread_count must be > 0");
    assert!(thread_index < thread_count, "thread_index out of range");

    let per_thread = total_units / thread_count as u64;
    let offset = per_thread * thread_index as u64;

    let count = if thread_index == thread_count - 1 {
        total_units - offset
    } else {
        per_thread
    };

    (count, offset)
}

/// Largest share any worker receives (the last worker's)
pub fn max_thread_units(thread_count: usize, total_units: u64) -> u64 {
    thread_offsets(thread_count - 1, thread_count, total_units).0
}
