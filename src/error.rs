//! Domain errors for table-one generation
//!
//! Most of the crate returns `anyhow::Result` (see [`crate::Result`]). The
//! variants here are the failures callers may want to match on: sizing
//! violations, fence failures and aborted jobs.

use std::time::Duration;
use thiserror::Error;

/// Fatal generation errors
#[derive(Debug, Error)]
pub enum F1Error {
    /// A scatter position would reach or pass the reserved bucket region
    #[error(
        "bucket {bucket}: write position {position} exceeds reserved capacity {capacity} \
         (increase the slice multiplier)"
    )]
    CapacityExceeded {
        bucket: u32,
        position: u64,
        capacity: u64,
    },

    /// A fence did not reach the expected value within the diagnostic timeout
    #[error("fence wait timed out after {timeout:?}: expected {expected}, observed {observed}")]
    FenceTimeout {
        expected: u64,
        observed: u64,
        timeout: Duration,
    },

    /// The I/O thread failed and poisoned the fence
    #[error("disk queue failed: {0}")]
    IoFailed(String),

    /// The I/O thread is gone and can no longer accept commands
    #[error("disk queue is closed")]
    QueueClosed,

    /// Another worker failed inside a leader-only section
    #[error("job aborted by another worker")]
    JobAborted,

    /// The requested layout cannot be built
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}
