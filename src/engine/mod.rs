//! Bucket write engines
//!
//! An engine is the sink at the end of the disk queue: it receives each
//! destination bucket's slice of a staging array and persists it. The queue
//! owns the engine on its own thread, so engines need to be `Send` but never
//! `Sync`.
//!
//! # Engine Types
//!
//! - **File** ([`file::FileEngine`]): one append-only file per
//!   (destination, bucket) under an output directory
//! - **Mock** ([`mock::MockEngine`]): in-memory buckets with injectable
//!   failures and delays, for tests
//!
//! # Lifecycle
//!
//! 1. Create the engine (via `new()` on the concrete type)
//! 2. `init()` with the bucket count (opens files, sizes tables)
//! 3. `write_bucket()` any number of times, in submission order
//! 4. `flush()` once at shutdown

use crate::Result;
use std::fmt;

/// Destination stream of a bucket write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileId {
    /// Labels
    Y,
    /// Generation indices
    X,
}

impl FileId {
    pub const ALL: [FileId; 2] = [FileId::Y, FileId::X];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            FileId::Y => 0,
            FileId::X => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FileId::Y => "y",
            FileId::X => "x",
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sink for bucketed entry arrays
pub trait BucketEngine: Send {
    /// Prepare `num_buckets` buckets for every [`FileId`]
    fn init(&mut self, num_buckets: u32) -> Result<()>;

    /// Storage alignment unit in bytes for `file`
    ///
    /// Only meaningful after `init()`.
    fn block_size(&self, file: FileId) -> usize;

    /// Append `data` (native-endian `u32` words) to `bucket` of `file`
    fn write_bucket(&mut self, file: FileId, bucket: u32, data: &[u8]) -> Result<()>;

    /// Make everything written so far durable
    fn flush(&mut self) -> Result<()>;

    /// Short engine name for logs and reports
    fn name(&self) -> &'static str;
}

pub mod file;
pub mod mock;
