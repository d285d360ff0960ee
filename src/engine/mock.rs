//! Mock bucket engine for testing
//!
//! Keeps every bucket in memory and records each write, so tests can inspect
//! exactly what the disk queue delivered and in which order. Clones share
//! state: hand one clone to the queue and keep another for assertions.
//!
//! # Features
//!
//! - Per-bucket word storage for both destinations
//! - Write log in submission order
//! - Failure injection after N successful writes
//! - Per-write delay to simulate slow storage
//!
//! # Example
//!
//! ```
//! use f1plot::engine::{BucketEngine, FileId};
//! use f1plot::engine::mock::MockEngine;
//!
//! let mut engine = MockEngine::new();
//! let recorder = engine.clone();
//!
//! engine.init(2).unwrap();
//! engine.write_bucket(FileId::Y, 1, &7u32.to_ne_bytes()).unwrap();
//!
//! assert_eq!(recorder.bucket_words(FileId::Y, 1), vec![7]);
//! assert_eq!(recorder.write_count(), 1);
//! ```

use super::{BucketEngine, FileId};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Record of one `write_bucket` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub file: FileId,
    pub bucket: u32,
    pub words: usize,
}

#[derive(Debug, Default)]
struct MockState {
    num_buckets: u32,
    /// Words per bucket, indexed `file.index() * num_buckets + bucket`
    buckets: Vec<Vec<u32>>,
    writes: Vec<WriteRecord>,
    /// Fail every write once this many have succeeded
    fail_after: Option<usize>,
    flushed: bool,
}

/// In-memory engine
#[derive(Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    block_size: usize,
    delay: Duration,
}

impl MockEngine {
    /// Engine reporting a 4096-byte block size, no delay, no failures
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            block_size: 4096,
            delay: Duration::ZERO,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sleep this long inside every write
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every write after the first `writes` fail
    pub fn fail_after(&self, writes: usize) {
        self.state.lock().fail_after = Some(writes);
    }

    /// Contents of one bucket so far
    pub fn bucket_words(&self, file: FileId, bucket: u32) -> Vec<u32> {
        let state = self.state.lock();
        let index = file.index() * state.num_buckets as usize + bucket as usize;
        state.buckets.get(index).cloned().unwrap_or_default()
    }

    /// All writes in submission order
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub fn is_flushed(&self) -> bool {
        self.state.lock().flushed
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketEngine for MockEngine {
    fn init(&mut self, num_buckets: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.num_buckets = num_buckets;
        state.buckets = vec![Vec::new(); FileId::ALL.len() * num_buckets as usize];
        state.writes.clear();
        state.flushed = false;
        Ok(())
    }

    fn block_size(&self, _file: FileId) -> usize {
        self.block_size
    }

    fn write_bucket(&mut self, file: FileId, bucket: u32, data: &[u8]) -> Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let mut state = self.state.lock();

        if let Some(limit) = state.fail_after {
            if state.writes.len() >= limit {
                anyhow::bail!("Mock IO error on bucket {} of {}", bucket, file);
            }
        }

        if bucket >= state.num_buckets {
            anyhow::bail!("bucket {} out of range ({} buckets)", bucket, state.num_buckets);
        }

        let index = file.index() * state.num_buckets as usize + bucket as usize;
        state.buckets[index].extend(
            data.chunks_exact(4)
                .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]])),
        );
        state.writes.push(WriteRecord {
            file,
            bucket,
            words: data.len() / 4,
        });

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.state.lock().flushed = true;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
