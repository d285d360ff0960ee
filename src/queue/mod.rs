//! Asynchronous disk queue
//!
//! The queue owns a [`BucketEngine`] on a dedicated thread and feeds it
//! commands in strict submission order. Producers stage commands and make
//! them visible with [`DiskQueue::commit_commands`]; completion is observed
//! through [`Fence`]s signalled by the queue thread after every earlier
//! command has been processed.
//!
//! # Buffer ownership
//!
//! Bucket writes reference staging buffers through `Arc`s, so the memory
//! outlives any in-flight command. The contents, however, are only stable
//! while the producer refrains from rewriting them: a producer may reuse a
//! buffer only after the fence signalled behind its write has been observed.
//!
//! # Example
//!
//! ```
//! use f1plot::engine::{FileId, mock::MockEngine};
//! use f1plot::queue::{DiskQueue, ElementCounts, Fence};
//! use f1plot::util::buffer::AlignedBuffer;
//! use std::sync::Arc;
//!
//! let engine = MockEngine::new();
//! let recorder = engine.clone();
//! let queue = DiskQueue::new(Box::new(engine), 2)?;
//!
//! let buffer = Arc::new(AlignedBuffer::new(32, 64));
//! unsafe { buffer.write(16, 42) };
//! let counts = Arc::new(ElementCounts::new(2));
//! counts.store(&[0, 1]);
//!
//! let fence = Arc::new(Fence::new());
//! queue.write_bucket_elements(FileId::Y, &buffer, &counts, 16);
//! queue.signal_fence(&fence, 1);
//! queue.commit_commands()?;
//!
//! fence.wait(1, None)?;
//! assert_eq!(recorder.bucket_words(FileId::Y, 1), vec![42]);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod fence;

pub use fence::Fence;

use crate::engine::{BucketEngine, FileId};
use crate::error::F1Error;
use crate::util::buffer::AlignedBuffer;
use crate::Result;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Maximum committed commands waiting for the queue thread
const QUEUE_DEPTH: usize = 64;

/// Per-bucket element counts attached to a bucket write
///
/// Written by the producer before the write is committed and read by the
/// queue thread while processing it.
#[derive(Debug)]
pub struct ElementCounts {
    counts: Vec<AtomicU32>,
}

impl ElementCounts {
    pub fn new(num_buckets: usize) -> Self {
        Self {
            counts: (0..num_buckets).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Overwrite all counts
    pub fn store(&self, counts: &[u32]) {
        assert_eq!(counts.len(), self.counts.len(), "bucket count mismatch");
        for (slot, &count) in self.counts.iter().zip(counts) {
            slot.store(count, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn get(&self, bucket: usize) -> u32 {
        self.counts[bucket].load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}

enum Command {
    /// Write bucket `b`'s `counts[b]` words starting at `b * stride`
    WriteBuckets {
        file: FileId,
        buffer: Arc<AlignedBuffer>,
        counts: Arc<ElementCounts>,
        stride: usize,
    },
    SignalFence {
        fence: Arc<Fence>,
        value: u64,
    },
}

/// Ordered asynchronous write queue
pub struct DiskQueue {
    sender: Option<Sender<Command>>,
    /// Staged, not yet committed commands
    pending: Mutex<Vec<Command>>,
    block_sizes: [usize; 2],
    engine_name: &'static str,
    bytes_written: Arc<AtomicU64>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl DiskQueue {
    /// Initialize `engine` for `num_buckets` buckets and start the queue thread
    pub fn new(mut engine: Box<dyn BucketEngine>, num_buckets: u32) -> Result<Self> {
        engine.init(num_buckets)?;

        let block_sizes = [engine.block_size(FileId::Y), engine.block_size(FileId::X)];
        let engine_name = engine.name();
        let bytes_written = Arc::new(AtomicU64::new(0));

        let (sender, receiver) = channel::bounded(QUEUE_DEPTH);
        let counter = Arc::clone(&bytes_written);

        let handle = std::thread::Builder::new()
            .name("disk-queue".to_string())
            .spawn(move || queue_thread(engine, receiver, counter))?;

        log::debug!(
            "disk queue started: engine={}, block sizes y={} x={}",
            engine_name,
            block_sizes[0],
            block_sizes[1]
        );

        Ok(Self {
            sender: Some(sender),
            pending: Mutex::new(Vec::with_capacity(QUEUE_DEPTH)),
            block_sizes,
            engine_name,
            bytes_written,
            handle: Some(handle),
        })
    }

    /// Storage alignment unit of `file` in bytes
    pub fn block_size(&self, file: FileId) -> usize {
        self.block_sizes[file.index()]
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine_name
    }

    /// Total bytes handed to the engine so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Stage a per-bucket write of `buffer`
    pub fn write_bucket_elements(
        &self,
        file: FileId,
        buffer: &Arc<AlignedBuffer>,
        counts: &Arc<ElementCounts>,
        stride: usize,
    ) {
        self.pending.lock().push(Command::WriteBuckets {
            file,
            buffer: Arc::clone(buffer),
            counts: Arc::clone(counts),
            stride,
        });
    }

    /// Stage a fence signal behind every previously staged command
    pub fn signal_fence(&self, fence: &Arc<Fence>, value: u64) {
        self.pending.lock().push(Command::SignalFence {
            fence: Arc::clone(fence),
            value,
        });
    }

    /// Hand all staged commands to the queue thread
    pub fn commit_commands(&self) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(F1Error::QueueClosed)?;
        let mut pending = self.pending.lock();

        for command in pending.drain(..) {
            sender.send(command).map_err(|_| F1Error::QueueClosed)?;
        }

        Ok(())
    }

    /// Stop the queue thread after it drains, flushing the engine
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.sender.take();

        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("disk queue thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for DiskQueue {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("disk queue shutdown failed: {:#}", err);
        }
    }
}

fn queue_thread(
    mut engine: Box<dyn BucketEngine>,
    receiver: Receiver<Command>,
    bytes_written: Arc<AtomicU64>,
) -> Result<()> {
    let mut failure: Option<String> = None;

    for command in receiver.iter() {
        match command {
            Command::WriteBuckets { file, buffer, counts, stride } => {
                if failure.is_some() {
                    continue;
                }

                if let Err(err) = write_buckets(engine.as_mut(), file, &buffer, &counts, stride, &bytes_written) {
                    log::error!("disk queue write failed: {:#}", err);
                    failure = Some(format!("{:#}", err));
                }
            }
            Command::SignalFence { fence, value } => match &failure {
                Some(message) => fence.fail(message.clone()),
                None => fence.signal(value),
            },
        }
    }

    if let Some(message) = failure {
        anyhow::bail!("disk queue failed: {}", message);
    }

    engine.flush()
}

fn write_buckets(
    engine: &mut dyn BucketEngine,
    file: FileId,
    buffer: &AlignedBuffer,
    counts: &ElementCounts,
    stride: usize,
    bytes_written: &AtomicU64,
) -> Result<()> {
    for bucket in 0..counts.len() {
        let count = counts.get(bucket) as usize;
        if count == 0 {
            continue;
        }

        // SAFETY: the producer does not touch this buffer again until the
        // fence behind this command has been signalled.
        let bytes = unsafe { buffer.bytes(bucket * stride, count) };
        engine.write_bucket(file, bucket as u32, bytes)?;
        bytes_written.fetch_add(bytes.len() as u64, Ordering::Relaxed);
    }

    Ok(())
}
