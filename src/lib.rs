//! f1plot - bounded first-table generation for disk-based proof-of-space plots
//!
//! Generates the `2^k` entries of a plot's first table from a ChaCha8
//! keystream keyed by the plot id, partitions them into destination buckets
//! across a pool of worker threads, and streams every bucket to storage
//! through an ordered asynchronous write queue.
//!
//! # Architecture
//!
//! - **Keystream**: ChaCha8 keyed by the plot id, one block per 16 entries
//! - **Workers**: lock-step job group with barrier prefix sums
//! - **Double buffering**: two staging slots gated by write fences
//! - **Disk queue**: a single writer thread draining ordered commands
//! - **Verification**: parallel read-back of every bucket file

pub mod config;
pub mod engine;
pub mod error;
pub mod f1;
pub mod keystream;
pub mod output;
pub mod queue;
pub mod stats;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use engine::BucketEngine;
pub use error::F1Error;
pub use f1::{F1Generator, F1Layout, F1Report};
pub use queue::DiskQueue;

/// Result type used throughout f1plot
pub type Result<T> = anyhow::Result<T>;
