//! File-backed bucket engine
//!
//! Every (destination, bucket) pair gets its own append-only file:
//!
//! ```text
//! <dir>/table1_y_bucket_0000.tmp
//! <dir>/table1_x_bucket_0000.tmp
//! ...
//! ```
//!
//! Files hold raw native-endian `u32` arrays. The concatenation of one bucket
//! file across all passes is that bucket's complete entry set.

use super::{BucketEngine, FileId};
use crate::Result;
use anyhow::Context;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Fallback alignment when the filesystem does not report a usable one
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Path of one bucket file
pub fn bucket_path(dir: &Path, file: FileId, bucket: u32) -> PathBuf {
    dir.join(format!("table1_{}_bucket_{:04}.tmp", file.name(), bucket))
}

/// Read a bucket file back as `u32` words
pub fn read_bucket(dir: &Path, file: FileId, bucket: u32) -> Result<Vec<u32>> {
    let path = bucket_path(dir, file, bucket);
    let bytes = fs::read(&path)
        .with_context(|| format!("Failed to read bucket file: {}", path.display()))?;

    if bytes.len() % 4 != 0 {
        anyhow::bail!(
            "bucket file {} has {} bytes, not a whole number of entries",
            path.display(),
            bytes.len()
        );
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Engine writing bucket files under a directory
pub struct FileEngine {
    dir: PathBuf,
    /// User-supplied block size, replaces detection when set
    block_size_override: Option<usize>,
    /// Detected or overridden block size
    block_size: usize,
    /// fsync every bucket file on flush
    sync: bool,
    num_buckets: u32,
    /// Open files, indexed `file.index() * num_buckets + bucket`
    files: Vec<File>,
}

impl FileEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            block_size_override: None,
            block_size: DEFAULT_BLOCK_SIZE,
            sync: false,
            num_buckets: 0,
            files: Vec::new(),
        }
    }

    pub fn with_block_size(mut self, block_size: Option<usize>) -> Self {
        self.block_size_override = block_size;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Detect the filesystem block size of an open file
    ///
    /// Uses `st_blksize` when it is a power of two of at least 512 bytes,
    /// otherwise falls back to [`DEFAULT_BLOCK_SIZE`].
    fn detect_block_size(file: &File) -> usize {
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::fstat(file.as_raw_fd(), &mut stat) };

        if result == 0 && stat.st_blksize > 0 {
            let blksize = stat.st_blksize as usize;
            if blksize >= 512 && blksize.is_power_of_two() {
                return blksize;
            }
        }

        DEFAULT_BLOCK_SIZE
    }
}

impl BucketEngine for FileEngine {
    fn init(&mut self, num_buckets: u32) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory: {}", self.dir.display()))?;

        self.num_buckets = num_buckets;
        self.files.clear();

        for file_id in FileId::ALL {
            for bucket in 0..num_buckets {
                let path = bucket_path(&self.dir, file_id, bucket);
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)
                    .with_context(|| format!("Failed to open bucket file: {}", path.display()))?;
                self.files.push(file);
            }
        }

        self.block_size = match self.block_size_override {
            Some(size) => size,
            None => self
                .files
                .first()
                .map(Self::detect_block_size)
                .unwrap_or(DEFAULT_BLOCK_SIZE),
        };

        log::debug!(
            "file engine: {} bucket files in {}, block size {}",
            self.files.len(),
            self.dir.display(),
            self.block_size
        );

        Ok(())
    }

    fn block_size(&self, _file: FileId) -> usize {
        self.block_size
    }

    fn write_bucket(&mut self, file: FileId, bucket: u32, data: &[u8]) -> Result<()> {
        let index = file.index() * self.num_buckets as usize + bucket as usize;
        let handle = self
            .files
            .get_mut(index)
            .ok_or_else(|| anyhow::anyhow!("bucket {} of {} is not open", bucket, file))?;

        handle.write_all(data).with_context(|| {
            format!(
                "Failed to write {} bytes to {}",
                data.len(),
                bucket_path(&self.dir, file, bucket).display()
            )
        })
    }

    fn flush(&mut self) -> Result<()> {
        if self.sync {
            for file in &self.files {
                file.sync_all().context("Failed to sync bucket file")?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
