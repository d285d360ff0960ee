//! Block-aligned word buffers
//!
//! Staging arrays are written concurrently by every worker (each into its own
//! disjoint range) and then read by the I/O thread while the workers move on
//! to the other slot. Neither side holds a Rust reference to the whole array,
//! so the buffer hands out raw, position-addressed access instead.

use std::alloc::{alloc_zeroed, dealloc, Layout};

/// Zero-initialized, block-aligned array of `u32` words
///
/// The alignment is the storage block size so that bucket regions starting
/// on a block boundary stay block-aligned in memory too.
pub struct AlignedBuffer {
    ptr: *mut u32,
    len: usize,
    alignment: usize,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate `len` zeroed words aligned to `alignment` bytes
    ///
    /// # Panics
    /// Panics if alignment is not a power of 2 or if allocation fails
    pub fn new(len: usize, alignment: usize) -> Self {
        assert!(alignment.is_power_of_two(), "Alignment must be a power of 2");
        assert!(len > 0, "Buffer length must be greater than 0");

        let alignment = alignment.max(std::mem::align_of::<u32>());
        let layout = Layout::from_size_align(len * std::mem::size_of::<u32>(), alignment)
            .expect("Invalid layout parameters");

        let ptr = unsafe { alloc_zeroed(layout) } as *mut u32;
        if ptr.is_null() {
            std::alloc::handle_alloc_error(layout);
        }

        AlignedBuffer {
            ptr,
            len,
            alignment,
            layout,
        }
    }

    /// Length in words
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes
    #[inline(always)]
    pub fn size_bytes(&self) -> usize {
        self.layout.size()
    }

    #[inline(always)]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline(always)]
    pub fn is_aligned(&self) -> bool {
        (self.ptr as usize) % self.alignment == 0
    }

    /// Store `value` at word `index`
    ///
    /// # Safety
    /// `index < self.len()`, and no other thread may read or write the same
    /// index concurrently.
    #[inline(always)]
    pub unsafe fn write(&self, index: usize, value: u32) {
        debug_assert!(index < self.len, "write at {} past end {}", index, self.len);
        self.ptr.add(index).write(value);
    }

    /// Read the word at `index`
    ///
    /// # Safety
    /// `index < self.len()`, and no thread may be writing the same index.
    #[inline(always)]
    pub unsafe fn read(&self, index: usize) -> u32 {
        debug_assert!(index < self.len);
        self.ptr.add(index).read()
    }

    /// Borrow `count` words starting at `start` as bytes
    ///
    /// # Safety
    /// The range must be in bounds and must not be written while the returned
    /// slice is alive.
    #[inline]
    pub unsafe fn bytes(&self, start: usize, count: usize) -> &[u8] {
        assert!(start + count <= self.len, "byte view out of bounds");
        std::slice::from_raw_parts(
            self.ptr.add(start) as *const u8,
            count * std::mem::size_of::<u32>(),
        )
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.ptr as *mut u8, self.layout);
        }
    }
}

// AlignedBuffer owns its memory. Concurrent access goes through the unsafe
// accessors whose callers partition the index space (scatter cursors) or
// order access with fences (I/O thread).
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

/// Round `value` up to the next multiple of `boundary`
#[inline]
pub fn round_up(value: u64, boundary: u64) -> u64 {
    debug_assert!(boundary > 0);
    value.div_ceil(boundary) * boundary
}
