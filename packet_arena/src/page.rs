//! Arena pages and the page allocators that supply them

use crate::ArenaError;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment of every page base address
pub const PAGE_ALIGN: usize = 8;

/// Default page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 2 << 10;

/// A raw block of page memory handed out by a [`PageAllocator`]
#[derive(Debug)]
pub struct PageBlock {
    ptr: NonNull<u8>,
    size: usize,
    zeroed: bool,
}

impl PageBlock {
    /// Wraps a raw block.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `size` bytes, aligned to
    /// [`PAGE_ALIGN`], initialized, and exclusively owned by this block until
    /// it is returned to the allocator that produced it.
    pub unsafe fn from_raw(ptr: NonNull<u8>, size: usize) -> Self {
        Self {
            ptr,
            size,
            zeroed: false,
        }
    }

    /// Wraps a raw block whose bytes are all zero.
    ///
    /// The arena skips zeroing such a block until its bytes have been handed
    /// out once, so untouched pages are never written by the arena itself.
    ///
    /// # Safety
    ///
    /// As for [`PageBlock::from_raw`], and every byte must be zero.
    pub unsafe fn from_zeroed_raw(ptr: NonNull<u8>, size: usize) -> Self {
        Self {
            ptr,
            size,
            zeroed: true,
        }
    }

    /// Base address of the block
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size of the block in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Checks if the block was handed over all-zero
    pub fn is_zeroed(&self) -> bool {
        self.zeroed
    }
}

/// Source of arena pages
///
/// Failure to produce a page is fatal to the owning session; the arena
/// never retries.
pub trait PageAllocator {
    /// Returns a block of at least `min_size` bytes
    fn allocate(&mut self, min_size: usize) -> Result<PageBlock, ArenaError>;

    /// Returns a block previously produced by [`PageAllocator::allocate`]
    fn deallocate(&mut self, block: PageBlock);
}

/// Page allocator backed by the global allocator
///
/// Blocks are whole multiples of the page size. An optional limit caps the
/// total bytes outstanding, which is how a memory-constrained target is
/// modelled on a host.
#[derive(Debug)]
pub struct HeapPageAllocator {
    page_size: usize,
    limit: Option<usize>,
    outstanding: usize,
}

impl HeapPageAllocator {
    /// Creates an allocator with the given page size
    ///
    /// The page size is rounded up to a multiple of [`PAGE_ALIGN`].
    pub fn new(page_size: usize) -> Self {
        let page_size = page_size.max(PAGE_ALIGN);
        let page_size = (page_size + PAGE_ALIGN - 1) & !(PAGE_ALIGN - 1);
        Self {
            page_size,
            limit: None,
            outstanding: 0,
        }
    }

    /// Caps the total number of bytes this allocator may hand out
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Page size in bytes
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Bytes currently handed out
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl Default for HeapPageAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl PageAllocator for HeapPageAllocator {
    fn allocate(&mut self, min_size: usize) -> Result<PageBlock, ArenaError> {
        let npages = min_size.div_ceil(self.page_size).max(1);
        let size = npages
            .checked_mul(self.page_size)
            .ok_or(ArenaError::SizeOverflow)?;

        if let Some(limit) = self.limit {
            if self.outstanding.saturating_add(size) > limit {
                return Err(ArenaError::PageAllocation {
                    requested: size,
                    reason: format!(
                        "limit of {} bytes reached ({} outstanding)",
                        limit, self.outstanding
                    ),
                });
            }
        }

        let layout =
            Layout::from_size_align(size, PAGE_ALIGN).map_err(|err| ArenaError::PageAllocation {
                requested: size,
                reason: err.to_string(),
            })?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| ArenaError::PageAllocation {
            requested: size,
            reason: "global allocator returned null".to_string(),
        })?;

        self.outstanding += size;
        // SAFETY: freshly allocated, zeroed, PAGE_ALIGN aligned, `size` bytes.
        Ok(unsafe { PageBlock::from_zeroed_raw(ptr, size) })
    }

    fn deallocate(&mut self, block: PageBlock) {
        // The layout was valid when the block was allocated.
        if let Ok(layout) = Layout::from_size_align(block.size, PAGE_ALIGN) {
            // SAFETY: the block came from `allocate` with this same layout.
            unsafe { alloc::dealloc(block.as_ptr(), layout) };
        }
        self.outstanding = self.outstanding.saturating_sub(block.size);
    }
}

/// Bookkeeping for one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Total capacity in bytes
    pub size: usize,
    /// Bytes consumed so far
    pub offset: usize,
}

/// A bump allocation inside a page
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bump {
    pub(crate) ptr: NonNull<u8>,
    /// Leading bytes that may hold stale data; the rest are known zero
    pub(crate) dirty: usize,
}

/// A page in the arena chain
#[derive(Debug)]
pub(crate) struct Page {
    block: PageBlock,
    header: PageHeader,
    /// Every byte from here to the end of the block is still zero
    clean_from: usize,
}

impl Page {
    pub(crate) fn new(block: PageBlock) -> Self {
        let header = PageHeader {
            size: block.size(),
            offset: 0,
        };
        let clean_from = if block.is_zeroed() { 0 } else { block.size() };
        Self {
            block,
            header,
            clean_from,
        }
    }

    pub(crate) fn header(&self) -> PageHeader {
        self.header
    }

    pub(crate) fn reset(&mut self) {
        self.header.offset = 0;
    }

    pub(crate) fn into_block(self) -> PageBlock {
        self.block
    }

    /// Carves `size` bytes aligned to `align` out of the remaining space.
    ///
    /// `align` must be a power of two no larger than [`PAGE_ALIGN`].
    /// Bytes at or past `clean_from` have never been handed out, so only
    /// the part of the allocation below it is reported dirty.
    pub(crate) fn bump(&mut self, size: usize, align: usize) -> Option<Bump> {
        let start = self.header.offset.checked_add(align - 1)? & !(align - 1);
        let end = start.checked_add(size)?;
        if end > self.header.size {
            return None;
        }
        self.header.offset = end;
        let dirty = self.clean_from.saturating_sub(start).min(size);
        self.clean_from = self.clean_from.max(end);
        // SAFETY: start < end <= size, so the pointer stays inside the block.
        let ptr = NonNull::new(unsafe { self.block.as_ptr().add(start) })?;
        Some(Bump { ptr, dirty })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_allocator_rounds_to_pages() {
        let mut allocator = HeapPageAllocator::new(256);
        let block = allocator.allocate(300).unwrap();
        assert_eq!(block.size(), 512);
        assert_eq!(block.as_ptr() as usize % PAGE_ALIGN, 0);
        assert_eq!(allocator.outstanding(), 512);
        allocator.deallocate(block);
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn test_heap_allocator_limit() {
        let mut allocator = HeapPageAllocator::new(256).with_limit(512);
        let first = allocator.allocate(256).unwrap();
        let second = allocator.allocate(256).unwrap();
        let err = allocator.allocate(1).unwrap_err();
        assert!(matches!(err, ArenaError::PageAllocation { requested: 256, .. }));
        allocator.deallocate(first);
        allocator.deallocate(second);
    }

    #[test]
    fn test_page_size_is_aligned() {
        assert_eq!(HeapPageAllocator::new(0).page_size(), PAGE_ALIGN);
        assert_eq!(HeapPageAllocator::new(13).page_size(), 16);
        assert_eq!(HeapPageAllocator::default().page_size(), 2048);
    }

    #[test]
    fn test_bump_respects_alignment_and_capacity() {
        let mut allocator = HeapPageAllocator::new(64);
        let mut page = Page::new(allocator.allocate(64).unwrap());
        let base = page.block.as_ptr() as usize;

        let a = page.bump(3, 1).unwrap();
        assert_eq!(a.ptr.as_ptr() as usize, base);
        let b = page.bump(8, 8).unwrap();
        assert_eq!(b.ptr.as_ptr() as usize, base + 8);
        assert_eq!(page.header().offset, 16);

        assert!(page.bump(49, 1).is_none());
        assert_eq!(page.header().offset, 16);
        assert!(page.bump(48, 1).is_some());

        allocator.deallocate(page.into_block());
    }

    #[test]
    fn test_fresh_page_bytes_are_clean_until_reused() {
        let mut allocator = HeapPageAllocator::new(64);
        let mut page = Page::new(allocator.allocate(64).unwrap());

        assert_eq!(page.bump(16, 1).unwrap().dirty, 0);
        assert_eq!(page.bump(8, 8).unwrap().dirty, 0);

        page.reset();
        // The first 24 bytes were handed out; the next 8 never were.
        assert_eq!(page.bump(32, 1).unwrap().dirty, 24);
        assert_eq!(page.bump(8, 1).unwrap().dirty, 0);

        allocator.deallocate(page.into_block());
    }

    #[test]
    fn test_unzeroed_block_is_dirty() {
        let mut allocator = HeapPageAllocator::new(64);
        let block = allocator.allocate(64).unwrap();
        // SAFETY: same memory, same size; only the zeroed claim is dropped.
        let block = unsafe { PageBlock::from_raw(NonNull::new(block.as_ptr()).unwrap(), 64) };
        let mut page = Page::new(block);

        assert_eq!(page.bump(10, 1).unwrap().dirty, 10);
        allocator.deallocate(page.into_block());
    }
}
