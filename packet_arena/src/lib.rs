//! # Packet Arena
//!
//! A page-based bump allocator for request-scoped data.
//!
//! ## Philosophy
//!
//! - **Bulk reclaim**: nothing is freed individually; [`Arena::recycle`]
//!   resets every page between requests and keeps the pages for reuse
//! - **Borrow-checked lifetime**: allocations borrow the arena immutably and
//!   recycling needs `&mut`, so no allocation can outlive the request that
//!   made it
//! - **Pluggable pages**: pages come from a [`PageAllocator`], so a target
//!   with a fixed memory budget can supply its own
//!
//! ## Key Types
//!
//! - [`Arena`]: the allocator
//! - [`PageAllocator`] / [`HeapPageAllocator`]: page sources
//! - [`ArenaStats`]: page count, capacity and bytes in use
//! - [`ArenaError`]: page acquisition and layout failures

pub mod page;

pub use page::{
    HeapPageAllocator, PageAllocator, PageBlock, PageHeader, DEFAULT_PAGE_SIZE, PAGE_ALIGN,
};

use page::{Bump, Page};
use std::cell::RefCell;
use std::mem;
use std::ptr::NonNull;
use std::slice;
use thiserror::Error;

/// Arena failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("page allocation of {requested} bytes failed: {reason}")]
    PageAllocation { requested: usize, reason: String },

    #[error("alignment {align} exceeds page alignment {PAGE_ALIGN}")]
    Alignment { align: usize },

    #[error("allocation size overflow")]
    SizeOverflow,
}

/// Types whose all-zero bit pattern is a valid value
///
/// # Safety
///
/// Implementors must be `Copy`, have no padding-dependent invariants and be
/// valid when every byte is zero.
pub unsafe trait Plain: Copy {}

macro_rules! impl_plain {
    ($($ty:ty),*) => {
        $(unsafe impl Plain for $ty {})*
    };
}

impl_plain!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize, f32, f64);

/// Snapshot of arena usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    /// Pages currently in the active chain
    pub active_pages: usize,
    /// Pages waiting on the free list
    pub free_pages: usize,
    /// Total bytes owned across both lists
    pub capacity: usize,
    /// Bytes consumed in active pages, including alignment padding
    pub in_use: usize,
}

struct ArenaState<A> {
    allocator: A,
    /// Head is the last element
    active: Vec<Page>,
    /// Head is the last element
    free: Vec<Page>,
}

impl<A: PageAllocator> ArenaState<A> {
    fn acquire_page(&mut self, min_size: usize) -> Result<(), ArenaError> {
        let reusable = matches!(self.free.last(), Some(page) if page.header().size >= min_size);
        let page = match reusable.then(|| self.free.pop()).flatten() {
            Some(page) => page,
            None => {
                let block = self.allocator.allocate(min_size)?;
                log::debug!("arena: new page of {} bytes", block.size());
                Page::new(block)
            }
        };
        self.active.push(page);
        Ok(())
    }

    fn alloc_raw(&mut self, size: usize, align: usize) -> Result<Bump, ArenaError> {
        if let Some(bump) = self.active.last_mut().and_then(|head| head.bump(size, align)) {
            return Ok(bump);
        }

        // Page bases are PAGE_ALIGN aligned, so a fresh page fits `size`.
        self.acquire_page(size)?;
        self.active
            .last_mut()
            .and_then(|head| head.bump(size, align))
            .ok_or(ArenaError::SizeOverflow)
    }

    fn release(&mut self) {
        for page in self.active.drain(..).chain(self.free.drain(..)) {
            self.allocator.deallocate(page.into_block());
        }
    }
}

/// Page-based bump allocator
///
/// Allocation takes `&self` and hands out `&mut` slices into page memory.
/// The slices stay valid until the next [`Arena::recycle`] or
/// [`Arena::release`], both of which need exclusive access.
pub struct Arena<A: PageAllocator = HeapPageAllocator> {
    state: RefCell<ArenaState<A>>,
}

impl Arena<HeapPageAllocator> {
    /// Creates an arena over heap pages of `page_size` bytes
    pub fn with_page_size(page_size: usize) -> Self {
        Self::new(HeapPageAllocator::new(page_size))
    }
}

impl Default for Arena<HeapPageAllocator> {
    fn default() -> Self {
        Self::new(HeapPageAllocator::default())
    }
}

impl<A: PageAllocator> Arena<A> {
    /// Creates an empty arena; no page is acquired until the first allocation
    pub fn new(allocator: A) -> Self {
        Self {
            state: RefCell::new(ArenaState {
                allocator,
                active: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    /// Returns the allocation and how many of its leading bytes may be
    /// nonzero
    fn alloc_uninit<T>(&self, count: usize) -> Result<(NonNull<T>, usize), ArenaError> {
        let align = mem::align_of::<T>();
        if align > PAGE_ALIGN {
            return Err(ArenaError::Alignment { align });
        }
        let size = mem::size_of::<T>()
            .checked_mul(count)
            .ok_or(ArenaError::SizeOverflow)?;
        if size == 0 {
            return Ok((NonNull::dangling(), 0));
        }
        let bump = self.state.borrow_mut().alloc_raw(size, align)?;
        Ok((bump.ptr.cast(), bump.dirty))
    }

    /// Allocates `count` zeroed elements
    ///
    /// Only bytes a previous request may have written are cleared. Memory
    /// that is still zero from the page allocator is left untouched, so a
    /// large buffer is not committed before it is filled.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice<T: Plain>(&self, count: usize) -> Result<&mut [T], ArenaError> {
        let (ptr, dirty) = self.alloc_uninit::<T>(count)?;
        // SAFETY: `ptr` covers `count` elements of fresh arena memory that no
        // other slice aliases. Bytes past `dirty` are already zero, and zero
        // is a valid `T` because `T: Plain`.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr().cast::<u8>(), 0, dirty);
            Ok(slice::from_raw_parts_mut(ptr.as_ptr(), count))
        }
    }

    /// Allocates `count` copies of `value`
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_filled<T: Copy>(&self, count: usize, value: T) -> Result<&mut [T], ArenaError> {
        let (ptr, _) = self.alloc_uninit::<T>(count)?;
        // SAFETY: as in `alloc_slice`; every element is written before the
        // slice is formed.
        unsafe {
            for i in 0..count {
                ptr.as_ptr().add(i).write(value);
            }
            Ok(slice::from_raw_parts_mut(ptr.as_ptr(), count))
        }
    }

    /// Copies a string into the arena
    pub fn alloc_str(&self, text: &str) -> Result<&str, ArenaError> {
        let bytes = self.alloc_slice::<u8>(text.len())?;
        bytes.copy_from_slice(text.as_bytes());
        // SAFETY: the bytes were copied verbatim from a `str`.
        Ok(unsafe { std::str::from_utf8_unchecked(bytes) })
    }

    /// Resets every page and moves it to the free list
    ///
    /// Pages are kept. Calling this twice in a row is a no-op the second
    /// time.
    pub fn recycle(&mut self) {
        let state = self.state.get_mut();
        while let Some(mut page) = state.active.pop() {
            page.reset();
            state.free.push(page);
        }
    }

    /// Returns every page to the page allocator
    pub fn release(&mut self) {
        self.state.get_mut().release();
    }

    /// Current usage snapshot
    pub fn stats(&self) -> ArenaStats {
        let state = self.state.borrow();
        let mut stats = ArenaStats {
            active_pages: state.active.len(),
            free_pages: state.free.len(),
            ..ArenaStats::default()
        };
        for page in state.active.iter() {
            stats.capacity += page.header().size;
            stats.in_use += page.header().offset;
        }
        for page in state.free.iter() {
            stats.capacity += page.header().size;
            stats.in_use += page.header().offset;
        }
        stats
    }

    /// Headers of active pages then free pages, heads last
    pub fn page_headers(&self) -> Vec<PageHeader> {
        let state = self.state.borrow();
        state
            .active
            .iter()
            .chain(state.free.iter())
            .map(Page::header)
            .collect()
    }
}

impl<A: PageAllocator> Drop for Arena<A> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_arena_has_no_pages() {
        let arena: Arena = Arena::default();
        assert_eq!(arena.stats(), ArenaStats::default());
    }

    #[test]
    fn test_alloc_slice_is_zeroed() {
        let arena = Arena::with_page_size(64);
        let values = arena.alloc_slice::<u32>(4).unwrap();
        assert_eq!(values, &[0, 0, 0, 0]);
        values[1] = 7;
        assert_eq!(values[1], 7);
    }

    #[test]
    fn test_allocations_do_not_overlap() {
        let arena = Arena::with_page_size(64);
        let a = arena.alloc_filled(8, 0xAAu8).unwrap();
        let b = arena.alloc_filled(2, 0x1122_3344_5566_7788u64).unwrap();
        assert!(a.iter().all(|&byte| byte == 0xAA));
        assert_eq!(b, &[0x1122_3344_5566_7788, 0x1122_3344_5566_7788]);
        assert_eq!(b.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_spill_to_new_page() {
        let arena = Arena::with_page_size(32);
        arena.alloc_slice::<u8>(24).unwrap();
        arena.alloc_slice::<u8>(24).unwrap();
        let stats = arena.stats();
        assert_eq!(stats.active_pages, 2);
        assert_eq!(stats.capacity, 64);
        assert_eq!(stats.in_use, 48);
    }

    #[test]
    fn test_oversized_request_gets_whole_pages() {
        let arena = Arena::with_page_size(32);
        let big = arena.alloc_slice::<u8>(100).unwrap();
        assert_eq!(big.len(), 100);
        assert_eq!(arena.stats().capacity, 128);
    }

    #[test]
    fn test_recycle_reuses_pages() {
        let mut arena = Arena::with_page_size(32);
        arena.alloc_slice::<u8>(20).unwrap();
        arena.alloc_slice::<u8>(20).unwrap();
        let before = arena.stats().capacity;

        arena.recycle();
        let stats = arena.stats();
        assert_eq!(stats.active_pages, 0);
        assert_eq!(stats.free_pages, 2);
        assert_eq!(stats.capacity, before);
        assert_eq!(stats.in_use, 0);

        arena.alloc_slice::<u8>(20).unwrap();
        assert_eq!(arena.stats().capacity, before);
    }

    #[test]
    fn test_double_recycle_is_stable() {
        let mut arena = Arena::with_page_size(64);
        arena.alloc_str("hello").unwrap();
        arena.alloc_slice::<i64>(20).unwrap();

        arena.recycle();
        let first = arena.stats();
        arena.recycle();
        let second = arena.stats();

        assert_eq!(first, second);
        assert!(arena.page_headers().iter().all(|h| h.offset == 0));
    }

    #[test]
    fn test_release_frees_everything() {
        let mut arena = Arena::with_page_size(32);
        arena.alloc_slice::<u8>(10).unwrap();
        arena.recycle();
        arena.alloc_slice::<u8>(50).unwrap();
        arena.release();
        assert_eq!(arena.stats(), ArenaStats::default());
    }

    #[test]
    fn test_limit_exhaustion() {
        let arena = Arena::new(HeapPageAllocator::new(32).with_limit(64));
        arena.alloc_slice::<u8>(32).unwrap();
        arena.alloc_slice::<u8>(32).unwrap();
        let err = arena.alloc_slice::<u8>(1).unwrap_err();
        assert!(matches!(err, ArenaError::PageAllocation { .. }));
    }

    #[test]
    fn test_alignment_too_large() {
        #[derive(Clone, Copy, Debug)]
        #[repr(align(16))]
        struct Wide(#[allow(dead_code)] u8);

        let arena: Arena = Arena::default();
        let err = arena.alloc_filled(1, Wide(0)).unwrap_err();
        assert_eq!(err, ArenaError::Alignment { align: 16 });
    }

    #[test]
    fn test_zero_length_allocations() {
        let arena: Arena = Arena::default();
        assert!(arena.alloc_slice::<u64>(0).unwrap().is_empty());
        assert_eq!(arena.alloc_str("").unwrap(), "");
        assert_eq!(arena.stats().active_pages, 0);
    }

    /// Hands out sentinel-filled blocks that claim to be zeroed, so any
    /// write the arena makes to a fresh page shows up
    struct SentinelPages;

    impl PageAllocator for SentinelPages {
        fn allocate(&mut self, min_size: usize) -> Result<PageBlock, ArenaError> {
            let layout = std::alloc::Layout::from_size_align(min_size.max(1), PAGE_ALIGN).unwrap();
            // SAFETY: non-zero size; every byte is written before use.
            let ptr = NonNull::new(unsafe { std::alloc::alloc(layout) }).unwrap();
            unsafe {
                ptr.as_ptr().write_bytes(0x5A, layout.size());
                Ok(PageBlock::from_zeroed_raw(ptr, layout.size()))
            }
        }

        fn deallocate(&mut self, block: PageBlock) {
            let layout = std::alloc::Layout::from_size_align(block.size(), PAGE_ALIGN).unwrap();
            // SAFETY: same layout as in `allocate`.
            unsafe { std::alloc::dealloc(block.as_ptr(), layout) };
        }
    }

    #[test]
    fn test_fresh_pages_are_not_rewritten() {
        let mut arena = Arena::new(SentinelPages);
        let bytes = arena.alloc_slice::<u8>(64).unwrap();
        assert!(bytes.iter().all(|&b| b == 0x5A));

        arena.recycle();
        let bytes = arena.alloc_slice::<u8>(64).unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_recycled_bytes_are_zeroed() {
        let mut arena = Arena::with_page_size(64);
        arena.alloc_filled(40, 0xAAu8).unwrap();
        arena.recycle();

        let values = arena.alloc_slice::<u64>(8).unwrap();
        assert_eq!(values, &[0; 8]);
    }

    #[test]
    fn test_alloc_str() {
        let arena: Arena = Arena::default();
        let text = arena.alloc_str("minrpc").unwrap();
        assert_eq!(text, "minrpc");
    }
}
