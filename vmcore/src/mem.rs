//! Low-level allocation helpers.
//!
//! The hash layout primitive needs a single allocation sized and aligned by
//! hand (see [`crate::hash::layout`]); these are thin, panic-on-OOM wrappers
//! over the global allocator, the same shape as a conventional Rust
//! hand-rolled-layout data structure's internal allocation helpers.

use std::alloc::{self, Layout};

/// Allocate `layout`, zeroed. Panics if the allocator returns an error.
#[inline]
pub(crate) unsafe fn alloc_zeroed(layout: Layout) -> *mut u8 {
    let ptr = alloc::alloc_zeroed(layout);
    assert!(!ptr.is_null(), "allocation failed for layout {layout:?}");
    ptr
}

/// Deallocate a block previously obtained from [`alloc_zeroed`].
#[inline]
pub(crate) unsafe fn dealloc(ptr: *mut u8, layout: Layout) {
    alloc::dealloc(ptr, layout)
}
