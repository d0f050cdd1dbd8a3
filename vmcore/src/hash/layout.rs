//! The hash layout primitive (C1).
//!
//! Each table owns a single heap allocation split into two halves around an
//! implicit pivot: a reverse-indexed entry view (logical index `0` sits
//! closest to the pivot, logical index `N-1` sits at the start of the
//! allocation) and a forward-indexed metadata view (logical index `0` sits
//! closest to the pivot, `N-1` farthest). This is the idiomatic-Rust
//! rendering of the "entries grow left, metadata grows right" pointer
//! arithmetic described in the design notes: one owned buffer, two typed
//! views, the pivot implicit in the split between them.
//!
//! Metadata byte `0` means empty; `k >= 1` means occupied with probe
//! distance `k - 1`. Two sentinel bytes of value `1` flank the live
//! metadata range so iteration never needs a bounds check on the forward
//! edge.

use crate::{config::TableTunables, mem};
use std::{alloc::Layout, marker::PhantomData, mem::size_of, ptr::NonNull};

/// A single contiguous allocation holding `n` reverse-indexed entries of
/// type `E` and `n + 2` forward-indexed metadata bytes (including the two
/// sentinels).
pub(crate) struct RawTable<E> {
    buf: NonNull<u8>,
    layout: Layout,
    official_size: u32,
    probe_overflow: u32,
    n: u32,
    key_right_shift: u32,
    cur_items: u32,
    max_items: u32,
    _marker: PhantomData<E>,
}

impl<E> RawTable<E> {
    /// Build a table sized for at least `requested_capacity` live items,
    /// whose hash values are `hash_width_bits` wide, with load factor and
    /// probe-distance cap taken from `tunables`.
    pub(crate) fn build(requested_capacity: usize, hash_width_bits: u32, tunables: TableTunables) -> Self {
        let official_size = next_pow2(requested_capacity.max(1)).max(8);
        let max_items = (official_size * tunables.load_factor_num) / tunables.load_factor_den;
        let probe_overflow = max_items.saturating_sub(1).min(tunables.max_probe_distance as u32 - 1);
        let n = official_size + probe_overflow;
        let key_right_shift = hash_width_bits - official_size.trailing_zeros();

        let entries_len = n as usize * size_of::<E>();
        let meta_len = n as usize + 2;
        let total_len = entries_len + meta_len;
        let layout = Layout::from_size_align(total_len, size_of::<E>().max(1))
            .expect("hash table layout overflow");

        let buf = unsafe { NonNull::new_unchecked(mem::alloc_zeroed(layout)) };
        let mut table = Self {
            buf,
            layout,
            official_size,
            probe_overflow,
            n,
            key_right_shift,
            cur_items: 0,
            max_items,
            _marker: PhantomData,
        };
        // SAFETY: buf is freshly allocated and zeroed; writing the sentinels
        // at the two flanking positions is in-bounds by construction.
        unsafe {
            table.set_meta_raw(table.entries_len(), 1);
            table.set_meta_raw(table.entries_len() + meta_len - 1, 1);
        }
        log::trace!(
            "hash table built: official_size={} probe_overflow={} n={}",
            official_size,
            probe_overflow,
            n
        );
        table
    }

    #[inline]
    fn entries_len(&self) -> usize {
        self.n as usize * size_of::<E>()
    }

    #[inline]
    pub(crate) fn official_size(&self) -> u32 {
        self.official_size
    }

    #[inline]
    pub(crate) fn n(&self) -> u32 {
        self.n
    }

    #[inline]
    pub(crate) fn key_right_shift(&self) -> u32 {
        self.key_right_shift
    }

    #[inline]
    pub(crate) fn cur_items(&self) -> u32 {
        self.cur_items
    }

    #[inline]
    pub(crate) fn max_items(&self) -> u32 {
        self.max_items
    }

    #[inline]
    pub(crate) fn incr_cur_items(&mut self) {
        self.cur_items += 1;
    }

    #[inline]
    pub(crate) fn decr_cur_items(&mut self) {
        self.cur_items -= 1;
    }

    /// The deferred-resize tripwire: forces the next lvalue-fetch to grow
    /// before inserting, even though `cur_items` alone wouldn't demand it.
    #[inline]
    pub(crate) fn trip_resize(&mut self) {
        self.max_items = 0;
    }

    /// Read metadata byte at logical index `i` in `0..n`.
    #[inline]
    pub(crate) fn meta(&self, i: u32) -> u8 {
        debug_assert!(i < self.n, "metadata index {i} out of bounds (n={})", self.n);
        unsafe { *self.buf.as_ptr().add(self.entries_len() + 1 + i as usize) }
    }

    #[inline]
    pub(crate) fn set_meta(&mut self, i: u32, v: u8) {
        debug_assert!(i < self.n, "metadata index {i} out of bounds (n={})", self.n);
        unsafe { self.set_meta_raw(self.entries_len() + 1 + i as usize, v) }
    }

    #[inline]
    unsafe fn set_meta_raw(&mut self, byte_offset: usize, v: u8) {
        *self.buf.as_ptr().add(byte_offset) = v;
    }

    /// Pointer to the entry slot at logical index `i`. Entries are
    /// reverse-indexed: index `0` sits at the end of the entries region
    /// (closest to the pivot), index `n - 1` at the start.
    #[inline]
    fn entry_ptr(&self, i: u32) -> *mut E {
        debug_assert!(i < self.n, "entry index {i} out of bounds (n={})", self.n);
        let slot = self.n - 1 - i;
        unsafe { self.buf.as_ptr().add(slot as usize * size_of::<E>()) as *mut E }
    }

    #[inline]
    pub(crate) fn entry(&self, i: u32) -> &E {
        unsafe { &*self.entry_ptr(i) }
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, i: u32) -> &mut E {
        unsafe { &mut *self.entry_ptr(i) }
    }

    #[inline]
    pub(crate) fn write_entry(&mut self, i: u32, e: E) {
        unsafe { self.entry_ptr(i).write(e) }
    }

    /// Move entries at logical indices `[from, to)` up by one logical index
    /// (i.e. to `[from+1, to+1)`), matching a metadata run being pushed one
    /// step farther from the ideal bucket during Robin-Hood displacement.
    pub(crate) unsafe fn shift_entries_up(&mut self, from: u32, to: u32) {
        if from >= to {
            return;
        }
        let count = (to - from) as usize;
        // Source logical range [from, to) occupies *decreasing* addresses as
        // logical index increases, so the byte range is
        // [entry_ptr(to-1), entry_ptr(from) + esize). Moving every element
        // to index+1 shifts that byte range down by one entry size.
        let esize = size_of::<E>();
        let src = self.entry_ptr(to - 1) as *mut u8;
        let dst = src.sub(esize);
        std::ptr::copy(src, dst, count * esize);
    }

    /// Move entries at logical indices `[from, to)` down by one logical
    /// index (i.e. to `[from-1, to-1)`), matching delete's compaction of the
    /// trailing run toward the vacated slot.
    pub(crate) unsafe fn shift_entries_down(&mut self, from: u32, to: u32) {
        if from >= to {
            return;
        }
        let count = (to - from) as usize;
        let esize = size_of::<E>();
        let src = self.entry_ptr(to - 1) as *mut u8;
        let dst = src.add(esize);
        std::ptr::copy(src, dst, count * esize);
    }
}

impl<E> Drop for RawTable<E> {
    fn drop(&mut self) {
        unsafe { mem::dealloc(self.buf.as_ptr(), self.layout) }
    }
}

impl<E: Copy> RawTable<E> {
    /// Duplicate the whole allocation byte-for-byte. No pointer fixups are
    /// needed because every reference within the block is computed from the
    /// handle at access time, not stored absolutely (§4.1).
    pub(crate) fn shallow_copy(&self) -> Self {
        let buf = unsafe {
            let new_buf = mem::alloc_zeroed(self.layout);
            std::ptr::copy_nonoverlapping(self.buf.as_ptr(), new_buf, self.layout.size());
            NonNull::new_unchecked(new_buf)
        };
        Self {
            buf,
            layout: self.layout,
            official_size: self.official_size,
            probe_overflow: self.probe_overflow,
            n: self.n,
            key_right_shift: self.key_right_shift,
            cur_items: self.cur_items,
            max_items: self.max_items,
            _marker: PhantomData,
        }
    }
}

/// Round `x` up to the next power of two, never below `1`.
pub(crate) fn next_pow2(x: usize) -> u32 {
    if x <= 1 {
        return 1;
    }
    let bits = usize::BITS - (x - 1).leading_zeros();
    1u32 << bits
}
