//! `FixKeyHash`: interned-string keys whose value is a whole caller-chosen
//! record, heap-allocated and zero-initialized the first time a key is
//! fetched for writing (§4.5's lvalue-fetch-on-miss semantics).
//!
//! The table only ever stores a pointer to the record; the record's own
//! first field is expected to carry the canonical key, recovered through
//! [`FixKeyRecord`] rather than by field offset the way the reference
//! layout does it.

use crate::{
    hash::robinhood::{HashSpec, RobinHood, Slot},
    host::{StrHandle, StringHost},
};
use std::marker::PhantomData;

/// A record type usable as a `FixKeyHash` value: it can be default
/// (zero-equivalent) constructed, and it carries its own key once claimed.
pub trait FixKeyRecord: Default {
    fn key(&self) -> Option<StrHandle>;
    fn set_key(&mut self, key: StrHandle);
}

struct RawEntry<R> {
    ptr: *mut R,
}

impl<R> Clone for RawEntry<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for RawEntry<R> {}

impl<R> Default for RawEntry<R> {
    fn default() -> Self {
        Self { ptr: std::ptr::null_mut() }
    }
}

struct Spec<R>(PhantomData<R>);

impl<R: FixKeyRecord> HashSpec for Spec<R> {
    type Key = StrHandle;
    type Entry = RawEntry<R>;
    type Host<'h> = dyn StringHost + 'h;

    const INITIAL_CAPACITY: usize = 8;
    const MAX_PROBE_DISTANCE: u8 = 255;
    const HASH_WIDTH_BITS: u32 = 64;

    #[inline]
    fn hash<'h>(host: &'h (dyn StringHost + 'h), key: StrHandle) -> u64 {
        host.hash_code(key)
    }

    fn key_eq<'h>(host: &'h (dyn StringHost + 'h), entry: &RawEntry<R>, key: StrHandle) -> bool {
        let record = unsafe { &*entry.ptr };
        let ekey = record.key().expect("live fixkey entry missing key");
        if ekey == key {
            return true;
        }
        let len = host.graphemes(ekey);
        if len != host.graphemes(key) {
            return false;
        }
        host.substrings_equal(ekey, 0, len, key, 0)
    }

    fn key_of(entry: &RawEntry<R>) -> StrHandle {
        let record = unsafe { &*entry.ptr };
        record.key().expect("live fixkey entry missing key")
    }
}

/// Interned-string-keyed hash table whose values are whole heap-allocated
/// records, created on first write and never relocated afterwards.
pub struct FixKeyHash<R: FixKeyRecord> {
    engine: RobinHood<Spec<R>>,
}

impl<R: FixKeyRecord> FixKeyHash<R> {
    pub fn build() -> Self {
        Self { engine: RobinHood::build() }
    }

    pub fn len(&self) -> usize {
        self.engine.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn official_size(&self) -> usize {
        self.engine.official_size() as usize
    }

    pub fn fetch(&self, host: &dyn StringHost, key: StrHandle) -> Option<&R> {
        self.fetch_nocheck(host, key)
    }

    /// Like [`fetch`](Self::fetch); see [`IndexHash::fetch_nocheck`](super::index_hash::IndexHash::fetch_nocheck)
    /// for why the two coincide in this crate.
    pub fn fetch_nocheck(&self, host: &dyn StringHost, key: StrHandle) -> Option<&R> {
        self.engine.fetch(host, key).map(|e| unsafe { &*e.ptr })
    }

    /// Fetch the record for `key`, allocating and default-initializing a
    /// fresh one on a miss. On a miss the record comes back with its key
    /// field unset (§4.3) — the caller must fill it in before the table is
    /// probed again, exactly as the source's own doc comment demands ("DON'T
    /// FORGET to fill in the NULL key"). This also leaves room for the
    /// documented case where the caller stores a different canonical handle
    /// than the one it looked up with. The record's storage never moves once
    /// created, so returned references stay valid across later inserts into
    /// this table (though not across further calls that might invalidate the
    /// borrow through this method's own `&mut self`).
    pub fn lvalue_fetch(&mut self, host: &dyn StringHost, key: StrHandle) -> &mut R {
        match self.engine.lvalue_fetch(host, key) {
            Slot::Vacant(e) => {
                let record = Box::new(R::default());
                e.ptr = Box::into_raw(record);
                unsafe { &mut *e.ptr }
            }
            Slot::Occupied(e) => unsafe { &mut *e.ptr },
        }
    }
}

impl<R: FixKeyRecord> Drop for FixKeyHash<R> {
    fn drop(&mut self) {
        for e in self.engine.live_entries() {
            if !e.ptr.is_null() {
                unsafe { drop(Box::from_raw(e.ptr)) };
            }
        }
    }
}
