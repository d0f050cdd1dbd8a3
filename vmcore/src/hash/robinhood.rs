//! The Robin-Hood probing engine (C2), generic over a [`HashSpec`] so the
//! four specializations in `hash::{ptr_hash,index_hash,uni_hash,fixkey_hash}`
//! share one probe/insert/delete/grow implementation and only plug in their
//! own key type, entry layout, hash function, and equality check. This
//! mirrors the way the reference engine's concurrent map parameterizes over
//! a `Config` trait (see `idx::mtchm::meta`) rather than hand-duplicating the
//! probing logic per key type.

use crate::{config::TableTunables, error::oops, hash::layout::RawTable};
use std::marker::PhantomData;

/// A key type, entry layout, hash function, and equality relation for one
/// hash table specialization.
pub(crate) trait HashSpec: Sized {
    /// The query key type, handed to `fetch`/`lvalue_fetch`/etc.
    type Key: Copy;
    /// The in-table entry payload. Must round-trip through `Default` to
    /// represent "freshly claimed, not yet filled in" (mirrors the source
    /// setting `entry->key = NULL` on an open slot).
    type Entry: Copy + Default;
    /// Extra context required for hashing/equality (a string-host reference,
    /// or `()` when the key carries everything it needs, as for `PtrHash`).
    type Host<'h>: ?Sized;

    /// Initial `official_size` request at `build()`.
    const INITIAL_CAPACITY: usize;
    /// Probe-distance cap (`<= 255`).
    const MAX_PROBE_DISTANCE: u8;
    /// Bit width of the hash values this spec produces.
    const HASH_WIDTH_BITS: u32;

    /// Hash `key`, returning a value whose significant bits are the low
    /// `HASH_WIDTH_BITS` bits.
    fn hash<'h>(host: &'h Self::Host<'h>, key: Self::Key) -> u64;
    /// Whether `entry` (known occupied) matches `key`.
    fn key_eq<'h>(host: &'h Self::Host<'h>, entry: &Self::Entry, key: Self::Key) -> bool;
    /// Recover the key of a live entry, used to rehash during `grow`.
    fn key_of(entry: &Self::Entry) -> Self::Key;
}

/// Either a freshly claimed, not-yet-filled slot, or a pre-existing one.
pub(crate) enum Slot<'a, E> {
    Vacant(&'a mut E),
    Occupied(&'a mut E),
}

pub(crate) struct RobinHood<S: HashSpec> {
    table: RawTable<S::Entry>,
    tunables: TableTunables,
    _marker: PhantomData<S>,
}

impl<S: HashSpec> RobinHood<S> {
    pub(crate) fn build() -> Self {
        Self::build_with_tunables(TableTunables::with_max_probe_distance(S::MAX_PROBE_DISTANCE))
    }

    pub(crate) fn build_with_tunables(tunables: TableTunables) -> Self {
        Self {
            table: RawTable::build(S::INITIAL_CAPACITY, S::HASH_WIDTH_BITS, tunables),
            tunables,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> u32 {
        self.table.cur_items()
    }

    #[inline]
    pub(crate) fn official_size(&self) -> u32 {
        self.table.official_size()
    }

    #[inline]
    fn bucket(&self, hash: u64) -> u32 {
        (hash >> self.table.key_right_shift()) as u32
    }

    /// Walk the probe sequence for `key`, returning the logical index of the
    /// occupied match, or `None` on a definitive miss.
    fn fetch_index<'h>(&self, host: &'h S::Host<'h>, key: S::Key) -> Option<u32> {
        let hash = S::hash(host, key);
        let bucket = self.bucket(hash);
        let mut d: u32 = 1;
        let mut idx = bucket;
        loop {
            if idx >= self.table.n() {
                oops!("hash probe exceeded table bounds (idx={idx}, n={})", self.table.n());
            }
            let m = self.table.meta(idx) as u32;
            if m < d {
                return None;
            }
            if m == d && S::key_eq(host, self.table.entry(idx), key) {
                return Some(idx);
            }
            d += 1;
            idx += 1;
        }
    }

    pub(crate) fn fetch<'h>(&self, host: &'h S::Host<'h>, key: S::Key) -> Option<&S::Entry> {
        self.fetch_index(host, key).map(|i| self.table.entry(i))
    }

    /// Insert-or-fetch: returns the occupied slot if `key` is already
    /// present, or a freshly claimed vacant one (growing the table first if
    /// at capacity and the key is genuinely new).
    pub(crate) fn lvalue_fetch<'h>(&mut self, host: &'h S::Host<'h>, key: S::Key) -> Slot<'_, S::Entry> {
        if self.table.cur_items() >= self.table.max_items() {
            match self.fetch_index(host, key) {
                Some(idx) => return Slot::Occupied(self.table.entry_mut(idx)),
                None => self.grow(host),
            }
        }
        self.insert_internal(host, key)
    }

    /// The probe/claim loop shared by `lvalue_fetch` and `grow`'s
    /// re-insertion pass. Assumes the caller has already ensured
    /// `cur_items < max_items` — unlike the public entry points, this never
    /// triggers a resize itself (resizing mid-reinsertion would invalidate
    /// the very iteration `grow` is performing).
    fn insert_internal<'h>(&mut self, host: &'h S::Host<'h>, key: S::Key) -> Slot<'_, S::Entry> {
        if self.table.cur_items() >= self.table.max_items() {
            oops!("attempted to insert without available capacity (recursive grow?)");
        }
        let hash = S::hash(host, key);
        let bucket = self.bucket(hash);
        let mut d: u32 = 1;
        let mut idx = bucket;
        loop {
            if idx >= self.table.n() {
                oops!("hash probe exceeded table bounds (idx={idx}, n={})", self.table.n());
            }
            let m = self.table.meta(idx) as u32;
            if m == d {
                if S::key_eq(host, self.table.entry(idx), key) {
                    return Slot::Occupied(self.table.entry_mut(idx));
                }
                d += 1;
                idx += 1;
                continue;
            }
            if m < d {
                if m != 0 {
                    self.bulk_shift(idx);
                }
                debug_assert!(d <= u8::MAX as u32, "probe distance {d} overflowed a byte");
                self.table.set_meta(idx, d as u8);
                self.table.write_entry(idx, S::Entry::default());
                self.table.incr_cur_items();
                if d >= self.tunables.max_probe_distance as u32 {
                    log::debug!("probe distance tripwire hit at distance {d}, forcing resize before next insert");
                    self.table.trip_resize();
                }
                return Slot::Vacant(self.table.entry_mut(idx));
            }
            d += 1;
            idx += 1;
        }
    }

    /// Displace the occupied run starting at `idx` one slot farther from its
    /// ideal bucket, freeing `idx` for the incoming key. `idx` is known
    /// occupied (`meta(idx) != 0`).
    fn bulk_shift(&mut self, idx: u32) {
        let mut end = idx;
        loop {
            if end >= self.table.n() {
                oops!("bulk shift ran past table bound at {end}");
            }
            if self.table.meta(end) == 0 {
                break;
            }
            end += 1;
        }
        // Shift metadata [idx, end) -> [idx+1, end], each +1. Walk high to
        // low so every source byte is read before it's overwritten.
        for p in (idx..end).rev() {
            let v = self.table.meta(p) as u32 + 1;
            if v > u8::MAX as u32 {
                oops!("probe distance overflowed a byte during bulk shift");
            }
            if v >= self.tunables.max_probe_distance as u32 {
                log::debug!("probe distance tripwire hit at distance {v} during bulk shift, forcing resize before next insert");
                self.table.trip_resize();
            }
            self.table.set_meta(p + 1, v as u8);
        }
        unsafe { self.table.shift_entries_up(idx, end) };
    }

    /// Double `official_size`, re-inserting every live entry.
    fn grow<'h>(&mut self, host: &'h S::Host<'h>) {
        let old_n = self.table.n();
        let old_official = self.table.official_size();
        let mut new_table = RawTable::build((old_official as usize) * 2, S::HASH_WIDTH_BITS, self.tunables);
        std::mem::swap(&mut self.table, &mut new_table);
        let old_table = new_table; // the just-replaced (smaller) table
        for i in 0..old_n {
            if old_table.meta(i) == 0 {
                continue;
            }
            let entry = *old_table.entry(i);
            let key = S::key_of(&entry);
            match self.insert_internal(host, key) {
                Slot::Vacant(slot) => *slot = entry,
                Slot::Occupied(_) => oops!("duplicate key encountered while growing hash table"),
            }
        }
        log::debug!(
            "hash table grown: official_size {} -> {}",
            old_official,
            self.table.official_size()
        );
    }

    /// Remove `key`, returning its prior entry if present. Only exposed
    /// publicly by `PtrHash` in this core (§4.2), but implemented generically
    /// since the probing/compaction logic doesn't depend on the
    /// specialization.
    pub(crate) fn delete<'h>(&mut self, host: &'h S::Host<'h>, key: S::Key) -> Option<S::Entry> {
        let found_idx = self.fetch_index(host, key)?;
        let old_entry = *self.table.entry(found_idx);

        let mut target = found_idx;
        loop {
            let next = target + 1;
            if next >= self.table.n() {
                oops!("delete compaction ran past table bound at {next}");
            }
            let v = self.table.meta(next) as u32;
            if v <= 1 {
                break;
            }
            self.table.set_meta(target, (v - 1) as u8);
            target = next;
        }
        if target != found_idx {
            unsafe { self.table.shift_entries_down(found_idx + 1, target + 1) };
        }
        self.table.set_meta(target, 0);
        self.table.decr_cur_items();
        Some(old_entry)
    }

    /// Duplicate the whole table byte-for-byte (§4.1's shallow copy). Only
    /// meaningful for specializations whose entries carry no owned
    /// resources, hence the `Entry: Copy` bound already on [`HashSpec`].
    pub(crate) fn shallow_copy(&self) -> Self {
        Self {
            table: self.table.shallow_copy(),
            tunables: self.tunables,
            _marker: PhantomData,
        }
    }

    /// Iterate over every occupied entry, in table order. Used by
    /// specializations whose entries own an out-of-line resource (a heap
    /// record, for `FixKeyHash`) and must free it on drop.
    pub(crate) fn live_entries(&self) -> impl Iterator<Item = &S::Entry> + '_ {
        (0..self.table.n())
            .filter(move |&i| self.table.meta(i) != 0)
            .map(move |i| self.table.entry(i))
    }
}

#[cfg(test)]
impl<S: HashSpec> RobinHood<S> {
    /// Raw metadata byte at logical index `i`, for tests that assert the
    /// literal Robin-Hood displacement pattern instead of just its effects.
    pub(crate) fn meta_at(&self, i: u32) -> u8 {
        self.table.meta(i)
    }

    /// The ideal bucket `key` hashes to under this table's current sizing.
    pub(crate) fn bucket_of<'h>(&self, host: &'h S::Host<'h>, key: S::Key) -> u32 {
        self.bucket(S::hash(host, key))
    }
}
