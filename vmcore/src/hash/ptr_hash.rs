//! `PtrHash`: opaque pointer identity keys, an inline machine-word value.
//! The only specialization exposing `delete` (§4.2).

use crate::{
    config::TableTunables,
    error::oops,
    hash::robinhood::{HashSpec, RobinHood, Slot},
};

const GOLDEN_RATIO_64: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    key: *mut (),
    value: usize,
}

struct Spec;

impl HashSpec for Spec {
    type Key = *mut ();
    type Entry = Entry;
    type Host<'h> = ();

    const INITIAL_CAPACITY: usize = 8;
    const MAX_PROBE_DISTANCE: u8 = 255;
    const HASH_WIDTH_BITS: u32 = 64;

    #[inline]
    fn hash<'h>(_host: &'h (), key: *mut ()) -> u64 {
        (key as usize as u64).wrapping_mul(GOLDEN_RATIO_64)
    }

    #[inline]
    fn key_eq<'h>(_host: &'h (), entry: &Entry, key: *mut ()) -> bool {
        entry.key == key
    }

    #[inline]
    fn key_of(entry: &Entry) -> *mut () {
        entry.key
    }
}

/// Pointer-keyed hash table: identity keys, a machine word of value.
pub struct PtrHash {
    engine: RobinHood<Spec>,
}

impl PtrHash {
    pub fn build() -> Self {
        Self { engine: RobinHood::build() }
    }

    /// Build with caller-chosen load factor / probe-distance cap, e.g. for
    /// the deliberately tiny tripwire scenarios in the test suite.
    pub fn build_with_tunables(tunables: TableTunables) -> Self {
        Self { engine: RobinHood::build_with_tunables(tunables) }
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

    /// Returns the value for `key`, or `None` on a miss.
    pub fn fetch(&self, key: *mut ()) -> Option<usize> {
        self.engine.fetch(&(), key).map(|e| e.value)
    }

    /// Unconditionally associate `key` with `value`. Panics with
    /// `InsertConflict` if `key` is already present with a different value
    /// (§7).
    pub fn insert(&mut self, key: *mut (), value: usize) {
        match self.engine.lvalue_fetch(&(), key) {
            Slot::Vacant(e) => {
                e.key = key;
                e.value = value;
            }
            Slot::Occupied(e) => {
                if e.value != value {
                    oops!("insert conflict: key {key:p} already maps to {}, got {value}", e.value);
                }
            }
        }
    }

    /// Like [`insert`](Self::insert), but overwrites any existing value
    /// unconditionally instead of checking for a conflict.
    pub fn insert_nocheck(&mut self, key: *mut (), value: usize) {
        match self.engine.lvalue_fetch(&(), key) {
            Slot::Vacant(e) | Slot::Occupied(e) => {
                e.key = key;
                e.value = value;
            }
        }
    }

    /// Remove `key`, returning its prior value, or `0` if it was never
    /// present (delete-of-missing is a documented no-op, not a panic; see
    /// the open question in the design notes).
    pub fn fetch_and_delete(&mut self, key: *mut ()) -> usize {
        self.engine.delete(&(), key).map(|e| e.value).unwrap_or(0)
    }
}

impl Default for PtrHash {
    fn default() -> Self {
        Self::build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptr(n: usize) -> *mut () {
        n as *mut ()
    }

    /// Scan ascending pointer values for `count` whose ideal bucket under
    /// `h`'s current sizing all collide, starting the search at `start`. The
    /// golden-ratio multiplicative hash scatters enough that a match always
    /// turns up well within this bound.
    fn colliding_keys(h: &PtrHash, start: usize, count: usize) -> Vec<*mut ()> {
        let target = h.engine.bucket_of(&(), ptr(start));
        let mut found = vec![ptr(start)];
        let mut n = start + 1;
        while found.len() < count {
            if h.engine.bucket_of(&(), ptr(n)) == target {
                found.push(ptr(n));
            }
            n += 1;
            assert!(n < start + 1_000_000, "failed to find {count} colliding keys from {start}");
        }
        found
    }

    #[test]
    fn insert_and_fetch_roundtrip() {
        let mut h = PtrHash::build();
        for i in 1..200usize {
            h.insert(ptr(i), i * 7);
        }
        for i in 1..200usize {
            assert_eq!(h.fetch(ptr(i)), Some(i * 7));
        }
        assert_eq!(h.fetch(ptr(99999)), None);
    }

    #[test]
    fn insert_conflict_panics() {
        let mut h = PtrHash::build();
        h.insert(ptr(5), 1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            h.insert(ptr(5), 2);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn insert_same_value_is_idempotent() {
        let mut h = PtrHash::build();
        h.insert(ptr(5), 1);
        h.insert(ptr(5), 1);
        assert_eq!(h.fetch(ptr(5)), Some(1));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn delete_then_fetch_misses_and_siblings_survive() {
        let mut h = PtrHash::build();
        for i in 1..20usize {
            h.insert(ptr(i), i);
        }
        let before = h.len();
        assert_eq!(h.fetch_and_delete(ptr(10)), 10);
        assert_eq!(h.len(), before - 1);
        assert_eq!(h.fetch(ptr(10)), None);
        for i in 1..20usize {
            if i != 10 {
                assert_eq!(h.fetch(ptr(i)), Some(i));
            }
        }
    }

    #[test]
    fn delete_of_missing_is_noop() {
        let mut h = PtrHash::build();
        h.insert(ptr(1), 1);
        assert_eq!(h.fetch_and_delete(ptr(404)), 0);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn grows_under_load_and_keeps_old_keys() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut h = PtrHash::build();
        let initial = h.official_size();
        for i in 1..5000usize {
            h.insert(ptr(i * 2 + 1), i);
        }
        assert!(h.official_size() > initial);
        for i in 1..5000usize {
            assert_eq!(h.fetch(ptr(i * 2 + 1)), Some(i));
        }
    }

    #[test]
    fn tiny_probe_distance_cap_still_grows_and_keeps_data() {
        let tunables = TableTunables::new(4, 3, 4).expect("valid tunables");
        let mut h = PtrHash::build_with_tunables(tunables);
        for i in 1..2000usize {
            h.insert(ptr(i), i * 3);
        }
        for i in 1..2000usize {
            assert_eq!(h.fetch(ptr(i)), Some(i * 3));
        }
    }

    #[test]
    fn random_insert_delete_churn_keeps_invariants() {
        let _ = env_logger::builder().is_test(true).try_init();
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(42);
        let mut h = PtrHash::build();
        let mut model = std::collections::HashMap::new();
        for _ in 0..20_000 {
            let k = rng.gen_range(1..500usize);
            if rng.gen_bool(0.5) {
                h.insert_nocheck(ptr(k), k);
                model.insert(k, k);
            } else {
                let expect = model.remove(&k).unwrap_or(0);
                assert_eq!(h.fetch_and_delete(ptr(k)), expect);
            }
        }
        for (k, v) in &model {
            assert_eq!(h.fetch(ptr(*k)), Some(*v));
        }
        assert_eq!(h.len(), model.len());
    }

    // S1 — Robin-Hood displacement: four keys sharing one ideal bucket lay
    // down consecutive probe distances, and deleting the first shifts the
    // rest down by one instead of leaving a hole.
    #[test]
    fn s1_robin_hood_displacement_literal_metadata() {
        let mut h = PtrHash::build();
        let keys = colliding_keys(&h, 1, 4);
        let bucket = h.engine.bucket_of(&(), keys[0]);

        for (i, k) in keys.iter().enumerate() {
            h.insert(*k, i + 1);
        }
        assert_eq!(
            (0..4).map(|i| h.engine.meta_at(bucket + i)).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );

        assert_eq!(h.fetch_and_delete(keys[0]), 1);
        assert_eq!(
            (0..3).map(|i| h.engine.meta_at(bucket + i)).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(h.engine.meta_at(bucket + 3), 0);
        for (i, k) in keys.iter().enumerate().skip(1) {
            assert_eq!(h.fetch(*k), Some(i + 1));
        }
    }

    // S2 — tripwire resize: once a probe chain hits the configured
    // MAX_PROBE_DISTANCE, the table defers its grow to the *next* insert
    // rather than resizing mid-chain.
    #[test]
    fn s2_tripwire_resize_doubles_official_size_before_next_insert() {
        let tunables = TableTunables::new(8, 3, 4).expect("valid tunables");
        let mut h = PtrHash::build_with_tunables(tunables);

        // Grow the table well past its initial size first, on keys that
        // don't collide with the chain below, so the chain's own resize is
        // driven purely by the probe-distance tripwire, not by cur_items
        // catching up to max_items.
        let filler: Vec<*mut ()> = (1..200usize).map(ptr).collect();
        for (i, k) in filler.iter().enumerate() {
            h.insert(*k, i);
        }

        let chain = colliding_keys(&h, 1_000_000, 8);
        for (i, k) in chain.iter().enumerate() {
            h.insert(*k, 1_000 + i);
        }

        let official_before = h.official_size();
        let trigger = ptr(2_000_000);
        h.insert(trigger, 9999);
        assert!(h.official_size() > official_before, "tripwire should have forced a grow on the next insert");

        for (i, k) in filler.iter().enumerate() {
            assert_eq!(h.fetch(*k), Some(i));
        }
        for (i, k) in chain.iter().enumerate() {
            assert_eq!(h.fetch(*k), Some(1_000 + i));
        }
        assert_eq!(h.fetch(trigger), Some(9999));
    }
}
